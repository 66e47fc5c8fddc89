//! # computor-deployment
//!
//! The deployment engine: binds example versions to
//! course content, enforces the identity rule on reassignment, and
//! records immutable history.

pub mod engine;
pub mod version;

pub use engine::{
    AssignExampleRequest, BatchValidationItem, BatchValidationResult, DeploymentEngine,
    DeploymentRepository, ExampleResolution,
};
