//! # computor-core
//!
//! Shared data model, error taxonomy, and configuration for the computor
//! control plane: courses, students, submissions, test execution, and
//! grading, plus the hierarchical resource types the rest of the
//! workspace's services operate on.

pub mod config;
pub mod error;
pub mod ltree;
pub mod model;

pub use config::ComputorConfig;
pub use error::{ApiError, ErrorCategory, ErrorSeverity, Result};
pub use ltree::LtreePath;
pub use model::*;
