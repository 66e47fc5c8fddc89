//! # computor-permissions
//!
//! Polymorphic permission handlers: for each resource
//! kind, `can_perform` decides a boolean and `build_query` returns a row
//! filter that must agree with it.

pub mod filter;
pub mod handler;
pub mod handlers;
pub mod registry;

pub use filter::QueryFilter;
pub use handler::{Action, ActionContext, PermissionHandler, ResourceKind};
pub use registry::HandlerRegistry;
