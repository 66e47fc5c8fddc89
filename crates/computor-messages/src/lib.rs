//! # computor-messages
//!
//! Message creation, writer-permission enforcement, and per-user
//! read-tracking.

pub mod service;

pub use service::{CreateMessageRequest, MessageRepository, MessageService, NewMessageTarget};
