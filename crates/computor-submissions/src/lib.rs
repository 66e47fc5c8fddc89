//! # computor-submissions
//!
//! The submission service: ingests upload archives,
//! validates and stores them to blob storage, creates `SubmissionArtifact`
//! records, appends tutor grades, and signals view-cache invalidation.

pub mod grading;
pub mod sanitize;
pub mod service;

pub use grading::{CreateGradeRequest, GradeContext, GradeRepository, GradingService};
pub use service::{BlobStore, SubmissionRepository, SubmissionService, UploadOutcome, UploadRequest};
