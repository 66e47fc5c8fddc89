//! The data model: courses, members, content, submissions,
//! deployments, results, grades, and messages, plus the identity types
//! that sit underneath authentication.

pub mod course;
pub mod deployment;
pub mod identity;
pub mod message;
pub mod result;
pub mod submission;

pub use course::{Course, CourseContent, CourseContentType, CourseFamily, CourseMember, Organization};
pub use deployment::{
    CourseContentDeployment, DeploymentAction, DeploymentHistory, DeploymentStatus, ExampleVersion,
};
pub use identity::{Account, ApiToken, Claims, CourseRole, Principal, Session, User};
pub use message::{Message, MessageRead, MessageTarget};
pub use result::{ResultStatus, TestResult};
pub use submission::{
    GradeStatus, SubmissionArtifact, SubmissionGrade, SubmissionGroup, SubmissionGroupMember,
};
