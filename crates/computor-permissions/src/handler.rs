//! The [`PermissionHandler`] trait every resource kind implements.

use async_trait::async_trait;
use uuid::Uuid;

use computor_core::{ApiError, Principal};

use crate::filter::QueryFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Course,
    CourseFamily,
    Organization,
    CourseContent,
    CourseContentType,
    CourseMember,
    Result,
    Example,
    Message,
    StudentProfile,
    ApiToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Get,
    List,
    Create,
    Update,
    Delete,
}

/// Extra context a handler needs for `create` (parent-resource checks)
/// and for disambiguating rows on `update`/`delete` when the id alone
/// is not enough.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub parent_course_id: Option<Uuid>,
    pub target_is_admin_account: bool,
}

#[async_trait]
pub trait PermissionHandler: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn can_perform(
        &self,
        principal: &Principal,
        action: Action,
        resource_id: Option<Uuid>,
        context: Option<&ActionContext>,
    ) -> Result<bool, ApiError>;

    async fn build_query(&self, principal: &Principal, action: Action) -> Result<QueryFilter, ApiError>;
}
