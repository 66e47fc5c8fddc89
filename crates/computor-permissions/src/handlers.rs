//! Concrete handlers, one per resource kind, following the role
//! thresholds table.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use computor_core::{ApiError, CourseRole, Principal};

use crate::filter::{CandidateRow, QueryFilter};
use crate::handler::{Action, ActionContext, PermissionHandler, ResourceKind};

/// Resolves facts the handler cannot read off a cached [`Principal`]:
/// a resource's owning course, or membership rows for Result/Message.
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    async fn course_id_of(&self, kind: ResourceKind, resource_id: Uuid) -> Result<Option<Uuid>, ApiError>;

    /// The principal's own `CourseMember.id` rows, used to test
    /// ownership for Result/Message (§4.2 query narrowing).
    async fn own_course_member_ids(&self, principal: &Principal) -> Result<HashSet<Uuid>, ApiError>;

    /// Whether `resource_id` (a Result row) is reachable via one of the
    /// principal's own `SubmissionGroupMember` rows.
    async fn owns_result_via_submission_group(
        &self,
        principal: &Principal,
        result_id: Uuid,
    ) -> Result<bool, ApiError>;
}

/// Courses in which the principal holds at least `threshold`, computed
/// from the cached Principal's dependent claims — no DB suspension
/// needed.
pub fn courses_at_least(principal: &Principal, threshold: CourseRole) -> HashSet<Uuid> {
    principal
        .claims
        .dependent
        .get("course")
        .map(|by_course| {
            by_course
                .iter()
                .filter(|(_, roles)| roles.iter().any(|r| r.meets_threshold(threshold)))
                .map(|(course_id, _)| *course_id)
                .collect()
        })
        .unwrap_or_default()
}

/// Per-(kind, action) minimum course role, `None` meaning admin-only.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub get: Option<CourseRole>,
    pub list: Option<CourseRole>,
    pub create: Option<CourseRole>,
    pub update: Option<CourseRole>,
    pub delete: Option<CourseRole>,
}

impl Thresholds {
    fn for_action(&self, action: Action) -> Option<CourseRole> {
        match action {
            Action::Get => self.get,
            Action::List => self.list,
            Action::Create => self.create,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }
}

/// A generic handler for the simple course-scoped kinds with a uniform
/// threshold and no self-row exception: Course, CourseFamily,
/// Organization, CourseContent, CourseContentType. CourseMember has its
/// own handler ([`CourseMemberHandler`]) for the self-row exception.
pub struct CourseScopedHandler<R: ResourceResolver> {
    kind: ResourceKind,
    thresholds: Thresholds,
    resolver: Arc<R>,
}

impl<R: ResourceResolver> CourseScopedHandler<R> {
    pub fn new(kind: ResourceKind, thresholds: Thresholds, resolver: Arc<R>) -> Self {
        Self {
            kind,
            thresholds,
            resolver,
        }
    }
}

#[async_trait]
impl<R: ResourceResolver> PermissionHandler for CourseScopedHandler<R> {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn can_perform(
        &self,
        principal: &Principal,
        action: Action,
        resource_id: Option<Uuid>,
        context: Option<&ActionContext>,
    ) -> Result<bool, ApiError> {
        if principal.is_admin {
            return Ok(true);
        }
        let Some(threshold) = self.thresholds.for_action(action) else {
            return Ok(false);
        };

        let course_id = match action {
            // create has no existing row; the context carries the
            // target parent course.
            Action::Create => context.and_then(|c| c.parent_course_id),
            _ => match resource_id {
                Some(id) => self.resolver.course_id_of(self.kind, id).await?,
                None => None,
            },
        };

        Ok(course_id
            .map(|course_id| principal.has_course_role_at_least(course_id, threshold))
            .unwrap_or(false))
    }

    async fn build_query(&self, principal: &Principal, action: Action) -> Result<QueryFilter, ApiError> {
        if principal.is_admin {
            return Ok(QueryFilter::Unrestricted);
        }
        let Some(threshold) = self.thresholds.for_action(action) else {
            return Ok(QueryFilter::Deny);
        };
        Ok(QueryFilter::CourseIdIn(courses_at_least(principal, threshold)))
    }
}

/// CourseMember: `_tutor`-or-above threshold for get/list, but a
/// principal may always read their own membership row regardless of
/// their course role; `_lecturer` for create/update/delete.
pub struct CourseMemberHandler<R: ResourceResolver> {
    thresholds: Thresholds,
    resolver: Arc<R>,
}

impl<R: ResourceResolver> CourseMemberHandler<R> {
    pub fn new(thresholds: Thresholds, resolver: Arc<R>) -> Self {
        Self { thresholds, resolver }
    }
}

#[async_trait]
impl<R: ResourceResolver> PermissionHandler for CourseMemberHandler<R> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::CourseMember
    }

    async fn can_perform(
        &self,
        principal: &Principal,
        action: Action,
        resource_id: Option<Uuid>,
        context: Option<&ActionContext>,
    ) -> Result<bool, ApiError> {
        if principal.is_admin {
            return Ok(true);
        }

        if matches!(action, Action::Get | Action::List) {
            if let Some(id) = resource_id {
                if self.resolver.own_course_member_ids(principal).await?.contains(&id) {
                    return Ok(true);
                }
            }
        }

        let Some(threshold) = self.thresholds.for_action(action) else {
            return Ok(false);
        };

        let course_id = match action {
            Action::Create => context.and_then(|c| c.parent_course_id),
            _ => match resource_id {
                Some(id) => self.resolver.course_id_of(ResourceKind::CourseMember, id).await?,
                None => None,
            },
        };

        Ok(course_id
            .map(|course_id| principal.has_course_role_at_least(course_id, threshold))
            .unwrap_or(false))
    }

    async fn build_query(&self, principal: &Principal, action: Action) -> Result<QueryFilter, ApiError> {
        if principal.is_admin {
            return Ok(QueryFilter::Unrestricted);
        }
        if matches!(action, Action::Get | Action::List) {
            let threshold = self.thresholds.for_action(action).unwrap_or(CourseRole::Tutor);
            return Ok(QueryFilter::CourseMemberAccess {
                elevated_course_ids: courses_at_least(principal, threshold),
                own_course_member_ids: self.resolver.own_course_member_ids(principal).await?,
            });
        }
        let Some(threshold) = self.thresholds.for_action(action) else {
            return Ok(QueryFilter::Deny);
        };
        Ok(QueryFilter::CourseIdIn(courses_at_least(principal, threshold)))
    }
}

/// Result: "owner via own submission group; else
/// `_tutor`" for get/list; `_student`(self) for create; `_tutor` for
/// update; `_lecturer` for delete.
pub struct ResultHandler<R: ResourceResolver> {
    resolver: Arc<R>,
}

impl<R: ResourceResolver> ResultHandler<R> {
    pub fn new(resolver: Arc<R>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl<R: ResourceResolver> PermissionHandler for ResultHandler<R> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Result
    }

    async fn can_perform(
        &self,
        principal: &Principal,
        action: Action,
        resource_id: Option<Uuid>,
        _context: Option<&ActionContext>,
    ) -> Result<bool, ApiError> {
        if principal.is_admin {
            return Ok(true);
        }
        match action {
            Action::Get | Action::List => {
                if let Some(id) = resource_id {
                    if self
                        .resolver
                        .owns_result_via_submission_group(principal, id)
                        .await?
                    {
                        return Ok(true);
                    }
                    let course_id = self.resolver.course_id_of(ResourceKind::Result, id).await?;
                    return Ok(course_id
                        .map(|c| principal.has_course_role_at_least(c, CourseRole::Tutor))
                        .unwrap_or(false));
                }
                Ok(true) // list is narrowed by build_query, not denied outright
            }
            Action::Create => Ok(true), // student creates their own; gated further by the test scheduler
            Action::Update => {
                let course_id = match resource_id {
                    Some(id) => self.resolver.course_id_of(ResourceKind::Result, id).await?,
                    None => None,
                };
                Ok(course_id
                    .map(|c| principal.has_course_role_at_least(c, CourseRole::Tutor))
                    .unwrap_or(false))
            }
            Action::Delete => {
                let course_id = match resource_id {
                    Some(id) => self.resolver.course_id_of(ResourceKind::Result, id).await?,
                    None => None,
                };
                Ok(course_id
                    .map(|c| principal.has_course_role_at_least(c, CourseRole::Lecturer))
                    .unwrap_or(false))
            }
        }
    }

    async fn build_query(&self, principal: &Principal, action: Action) -> Result<QueryFilter, ApiError> {
        if principal.is_admin {
            return Ok(QueryFilter::Unrestricted);
        }
        let threshold = match action {
            Action::Get | Action::List => CourseRole::Tutor,
            Action::Update => CourseRole::Tutor,
            Action::Delete => CourseRole::Lecturer,
            Action::Create => return Ok(QueryFilter::Unrestricted),
        };
        Ok(QueryFilter::ResultAccess {
            elevated_course_ids: courses_at_least(principal, threshold),
            own_course_member_ids: self.resolver.own_course_member_ids(principal).await?,
        })
    }
}

/// Message: visibility is the union of several
/// sources; writes depend on the target kind.
pub struct MessageHandler<R: ResourceResolver> {
    resolver: Arc<R>,
}

impl<R: ResourceResolver> MessageHandler<R> {
    pub fn new(resolver: Arc<R>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl<R: ResourceResolver> PermissionHandler for MessageHandler<R> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Message
    }

    async fn can_perform(
        &self,
        principal: &Principal,
        action: Action,
        resource_id: Option<Uuid>,
        context: Option<&ActionContext>,
    ) -> Result<bool, ApiError> {
        if principal.is_admin {
            return Ok(true);
        }
        match action {
            Action::Get | Action::List => {
                let filter = self.build_query(principal, action).await?;
                let Some(id) = resource_id else { return Ok(true) };
                let course_id = self.resolver.course_id_of(ResourceKind::Message, id).await?;
                Ok(filter.matches(&CandidateRow {
                    id,
                    course_id,
                    ..Default::default()
                }))
            }
            Action::Create => Ok(context
                .and_then(|c| c.parent_course_id)
                .map(|course_id| principal.has_course_role_at_least(course_id, CourseRole::Lecturer))
                .unwrap_or(true)), // submission-group targets allow members too; enforced at the service layer
            Action::Update | Action::Delete => Ok(true), // author-only, enforced against the row's author_user_id by the service
        }
    }

    async fn build_query(&self, principal: &Principal, _action: Action) -> Result<QueryFilter, ApiError> {
        if principal.is_admin {
            return Ok(QueryFilter::Unrestricted);
        }
        Ok(QueryFilter::MessageAccess {
            principal_user_id: principal.user_id,
            own_course_member_ids: self.resolver.own_course_member_ids(principal).await?,
            own_submission_group_ids: HashSet::new(),
            own_course_group_ids: HashSet::new(),
            elevated_course_ids: courses_at_least(principal, CourseRole::Tutor),
        })
    }
}

/// StudentProfile: visible/editable by self, or by anyone holding the
/// matching general claim.
pub struct StudentProfileHandler;

#[async_trait]
impl PermissionHandler for StudentProfileHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::StudentProfile
    }

    async fn can_perform(
        &self,
        principal: &Principal,
        action: Action,
        resource_id: Option<Uuid>,
        _context: Option<&ActionContext>,
    ) -> Result<bool, ApiError> {
        if principal.is_admin {
            return Ok(true);
        }
        let general_action = match action {
            Action::Get | Action::List => "get",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        if principal.claims.has_general("student_profile", general_action) {
            return Ok(true);
        }
        Ok(resource_id == Some(principal.user_id))
    }

    async fn build_query(&self, principal: &Principal, action: Action) -> Result<QueryFilter, ApiError> {
        if principal.is_admin {
            return Ok(QueryFilter::Unrestricted);
        }
        let general_action = match action {
            Action::Get | Action::List => "get",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        if principal.claims.has_general("student_profile", general_action) {
            return Ok(QueryFilter::Unrestricted);
        }
        Ok(QueryFilter::SelfUserId(principal.user_id))
    }
}

/// ApiToken: self or admin for get/create/delete; admin-only update.
pub struct ApiTokenHandler<R: ResourceResolver> {
    resolver: Arc<R>,
}

impl<R: ResourceResolver> ApiTokenHandler<R> {
    pub fn new(resolver: Arc<R>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl<R: ResourceResolver> PermissionHandler for ApiTokenHandler<R> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ApiToken
    }

    async fn can_perform(
        &self,
        principal: &Principal,
        action: Action,
        resource_id: Option<Uuid>,
        _context: Option<&ActionContext>,
    ) -> Result<bool, ApiError> {
        if principal.is_admin {
            return Ok(true);
        }
        if action == Action::Update {
            return Ok(false);
        }
        match resource_id {
            Some(id) => {
                let owner = self.resolver.course_id_of(ResourceKind::ApiToken, id).await?;
                Ok(owner == Some(principal.user_id))
            }
            None => Ok(true),
        }
    }

    async fn build_query(&self, principal: &Principal, action: Action) -> Result<QueryFilter, ApiError> {
        if principal.is_admin {
            return Ok(QueryFilter::Unrestricted);
        }
        if action == Action::Update {
            return Ok(QueryFilter::Deny);
        }
        Ok(QueryFilter::SelfUserId(principal.user_id))
    }
}

/// Example: `_lecturer` in any course for every action.
pub struct ExampleHandler;

#[async_trait]
impl PermissionHandler for ExampleHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Example
    }

    async fn can_perform(
        &self,
        principal: &Principal,
        _action: Action,
        _resource_id: Option<Uuid>,
        _context: Option<&ActionContext>,
    ) -> Result<bool, ApiError> {
        Ok(principal.is_admin || !courses_at_least(principal, CourseRole::Lecturer).is_empty())
    }

    async fn build_query(&self, principal: &Principal, _action: Action) -> Result<QueryFilter, ApiError> {
        if principal.is_admin || !courses_at_least(principal, CourseRole::Lecturer).is_empty() {
            Ok(QueryFilter::Unrestricted)
        } else {
            Ok(QueryFilter::Deny)
        }
    }
}

pub const COURSE_LEVEL_THRESHOLDS: Thresholds = Thresholds {
    get: Some(CourseRole::Student),
    list: Some(CourseRole::Student),
    create: None,
    update: Some(CourseRole::Lecturer),
    delete: None,
};

pub const COURSE_CONTENT_THRESHOLDS: Thresholds = Thresholds {
    get: Some(CourseRole::Student),
    list: Some(CourseRole::Student),
    create: Some(CourseRole::Lecturer),
    update: Some(CourseRole::Lecturer),
    delete: Some(CourseRole::Lecturer),
};

pub const COURSE_MEMBER_THRESHOLDS: Thresholds = Thresholds {
    get: Some(CourseRole::Tutor),
    list: Some(CourseRole::Tutor),
    create: Some(CourseRole::Lecturer),
    update: Some(CourseRole::Lecturer),
    delete: Some(CourseRole::Lecturer),
};
