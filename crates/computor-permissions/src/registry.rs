//! Registry of `ResourceKind -> PermissionHandler`: a small interface
//! with one implementation per kind, indexed in a registry keyed by the
//! kind descriptor.

use std::collections::HashMap;

use computor_core::{ApiError, Principal};
use uuid::Uuid;

use crate::filter::QueryFilter;
use crate::handler::{Action, ActionContext, PermissionHandler, ResourceKind};

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ResourceKind, Box<dyn PermissionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Box<dyn PermissionHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    fn handler(&self, kind: ResourceKind) -> Option<&dyn PermissionHandler> {
        self.handlers.get(&kind).map(|h| h.as_ref())
    }

    /// Decision pipeline: admin totality, then the general claim, then
    /// the handler's own rule. No handler implies admin-only.
    pub async fn can_perform(
        &self,
        principal: &Principal,
        kind: ResourceKind,
        action: Action,
        resource_id: Option<Uuid>,
        context: Option<&ActionContext>,
        general_resource_name: &str,
        general_action_name: &str,
    ) -> Result<bool, ApiError> {
        if principal.is_admin {
            return Ok(true);
        }
        if principal
            .claims
            .has_general(general_resource_name, general_action_name)
        {
            return Ok(true);
        }
        match self.handler(kind) {
            Some(handler) => handler.can_perform(principal, action, resource_id, context).await,
            None => Ok(false),
        }
    }

    pub async fn build_query(
        &self,
        principal: &Principal,
        kind: ResourceKind,
        action: Action,
        general_resource_name: &str,
        general_action_name: &str,
    ) -> Result<QueryFilter, ApiError> {
        if principal.is_admin {
            return Ok(QueryFilter::Unrestricted);
        }
        if principal
            .claims
            .has_general(general_resource_name, general_action_name)
        {
            return Ok(QueryFilter::Unrestricted);
        }
        match self.handler(kind) {
            Some(handler) => handler.build_query(principal, action).await,
            None => Ok(QueryFilter::Deny),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::CandidateRow;
    use crate::handlers::{
        courses_at_least, CourseScopedHandler, ResourceResolver, COURSE_CONTENT_THRESHOLDS,
    };
    use async_trait::async_trait;
    use computor_core::CourseRole;
    use std::collections::HashSet;
    use std::sync::Arc;

    struct FakeResolver {
        course_by_resource: HashMap<Uuid, Uuid>,
    }

    #[async_trait]
    impl ResourceResolver for FakeResolver {
        async fn course_id_of(
            &self,
            _kind: ResourceKind,
            resource_id: Uuid,
        ) -> Result<Option<Uuid>, ApiError> {
            Ok(self.course_by_resource.get(&resource_id).copied())
        }

        async fn own_course_member_ids(&self, _principal: &Principal) -> Result<HashSet<Uuid>, ApiError> {
            Ok(HashSet::new())
        }

        async fn owns_result_via_submission_group(
            &self,
            _principal: &Principal,
            _result_id: Uuid,
        ) -> Result<bool, ApiError> {
            Ok(false)
        }
    }

    /// `can_perform(P, action, id)` must hold iff `id` appears in
    /// `build_query(P, action)` filtered to that row.
    #[tokio::test]
    async fn can_perform_agrees_with_build_query() {
        let course_id = Uuid::new_v4();
        let content_id = Uuid::new_v4();
        let mut principal = Principal::new(Uuid::new_v4());
        principal.claims.grant_course_role(course_id, CourseRole::Student);

        let resolver = Arc::new(FakeResolver {
            course_by_resource: HashMap::from([(content_id, course_id)]),
        });
        let handler = CourseScopedHandler::new(
            ResourceKind::CourseContent,
            COURSE_CONTENT_THRESHOLDS,
            resolver,
        );

        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(handler));

        let decision = registry
            .can_perform(
                &principal,
                ResourceKind::CourseContent,
                Action::Get,
                Some(content_id),
                None,
                "course_content",
                "get",
            )
            .await
            .unwrap();
        let filter = registry
            .build_query(
                &principal,
                ResourceKind::CourseContent,
                Action::Get,
                "course_content",
                "get",
            )
            .await
            .unwrap();
        let row_matches = filter.matches(&CandidateRow {
            id: content_id,
            course_id: Some(course_id),
            ..Default::default()
        });

        assert_eq!(decision, row_matches);
        assert!(decision);
    }

    #[tokio::test]
    async fn unrelated_course_is_denied_and_excluded_from_query() {
        let my_course = Uuid::new_v4();
        let other_course = Uuid::new_v4();
        let content_in_other_course = Uuid::new_v4();
        let mut principal = Principal::new(Uuid::new_v4());
        principal.claims.grant_course_role(my_course, CourseRole::Lecturer);

        let resolver = Arc::new(FakeResolver {
            course_by_resource: HashMap::from([(content_in_other_course, other_course)]),
        });
        let handler = CourseScopedHandler::new(
            ResourceKind::CourseContent,
            COURSE_CONTENT_THRESHOLDS,
            resolver,
        );
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(handler));

        let decision = registry
            .can_perform(
                &principal,
                ResourceKind::CourseContent,
                Action::Update,
                Some(content_in_other_course),
                None,
                "course_content",
                "update",
            )
            .await
            .unwrap();
        let filter = registry
            .build_query(
                &principal,
                ResourceKind::CourseContent,
                Action::Update,
                "course_content",
                "update",
            )
            .await
            .unwrap();
        let row_matches = filter.matches(&CandidateRow {
            id: content_in_other_course,
            course_id: Some(other_course),
            ..Default::default()
        });

        assert!(!decision);
        assert_eq!(decision, row_matches);
    }

    #[test]
    fn role_monotonicity() {
        // If _lecturer permits an action, every role >= _lecturer also does.
        let course_id = Uuid::new_v4();
        let mut principal = Principal::new(Uuid::new_v4());
        principal.claims.grant_course_role(course_id, CourseRole::Owner);
        let courses = courses_at_least(&principal, CourseRole::Lecturer);
        assert!(courses.contains(&course_id));
    }

    #[tokio::test]
    async fn course_member_self_row_is_visible_below_threshold() {
        use crate::handlers::{CourseMemberHandler, COURSE_MEMBER_THRESHOLDS};

        let course_id = Uuid::new_v4();
        let own_member_id = Uuid::new_v4();
        let mut principal = Principal::new(Uuid::new_v4());
        principal.claims.grant_course_role(course_id, CourseRole::Student);

        struct SelfRowResolver {
            course_id: Uuid,
            own_member_id: Uuid,
        }

        #[async_trait]
        impl ResourceResolver for SelfRowResolver {
            async fn course_id_of(&self, _kind: ResourceKind, resource_id: Uuid) -> Result<Option<Uuid>, ApiError> {
                Ok((resource_id == self.own_member_id).then_some(self.course_id))
            }

            async fn own_course_member_ids(&self, _principal: &Principal) -> Result<HashSet<Uuid>, ApiError> {
                Ok(HashSet::from([self.own_member_id]))
            }

            async fn owns_result_via_submission_group(
                &self,
                _principal: &Principal,
                _result_id: Uuid,
            ) -> Result<bool, ApiError> {
                Ok(false)
            }
        }

        let resolver = Arc::new(SelfRowResolver { course_id, own_member_id });
        let handler = CourseMemberHandler::new(COURSE_MEMBER_THRESHOLDS, resolver);
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(handler));

        let decision = registry
            .can_perform(
                &principal,
                ResourceKind::CourseMember,
                Action::Get,
                Some(own_member_id),
                None,
                "course_member",
                "get",
            )
            .await
            .unwrap();
        let filter = registry
            .build_query(&principal, ResourceKind::CourseMember, Action::Get, "course_member", "get")
            .await
            .unwrap();
        let row_matches = filter.matches(&CandidateRow {
            id: own_member_id,
            course_id: Some(course_id),
            ..Default::default()
        });

        assert!(decision, "a student must always be able to read their own membership row");
        assert_eq!(decision, row_matches);
    }
}
