//! The row-filter restriction `build_query` returns: an opaque
//! description of which rows a principal may see, expressible against
//! any data store without coupling to a specific ORM.

use std::collections::HashSet;

use uuid::Uuid;

/// A single candidate row, described by the fields `QueryFilter::matches`
/// needs to decide membership. Not every field is populated for every
/// resource kind; handlers document which fields they read.
#[derive(Debug, Clone, Default)]
pub struct CandidateRow {
    pub id: Uuid,
    pub course_id: Option<Uuid>,
    pub owner_user_id: Option<Uuid>,
    pub course_member_id: Option<Uuid>,
    pub submission_group_id: Option<Uuid>,
    pub course_group_id: Option<Uuid>,
    pub course_content_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub author_user_id: Option<Uuid>,
    pub is_admin_account: bool,
}

#[derive(Debug, Clone)]
pub enum QueryFilter {
    /// `P.is_admin` or a general claim with no narrowing.
    Unrestricted,
    /// No handler matched; deny everything.
    Deny,
    /// Rows whose `course_id` is in this set (course-scoped kinds).
    CourseIdIn(HashSet<Uuid>),
    /// Only the row belonging to this user (self-row visibility).
    SelfUserId(Uuid),
    /// General `list`/`get` permission, but user-manager-style handlers
    /// narrow out admin/service rows.
    AllExcludingAdmins,
    /// Result (§4.2): tutor/lecturer-or-above courses, union'd with rows
    /// reachable via the principal's own submission-group memberships.
    ResultAccess {
        elevated_course_ids: HashSet<Uuid>,
        own_course_member_ids: HashSet<Uuid>,
    },
    /// CourseMember get/list: `_tutor`-or-above courses, union'd with the
    /// principal's own membership row regardless of threshold.
    CourseMemberAccess {
        elevated_course_ids: HashSet<Uuid>,
        own_course_member_ids: HashSet<Uuid>,
    },
    /// Message (§4.8): union of every visibility source.
    MessageAccess {
        principal_user_id: Uuid,
        own_course_member_ids: HashSet<Uuid>,
        own_submission_group_ids: HashSet<Uuid>,
        own_course_group_ids: HashSet<Uuid>,
        elevated_course_ids: HashSet<Uuid>,
    },
}

impl QueryFilter {
    /// Whether `row` is included in this filter. `can_perform` and
    /// `build_query` must agree in the sense that
    /// `can_perform(P, action, id) == build_query(P, action).matches(row_of(id))`.
    pub fn matches(&self, row: &CandidateRow) -> bool {
        match self {
            QueryFilter::Unrestricted => true,
            QueryFilter::Deny => false,
            QueryFilter::CourseIdIn(courses) => {
                row.course_id.map(|c| courses.contains(&c)).unwrap_or(false)
            }
            QueryFilter::SelfUserId(user_id) => row.owner_user_id == Some(*user_id),
            QueryFilter::AllExcludingAdmins => !row.is_admin_account,
            QueryFilter::ResultAccess {
                elevated_course_ids,
                own_course_member_ids,
            } => {
                row.course_id
                    .map(|c| elevated_course_ids.contains(&c))
                    .unwrap_or(false)
                    || row
                        .course_member_id
                        .map(|m| own_course_member_ids.contains(&m))
                        .unwrap_or(false)
            }
            QueryFilter::CourseMemberAccess {
                elevated_course_ids,
                own_course_member_ids,
            } => {
                row.course_id
                    .map(|c| elevated_course_ids.contains(&c))
                    .unwrap_or(false)
                    || own_course_member_ids.contains(&row.id)
            }
            QueryFilter::MessageAccess {
                principal_user_id,
                own_course_member_ids,
                own_submission_group_ids,
                own_course_group_ids,
                elevated_course_ids,
            } => {
                row.author_user_id == Some(*principal_user_id)
                    || row.target_user_id == Some(*principal_user_id)
                    || row
                        .course_member_id
                        .map(|m| own_course_member_ids.contains(&m))
                        .unwrap_or(false)
                    || row
                        .submission_group_id
                        .map(|g| own_submission_group_ids.contains(&g))
                        .unwrap_or(false)
                    || row
                        .course_group_id
                        .map(|g| own_course_group_ids.contains(&g))
                        .unwrap_or(false)
                    || row
                        .course_id
                        .map(|c| elevated_course_ids.contains(&c))
                        .unwrap_or(false)
            }
        }
    }
}
