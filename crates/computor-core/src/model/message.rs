//! Hierarchical messages and per-user read tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The message's single primary target. Priority when a message has a
/// `parent_id` and inherits target fields:
/// `submission_group > course_content > course_group > course`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageTarget {
    User(Uuid),
    CourseMember(Uuid),
    SubmissionGroup(Uuid),
    CourseGroup(Uuid),
    CourseContent(Uuid),
    Course(Uuid),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub author_user_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: Option<String>,
    pub body: String,

    pub target_user_id: Option<Uuid>,
    pub target_course_member_id: Option<Uuid>,
    pub target_submission_group_id: Option<Uuid>,
    pub target_course_group_id: Option<Uuid>,
    pub target_course_content_id: Option<Uuid>,
    pub target_course_id: Option<Uuid>,

    /// Broader course context, copied from the primary target, used for
    /// cache-invalidation tags and read-visibility queries.
    pub course_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The resolved primary target, in hierarchy priority order.
    pub fn primary_target(&self) -> Option<MessageTarget> {
        if let Some(id) = self.target_submission_group_id {
            return Some(MessageTarget::SubmissionGroup(id));
        }
        if let Some(id) = self.target_course_content_id {
            return Some(MessageTarget::CourseContent(id));
        }
        if let Some(id) = self.target_course_group_id {
            return Some(MessageTarget::CourseGroup(id));
        }
        if let Some(id) = self.target_course_id {
            return Some(MessageTarget::Course(id));
        }
        if let Some(id) = self.target_course_member_id {
            return Some(MessageTarget::CourseMember(id));
        }
        if let Some(id) = self.target_user_id {
            return Some(MessageTarget::User(id));
        }
        None
    }
}

/// `(message_id, reader_user_id)` as a set-membership read marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRead {
    pub message_id: Uuid,
    pub reader_user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_message() -> Message {
        Message {
            id: Uuid::new_v4(),
            author_user_id: Uuid::new_v4(),
            parent_id: None,
            title: None,
            body: "hello".to_string(),
            target_user_id: None,
            target_course_member_id: None,
            target_submission_group_id: None,
            target_course_group_id: None,
            target_course_content_id: None,
            target_course_id: None,
            course_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn submission_group_outranks_course_content() {
        let mut m = base_message();
        let sg = Uuid::new_v4();
        let cc = Uuid::new_v4();
        m.target_submission_group_id = Some(sg);
        m.target_course_content_id = Some(cc);
        assert_eq!(m.primary_target(), Some(MessageTarget::SubmissionGroup(sg)));
    }

    #[test]
    fn course_content_outranks_course_group_outranks_course() {
        let mut m = base_message();
        let course = Uuid::new_v4();
        m.target_course_id = Some(course);
        assert_eq!(m.primary_target(), Some(MessageTarget::Course(course)));

        let group = Uuid::new_v4();
        m.target_course_group_id = Some(group);
        assert_eq!(m.primary_target(), Some(MessageTarget::CourseGroup(group)));

        let content = Uuid::new_v4();
        m.target_course_content_id = Some(content);
        assert_eq!(m.primary_target(), Some(MessageTarget::CourseContent(content)));
    }
}
