//! Message creation and read-tracking.

use async_trait::async_trait;
use computor_core::{ApiError, CourseRole, Message, MessageTarget};
use uuid::Uuid;

/// What the caller asked to target, before parent-inheritance is applied.
/// `User`/`CourseMember` targets are deliberately absent: direct creation
/// against them is not implemented, per the writer table.
#[derive(Debug, Clone)]
pub enum NewMessageTarget {
    SubmissionGroup(Uuid),
    CourseContent(Uuid),
    Course(Uuid),
}

#[derive(Debug, Clone)]
pub struct CreateMessageRequest {
    pub author_user_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: Option<String>,
    pub body: String,
    /// Ignored when `parent_id` is set; the parent's target is inherited.
    pub target: Option<NewMessageTarget>,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn find_message(&self, message_id: Uuid) -> Result<Option<Message>, ApiError>;

    async fn course_id_of_submission_group(&self, submission_group_id: Uuid) -> Result<Uuid, ApiError>;
    async fn course_id_of_course_content(&self, course_content_id: Uuid) -> Result<Uuid, ApiError>;

    async fn is_submission_group_member(&self, submission_group_id: Uuid, user_id: Uuid) -> Result<bool, ApiError>;
    async fn course_role_of(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<CourseRole>, ApiError>;

    async fn insert_message(&self, message: Message) -> Result<Message, ApiError>;
    async fn delete_message(&self, message_id: Uuid) -> Result<(), ApiError>;

    /// Returns `true` if a row was inserted (i.e. it was previously unread).
    async fn mark_read(&self, message_id: Uuid, reader_user_id: Uuid) -> Result<bool, ApiError>;
    /// Returns `true` if a row was deleted (i.e. it was previously read).
    async fn mark_unread(&self, message_id: Uuid, reader_user_id: Uuid) -> Result<bool, ApiError>;
}

pub struct MessageService<R: MessageRepository> {
    repository: R,
}

impl<R: MessageRepository> MessageService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub async fn create_message(&self, request: CreateMessageRequest) -> Result<Message, ApiError> {
        let (target_fields, course_id) = match &request.parent_id {
            Some(parent_id) => {
                let parent = self
                    .repository
                    .find_message(*parent_id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("parent message not found"))?;
                (parent.primary_target(), parent.course_id)
            }
            None => self.resolve_new_target(&request).await?,
        };

        self.check_writer_allowed(request.author_user_id, &target_fields).await?;

        let mut message = Message {
            id: Uuid::new_v4(),
            author_user_id: request.author_user_id,
            parent_id: request.parent_id,
            title: request.title,
            body: request.body,
            target_user_id: None,
            target_course_member_id: None,
            target_submission_group_id: None,
            target_course_group_id: None,
            target_course_content_id: None,
            target_course_id: None,
            course_id,
            created_at: chrono::Utc::now(),
        };

        match target_fields {
            Some(MessageTarget::SubmissionGroup(id)) => message.target_submission_group_id = Some(id),
            Some(MessageTarget::CourseContent(id)) => message.target_course_content_id = Some(id),
            Some(MessageTarget::Course(id)) => message.target_course_id = Some(id),
            Some(MessageTarget::CourseGroup(id)) => message.target_course_group_id = Some(id),
            Some(MessageTarget::CourseMember(id)) => message.target_course_member_id = Some(id),
            Some(MessageTarget::User(id)) => message.target_user_id = Some(id),
            None => {}
        }

        self.repository.insert_message(message).await
    }

    async fn resolve_new_target(
        &self,
        request: &CreateMessageRequest,
    ) -> Result<(Option<MessageTarget>, Option<Uuid>), ApiError> {
        match &request.target {
            None => Ok((None, None)),
            Some(NewMessageTarget::SubmissionGroup(id)) => {
                let course_id = self.repository.course_id_of_submission_group(*id).await?;
                Ok((Some(MessageTarget::SubmissionGroup(*id)), Some(course_id)))
            }
            Some(NewMessageTarget::CourseContent(id)) => {
                let course_id = self.repository.course_id_of_course_content(*id).await?;
                Ok((Some(MessageTarget::CourseContent(*id)), Some(course_id)))
            }
            Some(NewMessageTarget::Course(id)) => Ok((Some(MessageTarget::Course(*id)), Some(*id))),
        }
    }

    /// Allowed writers per target.
    async fn check_writer_allowed(
        &self,
        author_user_id: Uuid,
        target: &Option<MessageTarget>,
    ) -> Result<(), ApiError> {
        match target {
            None | Some(MessageTarget::User(_)) | Some(MessageTarget::CourseMember(_)) => Err(
                ApiError::not_implemented("direct messages to a user or course member are not supported"),
            ),
            Some(MessageTarget::CourseGroup(_)) => {
                Err(ApiError::forbidden("course_group is a read-only message target"))
            }
            Some(MessageTarget::SubmissionGroup(id)) => {
                let is_member = self.repository.is_submission_group_member(*id, author_user_id).await?;
                if is_member {
                    return Ok(());
                }
                let course_id = self.repository.course_id_of_submission_group(*id).await?;
                let role = self.repository.course_role_of(author_user_id, course_id).await?;
                match role {
                    Some(role) if role >= CourseRole::Tutor => Ok(()),
                    _ => Err(ApiError::forbidden(
                        "must be a submission group member or hold a non-student course role",
                    )),
                }
            }
            Some(MessageTarget::CourseContent(id)) => {
                let course_id = self.repository.course_id_of_course_content(*id).await?;
                self.require_lecturer_or_above(author_user_id, course_id).await
            }
            Some(MessageTarget::Course(course_id)) => {
                self.require_lecturer_or_above(author_user_id, *course_id).await
            }
        }
    }

    async fn require_lecturer_or_above(&self, user_id: Uuid, course_id: Uuid) -> Result<(), ApiError> {
        match self.repository.course_role_of(user_id, course_id).await? {
            Some(role) if role >= CourseRole::Lecturer => Ok(()),
            _ => Err(ApiError::forbidden("requires _lecturer or above in this course")),
        }
    }

    /// Update/delete is author-only for every creatable target kind.
    pub async fn require_author(&self, message: &Message, user_id: Uuid) -> Result<(), ApiError> {
        if message.author_user_id == user_id {
            Ok(())
        } else {
            Err(ApiError::forbidden("only the author may modify this message"))
        }
    }

    pub async fn delete_message(&self, message_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        let message = self
            .repository
            .find_message(message_id)
            .await?
            .ok_or_else(|| ApiError::not_found("message not found"))?;
        self.require_author(&message, user_id).await?;
        self.repository.delete_message(message_id).await
    }

    /// Inserts `(message_id, user_id)` if absent. The caller is responsible for invalidating the reader's
    /// cached views when this returns `true`.
    pub async fn mark_read(&self, message_id: Uuid, reader_user_id: Uuid) -> Result<bool, ApiError> {
        self.repository.mark_read(message_id, reader_user_id).await
    }

    /// Symmetric delete; same cache-invalidation contract as `mark_read`.
    pub async fn mark_unread(&self, message_id: Uuid, reader_user_id: Uuid) -> Result<bool, ApiError> {
        self.repository.mark_unread(message_id, reader_user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeRepository {
        messages: Mutex<Vec<Message>>,
        submission_group_course: Uuid,
        course_content_course: Uuid,
        group_members: HashSet<Uuid>,
        roles: std::collections::HashMap<Uuid, CourseRole>,
        reads: Mutex<HashSet<(Uuid, Uuid)>>,
    }

    #[async_trait]
    impl MessageRepository for FakeRepository {
        async fn find_message(&self, message_id: Uuid) -> Result<Option<Message>, ApiError> {
            Ok(self.messages.lock().unwrap().iter().find(|m| m.id == message_id).cloned())
        }

        async fn course_id_of_submission_group(&self, _submission_group_id: Uuid) -> Result<Uuid, ApiError> {
            Ok(self.submission_group_course)
        }

        async fn course_id_of_course_content(&self, _course_content_id: Uuid) -> Result<Uuid, ApiError> {
            Ok(self.course_content_course)
        }

        async fn is_submission_group_member(&self, _submission_group_id: Uuid, user_id: Uuid) -> Result<bool, ApiError> {
            Ok(self.group_members.contains(&user_id))
        }

        async fn course_role_of(&self, user_id: Uuid, _course_id: Uuid) -> Result<Option<CourseRole>, ApiError> {
            Ok(self.roles.get(&user_id).copied())
        }

        async fn insert_message(&self, message: Message) -> Result<Message, ApiError> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(message)
        }

        async fn delete_message(&self, message_id: Uuid) -> Result<(), ApiError> {
            self.messages.lock().unwrap().retain(|m| m.id != message_id);
            Ok(())
        }

        async fn mark_read(&self, message_id: Uuid, reader_user_id: Uuid) -> Result<bool, ApiError> {
            Ok(self.reads.lock().unwrap().insert((message_id, reader_user_id)))
        }

        async fn mark_unread(&self, message_id: Uuid, reader_user_id: Uuid) -> Result<bool, ApiError> {
            Ok(self.reads.lock().unwrap().remove(&(message_id, reader_user_id)))
        }
    }

    fn service(author_role: Option<CourseRole>, group_member: bool) -> MessageService<FakeRepository> {
        let mut roles = std::collections::HashMap::new();
        let author = Uuid::new_v4();
        if let Some(role) = author_role {
            roles.insert(author, role);
        }
        let mut group_members = HashSet::new();
        if group_member {
            group_members.insert(author);
        }
        MessageService::new(FakeRepository {
            messages: Mutex::new(vec![]),
            submission_group_course: Uuid::new_v4(),
            course_content_course: Uuid::new_v4(),
            group_members,
            roles,
            reads: Mutex::new(HashSet::new()),
        })
    }

    #[tokio::test]
    async fn student_member_can_message_own_submission_group() {
        let svc = service(None, true);
        let author = svc.repository.group_members.iter().next().copied().unwrap();
        let group_id = Uuid::new_v4();
        let msg = svc
            .create_message(CreateMessageRequest {
                author_user_id: author,
                parent_id: None,
                title: None,
                body: "hi".to_string(),
                target: Some(NewMessageTarget::SubmissionGroup(group_id)),
            })
            .await
            .unwrap();
        assert_eq!(msg.target_submission_group_id, Some(group_id));
        assert_eq!(msg.course_id, Some(svc.repository.submission_group_course));
    }

    #[tokio::test]
    async fn non_member_without_elevated_role_is_forbidden_on_submission_group() {
        let svc = service(None, false);
        let err = svc
            .create_message(CreateMessageRequest {
                author_user_id: Uuid::new_v4(),
                parent_id: None,
                title: None,
                body: "hi".to_string(),
                target: Some(NewMessageTarget::SubmissionGroup(Uuid::new_v4())),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AUTHZ_001");
    }

    #[tokio::test]
    async fn course_content_requires_lecturer_or_above() {
        let svc = service(Some(CourseRole::Tutor), false);
        let author = *svc.repository.roles.keys().next().unwrap();
        let err = svc
            .create_message(CreateMessageRequest {
                author_user_id: author,
                parent_id: None,
                title: None,
                body: "hi".to_string(),
                target: Some(NewMessageTarget::CourseContent(Uuid::new_v4())),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AUTHZ_001");

        let svc = service(Some(CourseRole::Lecturer), false);
        let author = *svc.repository.roles.keys().next().unwrap();
        let msg = svc
            .create_message(CreateMessageRequest {
                author_user_id: author,
                parent_id: None,
                title: None,
                body: "hi".to_string(),
                target: Some(NewMessageTarget::CourseContent(Uuid::new_v4())),
            })
            .await
            .unwrap();
        assert!(msg.target_course_content_id.is_some());
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let svc = service(None, false);
        let message_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        assert!(svc.mark_read(message_id, user_id).await.unwrap());
        assert!(!svc.mark_read(message_id, user_id).await.unwrap());
        assert!(svc.mark_unread(message_id, user_id).await.unwrap());
        assert!(!svc.mark_unread(message_id, user_id).await.unwrap());
    }

    #[tokio::test]
    async fn reply_inherits_parent_target_and_course_id() {
        let svc = service(Some(CourseRole::Lecturer), false);
        let author = *svc.repository.roles.keys().next().unwrap();
        let parent = svc
            .create_message(CreateMessageRequest {
                author_user_id: author,
                parent_id: None,
                title: None,
                body: "root".to_string(),
                target: Some(NewMessageTarget::Course(Uuid::new_v4())),
            })
            .await
            .unwrap();

        let reply = svc
            .create_message(CreateMessageRequest {
                author_user_id: author,
                parent_id: Some(parent.id),
                title: None,
                body: "reply".to_string(),
                target: None,
            })
            .await
            .unwrap();
        assert_eq!(reply.target_course_id, parent.target_course_id);
        assert_eq!(reply.course_id, parent.course_id);
    }
}
