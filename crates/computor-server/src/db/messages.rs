use async_trait::async_trait;
use uuid::Uuid;

use computor_core::{ApiError, CourseRole, Message};
use computor_messages::MessageRepository;

use super::PgRepositories;

#[async_trait]
impl MessageRepository for PgRepositories {
    async fn find_message(&self, message_id: Uuid) -> Result<Option<Message>, ApiError> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(message)
    }

    async fn course_id_of_submission_group(&self, submission_group_id: Uuid) -> Result<Uuid, ApiError> {
        let row: (Uuid,) = sqlx::query_as("SELECT course_id FROM submission_groups WHERE id = $1")
            .bind(submission_group_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn course_id_of_course_content(&self, course_content_id: Uuid) -> Result<Uuid, ApiError> {
        let row: (Uuid,) = sqlx::query_as("SELECT course_id FROM course_contents WHERE id = $1")
            .bind(course_content_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn is_submission_group_member(
        &self,
        submission_group_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, ApiError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM submission_group_members sgm \
             JOIN course_members cm ON cm.id = sgm.course_member_id \
             WHERE sgm.submission_group_id = $1 AND cm.user_id = $2)",
        )
        .bind(submission_group_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn course_role_of(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<CourseRole>, ApiError> {
        let row: Option<(CourseRole,)> =
            sqlx::query_as("SELECT course_role FROM course_members WHERE user_id = $1 AND course_id = $2")
                .bind(user_id)
                .bind(course_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(role,)| role))
    }

    async fn insert_message(&self, message: Message) -> Result<Message, ApiError> {
        let inserted = sqlx::query_as::<_, Message>(
            "INSERT INTO messages \
             (id, author_user_id, parent_id, title, body, target_user_id, target_course_member_id, \
              target_submission_group_id, target_course_group_id, target_course_content_id, \
              target_course_id, course_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
        )
        .bind(message.id)
        .bind(message.author_user_id)
        .bind(message.parent_id)
        .bind(&message.title)
        .bind(&message.body)
        .bind(message.target_user_id)
        .bind(message.target_course_member_id)
        .bind(message.target_submission_group_id)
        .bind(message.target_course_group_id)
        .bind(message.target_course_content_id)
        .bind(message.target_course_id)
        .bind(message.course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_read(&self, message_id: Uuid, reader_user_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query(
            "INSERT INTO message_reads (message_id, reader_user_id, read_at) \
             VALUES ($1, $2, now()) ON CONFLICT DO NOTHING",
        )
        .bind(message_id)
        .bind(reader_user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_unread(&self, message_id: Uuid, reader_user_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM message_reads WHERE message_id = $1 AND reader_user_id = $2")
            .bind(message_id)
            .bind(reader_user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl PgRepositories {
    /// Candidate rows for `GET /messages?course_id=...`; visibility
    /// narrowing happens in the caller via `QueryFilter::matches`.
    pub async fn list_messages_for_course(&self, course_id: Uuid) -> Result<Vec<Message>, ApiError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE course_id = $1 ORDER BY created_at DESC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// `course_member_id` for `(user_id, course_id)`, used to populate a
    /// `CandidateRow` when filtering a message list.
    pub async fn course_member_id_of(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<Uuid>, ApiError> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM course_members WHERE user_id = $1 AND course_id = $2")
                .bind(user_id)
                .bind(course_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }
}
