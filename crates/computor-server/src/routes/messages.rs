//! `GET/POST/DELETE /messages`, `POST/DELETE /messages/{id}/read`.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use computor_core::{ApiError, Message};
use computor_messages::{CreateMessageRequest, MessageRepository, NewMessageTarget};
use computor_permissions::filter::CandidateRow;
use computor_permissions::{Action, ResourceKind};

use crate::middleware::CurrentPrincipal;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(list_messages).post(create_message))
        .route("/messages/{id}", delete(delete_message))
        .route("/messages/{id}/read", post(mark_read).delete(mark_unread))
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub course_id: Uuid,
}

async fn list_messages(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let filter = state
        .permissions
        .build_query(&principal, ResourceKind::Message, Action::List, "message", "list")
        .await?;
    let candidates = state.repositories.list_messages_for_course(query.course_id).await?;

    let visible = candidates
        .into_iter()
        .filter(|message| {
            filter.matches(&CandidateRow {
                id: message.id,
                course_id: message.course_id,
                author_user_id: Some(message.author_user_id),
                target_user_id: message.target_user_id,
                course_member_id: message.target_course_member_id,
                submission_group_id: message.target_submission_group_id,
                course_group_id: message.target_course_group_id,
                ..Default::default()
            })
        })
        .collect();

    Ok(Json(visible))
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageBody {
    pub parent_id: Option<Uuid>,
    pub title: Option<String>,
    pub body: String,
    pub target_submission_group_id: Option<Uuid>,
    pub target_course_content_id: Option<Uuid>,
    pub target_course_id: Option<Uuid>,
}

async fn create_message(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(body): Json<CreateMessageBody>,
) -> Result<Json<Message>, ApiError> {
    let target = match (
        body.target_submission_group_id,
        body.target_course_content_id,
        body.target_course_id,
    ) {
        (Some(id), _, _) => Some(NewMessageTarget::SubmissionGroup(id)),
        (None, Some(id), _) => Some(NewMessageTarget::CourseContent(id)),
        (None, None, Some(id)) => Some(NewMessageTarget::Course(id)),
        (None, None, None) => None,
    };

    let message = state
        .messages
        .create_message(CreateMessageRequest {
            author_user_id: principal.user_id,
            parent_id: body.parent_id,
            title: body.title,
            body: body.body,
            target,
        })
        .await?;
    Ok(Json(message))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

async fn delete_message(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(message_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.messages.delete_message(message_id, principal.user_id).await?;
    Ok(Json(StatusResponse { status: "deleted" }))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(message_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.messages.mark_read(message_id, principal.user_id).await?;
    Ok(Json(StatusResponse { status: "read" }))
}

async fn mark_unread(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(message_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.messages.mark_unread(message_id, principal.user_id).await?;
    Ok(Json(StatusResponse { status: "unread" }))
}
