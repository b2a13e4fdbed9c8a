use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crmchat_shared::errors::AppResult;
use crmchat_shared::types::auth::AuthUser;
use crmchat_shared::types::StatusResponse;

use crate::routes::forms::{self, MarkRead, MarkReadForm, SendMessage, SendMessageForm};
use crate::services::messages::MessageView;
use crate::services::{self, messages, presence, read_cursor};
use crate::AppState;

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct SentMessage {
    pub message: MessageView,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub total_unread: i64,
}

// --- Handlers ---

/// POST /chat/messages - append a message to a conversation
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    form: Result<Form<SendMessageForm>, FormRejection>,
) -> AppResult<Json<SentMessage>> {
    let req = SendMessage::try_from(forms::form(form)?)?;
    let settings = state.settings.clone();

    let message = state
        .with_caller(auth_user, move |conn, caller| {
            let now = services::now();
            let message = messages::send_message(conn, req.conversation_id, caller.id, &req.message, now, &settings)?;
            presence::record_presence(conn, caller.id, now)?;
            Ok(message)
        })
        .await?;
    Ok(Json(SentMessage { message }))
}

/// POST /chat/read - acknowledge everything up to a message id
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    form: Result<Form<MarkReadForm>, FormRejection>,
) -> AppResult<Json<StatusResponse>> {
    let req = MarkRead::try_from(forms::form(form)?)?;

    state
        .with_caller(auth_user, move |conn, caller| {
            let now = services::now();
            read_cursor::mark_read(conn, req.conversation_id, caller.id, req.last_message_id, now)?;
            presence::record_presence(conn, caller.id, now)?;
            Ok(())
        })
        .await?;
    Ok(Json(StatusResponse::ok()))
}

/// GET /chat/unread-count - unread messages across all of the caller's conversations
pub async fn unread_count(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<UnreadCountResponse>> {
    let total_unread = state
        .with_caller(auth_user, move |conn, caller| {
            presence::record_presence(conn, caller.id, services::now())?;
            Ok(read_cursor::total_unread(conn, caller.id)?)
        })
        .await?;
    Ok(Json(UnreadCountResponse { total_unread }))
}
