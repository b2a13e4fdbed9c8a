use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;

use crmchat_shared::errors::AppResult;
use crmchat_shared::types::auth::AuthUser;

use crate::models::User;
use crate::routes::forms::{self, ConversationQuery, CreateConversation};
use crate::services::{self, conversations, presence, sync};
use crate::AppState;

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct CreatedConversation {
    pub conversation: ConversationSummary,
    pub participants: Vec<User>,
}

// --- Handlers ---

/// GET /chat/conversation?conversation_id= - full history of one conversation
pub async fn open_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    query: Result<Query<ConversationQuery>, QueryRejection>,
) -> AppResult<Json<sync::OpenConversation>> {
    let conversation_id = forms::query(query)?.conversation_id()?;
    let settings = state.settings.clone();

    let view = state
        .with_caller(auth_user, move |conn, caller| {
            sync::open_conversation(conn, conversation_id, caller.id, services::now(), &settings)
        })
        .await?;
    Ok(Json(view))
}

/// POST /chat/conversations - find or create the conversation for a participant set
pub async fn create_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> AppResult<Json<CreatedConversation>> {
    let req = CreateConversation::from_pairs(forms::form(form)?)?;

    let resolved = state
        .with_caller(auth_user, move |conn, caller| {
            let now = services::now();
            let resolved =
                conversations::ensure_conversation(conn, &req.participants, caller.id, req.name.as_deref(), now)?;
            presence::record_presence(conn, caller.id, now)?;
            Ok(resolved)
        })
        .await?;

    let conversation = resolved.conversation;
    Ok(Json(CreatedConversation {
        conversation: ConversationSummary {
            id: conversation.id,
            name: conversation.name,
            is_group: conversation.is_group,
            created_at: conversation.created_at,
        },
        participants: resolved.participants,
    }))
}
