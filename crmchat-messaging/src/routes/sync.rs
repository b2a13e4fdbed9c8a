use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::Json;
use std::sync::Arc;

use crmchat_shared::errors::AppResult;
use crmchat_shared::types::auth::AuthUser;
use crmchat_shared::types::StatusResponse;

use crate::routes::forms::{self, Poll, PollQuery, Typing, TypingForm};
use crate::services::sync::PollResponse;
use crate::services::{self, presence, typing};
use crate::AppState;

/// GET /chat/poll?conversation_id=&after_id= - delta since the client's checkpoint
pub async fn poll(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    query: Result<Query<PollQuery>, QueryRejection>,
) -> AppResult<Json<PollResponse>> {
    let req = Poll::try_from(forms::query(query)?)?;
    let settings = state.settings.clone();

    let delta = state
        .with_caller(auth_user, move |conn, caller| {
            services::sync::poll(conn, req.conversation_id, caller.id, req.after_id, services::now(), &settings)
        })
        .await?;
    Ok(Json(delta))
}

/// POST /chat/typing - set or clear the caller's typing flag
pub async fn set_typing(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    form: Result<Form<TypingForm>, FormRejection>,
) -> AppResult<Json<StatusResponse>> {
    let req = Typing::try_from(forms::form(form)?)?;

    state
        .with_caller(auth_user, move |conn, caller| {
            let now = services::now();
            typing::set_typing(conn, req.conversation_id, caller.id, req.is_typing, now)?;
            presence::record_presence(conn, caller.id, now)?;
            Ok(())
        })
        .await?;
    Ok(Json(StatusResponse::ok()))
}

/// POST /chat/heartbeat - keeps the caller online while no conversation is open
pub async fn heartbeat(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<StatusResponse>> {
    state
        .with_caller(auth_user, move |conn, caller| Ok(presence::record_presence(conn, caller.id, services::now())?))
        .await?;
    Ok(Json(StatusResponse::ok()))
}
