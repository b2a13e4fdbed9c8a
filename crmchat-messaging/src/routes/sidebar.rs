use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crmchat_shared::errors::AppResult;
use crmchat_shared::types::auth::AuthUser;

use crate::services::sidebar::{build_sidebar, Sidebar};
use crate::services;
use crate::AppState;

/// GET /chat/sidebar - users with presence and direct unread counts, plus groups
pub async fn sidebar(auth_user: AuthUser, State(state): State<Arc<AppState>>) -> AppResult<Json<Sidebar>> {
    let settings = state.settings.clone();
    let sidebar = state
        .with_caller(auth_user, move |conn, caller| {
            build_sidebar(conn, caller.id, &caller.name, services::now(), &settings)
        })
        .await?;
    Ok(Json(sidebar))
}
