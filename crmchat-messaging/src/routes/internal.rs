use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crmchat_shared::errors::{AppError, AppResult};

use crate::models::NewUser;
use crate::routes::forms::{self, SyncUsersBody};
use crate::services::directory;
use crate::AppState;

pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

#[derive(Debug, Serialize)]
pub struct SyncUsersResponse {
    pub upserted: usize,
}

fn check_internal_token(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = state.config.internal_token.as_deref() else {
        return Ok(());
    };
    let presented = headers.get(INTERNAL_TOKEN_HEADER).and_then(|v| v.to_str().ok());
    if presented == Some(expected) {
        Ok(())
    } else {
        tracing::warn!("internal call with a missing or wrong token");
        Err(AppError::unauthorized())
    }
}

/// POST /internal/users - identity service pushes user records (service-to-service, no user auth)
pub async fn sync_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<SyncUsersBody>, JsonRejection>,
) -> AppResult<Json<SyncUsersResponse>> {
    check_internal_token(&state, &headers)?;
    let entries = forms::json(body)?.entries()?;
    let upserted = entries.len();

    state
        .with_conn(move |conn| {
            conn.immediate_transaction::<_, AppError, _>(|conn| {
                for entry in &entries {
                    let user = NewUser { id: entry.id, name: &entry.name, email: entry.email.as_deref() };
                    directory::upsert_user(conn, &user)?;
                }
                Ok(())
            })
        })
        .await?;

    tracing::debug!(upserted, "directory users synced");
    Ok(Json(SyncUsersResponse { upserted }))
}
