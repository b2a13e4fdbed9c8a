use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use diesel::sqlite::SqliteConnection;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crmchat_shared::clients::db::DbPool;
use crmchat_shared::errors::{AppError, AppResult};
use crmchat_shared::middleware::{metrics_middleware, JwtSecretSource};
use crmchat_shared::types::auth::AuthUser;

pub mod client;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;

use config::AppConfig;
use services::ChatSettings;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub settings: ChatSettings,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig, metrics: Option<PrometheusHandle>) -> Self {
        let settings = config.chat_settings();
        Self { db, config, settings, metrics }
    }

    /// Runs blocking diesel work on the blocking pool with a pooled connection.
    pub async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| AppError::Internal(e.into()))?
    }

    /// [`Self::with_conn`] for chat handlers: the caller is mirrored into the
    /// user directory first, so a user the identity service has not pushed
    /// yet can still start conversations.
    pub async fn with_caller<T, F>(&self, caller: AuthUser, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut SqliteConnection, &AuthUser) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_conn(move |conn| {
            services::directory::sync_caller(conn, &caller)?;
            f(conn, &caller)
        })
        .await
    }
}

impl JwtSecretSource for AppState {
    fn jwt_secret(&self) -> &str {
        &self.config.jwt_secret
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        // Internal (service-to-service)
        .route("/internal/users", post(routes::internal::sync_users))
        // Conversations
        .route("/chat/sidebar", get(routes::sidebar::sidebar))
        .route("/chat/conversation", get(routes::conversations::open_conversation))
        .route("/chat/conversations", post(routes::conversations::create_conversation))
        // Messages
        .route("/chat/messages", post(routes::messages::send_message))
        .route("/chat/read", post(routes::messages::mark_read))
        .route("/chat/unread-count", get(routes::messages::unread_count))
        // Sync
        .route("/chat/poll", get(routes::sync::poll))
        .route("/chat/typing", post(routes::sync::set_typing))
        .route("/chat/heartbeat", post(routes::sync::heartbeat))
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
