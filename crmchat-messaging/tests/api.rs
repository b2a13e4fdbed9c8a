use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crmchat_messaging::client::ChatSession;
use crmchat_messaging::config::AppConfig;
use crmchat_messaging::models::NewUser;
use crmchat_messaging::services::directory;
use crmchat_messaging::{db, router, AppState};
use crmchat_shared::clients::db::create_pool;
use crmchat_shared::types::auth::{encode_token, Claims};

const SECRET: &str = "test-secret";

const ANA: (i64, &str) = (1, "Ana");
const BEN: (i64, &str) = (2, "Ben");
const CLEO: (i64, &str) = (3, "Cleo");

struct TestApp {
    app: Router,
    _dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        Self::build(&[ANA, BEN, CLEO], None)
    }

    /// No directory rows at all, as on a fresh deployment.
    fn empty(internal_token: Option<&str>) -> Self {
        Self::build(&[], internal_token)
    }

    fn build(users: &[(i64, &str)], internal_token: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.db");
        let pool = create_pool(path.to_str().unwrap(), 4).unwrap();
        {
            let mut conn = pool.get().unwrap();
            db::run_migrations(&mut conn).unwrap();
            for &(id, name) in users {
                let email = format!("{}@crm.test", name.to_lowercase());
                directory::upsert_user(&mut conn, &NewUser { id, name, email: Some(&email) }).unwrap();
            }
        }

        let config = AppConfig {
            jwt_secret: SECRET.into(),
            internal_token: internal_token.map(String::from),
            ..AppConfig::default()
        };
        let state = Arc::new(AppState::new(pool, config, None));
        Self { app: router(state), _dir: dir }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get(&self, uri: &str, user: Option<(i64, &str)>) -> (StatusCode, Value) {
        let mut req = Request::builder().method("GET").uri(uri);
        if let Some(user) = user {
            req = req.header("authorization", bearer(user));
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, user: (i64, &str), form: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("authorization", bearer(user))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();
        self.send(req).await
    }

    async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            req = req.header("x-internal-token", token);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn direct(&self, from: (i64, &str), to: (i64, &str)) -> i64 {
        let (status, body) = self
            .post("/chat/conversations", from, &format!("participants={}", to.0))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["conversation"]["id"].as_i64().unwrap()
    }
}

fn bearer((id, name): (i64, &str)) -> String {
    let token = encode_token(&Claims::new(id, name, 3600), SECRET).unwrap();
    format!("Bearer {token}")
}

#[tokio::test]
async fn unauthenticated_calls_are_rejected() {
    let app = TestApp::new();

    let (status, body) = app.get("/chat/sidebar", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Authentication required."}));

    // auth is checked before input validation
    let (status, _) = app.get("/chat/poll", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn direct_conversation_is_shared_by_both_sides() {
    let app = TestApp::new();

    let (status, first) = app.post("/chat/conversations", ANA, "participants=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["conversation"]["is_group"], json!(false));
    assert_eq!(first["participants"].as_array().unwrap().len(), 2);

    let (_, second) = app.post("/chat/conversations", BEN, "participants%5B%5D=1").await;
    assert_eq!(second["conversation"]["id"], first["conversation"]["id"]);
}

#[tokio::test]
async fn group_creation() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/chat/conversations", ANA, "participants%5B%5D=2&participants%5B%5D=3&name=Ops")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["conversation"]["is_group"], json!(true));
    assert_eq!(body["conversation"]["name"], json!("Ops"));
    assert_eq!(body["participants"].as_array().unwrap().len(), 3);

    let (status, body) = app.post("/chat/conversations", ANA, "participants=1").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], json!("At least two unique participants are required."));

    let (status, body) = app.post("/chat/conversations", ANA, "participants=2,77").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], json!("Unknown participant."));
}

#[tokio::test]
async fn send_then_poll_shows_own_receipt() {
    let app = TestApp::new();
    let conv = app.direct(ANA, BEN).await;

    let (status, sent) = app
        .post("/chat/messages", ANA, &format!("conversation_id={conv}&message=Hello"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["message"]["body"], json!("Hello"));

    let (status, delta) = app
        .get(&format!("/chat/poll?conversation_id={conv}&after_id=0"), Some(ANA))
        .await;
    assert_eq!(status, StatusCode::OK);
    let messages = delta["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["body"], json!("Hello"));
    assert_eq!(messages[0]["is_mine"], json!(true));
    assert_eq!(messages[0]["read_by"][0]["user_id"], json!(1));
    assert_eq!(delta["last_message_id"], sent["message"]["id"]);
}

#[tokio::test]
async fn outsiders_get_access_denied() {
    let app = TestApp::new();
    let conv = app.direct(ANA, BEN).await;
    let denied = json!({"error": "Access denied."});

    let (status, body) = app.get(&format!("/chat/poll?conversation_id={conv}"), Some(CLEO)).await;
    assert_eq!((status, body), (StatusCode::FORBIDDEN, denied.clone()));

    let (status, body) = app
        .post("/chat/messages", CLEO, &format!("conversation_id={conv}&message=hi"))
        .await;
    assert_eq!((status, body), (StatusCode::FORBIDDEN, denied.clone()));

    let (status, body) = app
        .post("/chat/read", CLEO, &format!("conversation_id={conv}&last_message_id=1"))
        .await;
    assert_eq!((status, body), (StatusCode::FORBIDDEN, denied.clone()));

    let (status, body) = app
        .post("/chat/typing", CLEO, &format!("conversation_id={conv}&is_typing=1"))
        .await;
    assert_eq!((status, body), (StatusCode::FORBIDDEN, denied.clone()));

    let (status, body) = app.get(&format!("/chat/conversation?conversation_id={conv}"), Some(CLEO)).await;
    assert_eq!((status, body), (StatusCode::FORBIDDEN, denied));

    let (status, body) = app.get("/chat/conversation?conversation_id=999", Some(CLEO)).await;
    assert_eq!((status, body), (StatusCode::NOT_FOUND, json!({"error": "Conversation not found."})));
}

#[tokio::test]
async fn malformed_input_is_unprocessable() {
    let app = TestApp::new();

    let (status, body) = app.get("/chat/poll", Some(ANA)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], json!("conversation_id is required."));

    let (status, body) = app.post("/chat/read", ANA, "conversation_id=1").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], json!("last_message_id is required."));

    let (status, body) = app.post("/chat/typing", ANA, "conversation_id=abc&is_typing=1").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], json!("conversation_id must be an integer."));

    let (status, body) = app.post("/chat/messages", ANA, "conversation_id=1&message=").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn typing_read_and_unread_flow() {
    let app = TestApp::new();
    let conv = app.direct(ANA, BEN).await;

    let (_, sent) = app
        .post("/chat/messages", ANA, &format!("conversation_id={conv}&message=ping"))
        .await;
    let message_id = sent["message"]["id"].as_i64().unwrap();

    let (status, body) = app
        .post("/chat/typing", ANA, &format!("conversation_id={conv}&is_typing=true"))
        .await;
    assert_eq!((status, body), (StatusCode::OK, json!({"status": "ok"})));

    let (_, delta) = app
        .get(&format!("/chat/poll?conversation_id={conv}&after_id={message_id}"), Some(BEN))
        .await;
    assert_eq!(delta["typing"], json!([{"user_id": 1, "name": "Ana"}]));
    assert!(delta["messages"].as_array().unwrap().is_empty());

    let (_, unread) = app.get("/chat/unread-count", Some(BEN)).await;
    assert_eq!(unread, json!({"total_unread": 1}));

    let (status, body) = app
        .post("/chat/read", BEN, &format!("conversation_id={conv}&last_message_id={message_id}"))
        .await;
    assert_eq!((status, body), (StatusCode::OK, json!({"status": "ok"})));

    let (_, unread) = app.get("/chat/unread-count", Some(BEN)).await;
    assert_eq!(unread, json!({"total_unread": 0}));

    // Ana's next poll surfaces Ben's receipt on the already-delivered message
    let (_, delta) = app
        .get(&format!("/chat/poll?conversation_id={conv}&after_id={message_id}"), Some(ANA))
        .await;
    let readers: Vec<i64> = delta["reads"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["message_id"] == json!(message_id))
        .map(|r| r["user_id"].as_i64().unwrap())
        .collect();
    assert!(readers.contains(&2));
}

#[tokio::test]
async fn sidebar_lists_others_and_groups() {
    let app = TestApp::new();
    let conv = app.direct(ANA, BEN).await;
    app.post("/chat/messages", BEN, &format!("conversation_id={conv}&message=hey")).await;
    app.post("/chat/conversations", BEN, "participants=1,3&name=Deals").await;

    let (status, sidebar) = app.get("/chat/sidebar", Some(ANA)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sidebar["current_user"], json!({"id": 1, "name": "Ana"}));

    let users = sidebar["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["name"], json!("Ben"));
    assert_eq!(users[0]["is_online"], json!(true));
    assert_eq!(users[0]["conversation_id"], json!(conv));
    assert_eq!(users[0]["unread_count"], json!(1));
    assert_eq!(users[1]["conversation_id"], Value::Null);

    let groups = sidebar["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["name"], json!("Deals"));
    assert_eq!(groups[0]["last_message"], Value::Null);
}

#[tokio::test]
async fn chat_session_tracks_the_api() {
    let app = TestApp::new();
    let conv = app.direct(ANA, BEN).await;
    app.post("/chat/messages", BEN, &format!("conversation_id={conv}&message=one")).await;

    let mut session = ChatSession::new();
    let (_, view) = app.get(&format!("/chat/conversation?conversation_id={conv}"), Some(ANA)).await;
    assert_eq!(view["conversation"]["name"], json!("Ben"));
    session.open(serde_json::from_value(view).unwrap());
    assert_eq!(session.messages().count(), 1);

    let (_, sent) = app
        .post("/chat/messages", ANA, &format!("conversation_id={conv}&message=two"))
        .await;
    session.apply_sent(conv, serde_json::from_value(sent["message"].clone()).unwrap());
    app.post("/chat/messages", BEN, &format!("conversation_id={conv}&message=three")).await;

    let (conversation_id, after_id) = session.poll_params().unwrap();
    let (_, delta) = app
        .get(&format!("/chat/poll?conversation_id={conversation_id}&after_id={after_id}"), Some(ANA))
        .await;
    let fresh = session.apply_poll(conversation_id, serde_json::from_value(delta).unwrap());

    assert_eq!(fresh.len(), 1);
    let bodies: Vec<&str> = session.messages().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["one", "two", "three"]);
    assert_eq!(session.poll_params().unwrap().1, session.latest_id().unwrap());
}

#[tokio::test]
async fn heartbeat_and_health() {
    let app = TestApp::new();

    let (status, body) = app.post("/chat/heartbeat", CLEO, "").await;
    assert_eq!((status, body), (StatusCode::OK, json!({"status": "ok"})));

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["service"], json!("crmchat-messaging"));

    let (status, _) = app.get("/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_directory_fills_from_callers_and_internal_sync() {
    let app = TestApp::empty(None);

    // the caller is mirrored from their token, nobody else is known yet
    let (status, sidebar) = app.get("/chat/sidebar", Some(ANA)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sidebar["current_user"], json!({"id": 1, "name": "Ana"}));
    assert!(sidebar["users"].as_array().unwrap().is_empty());

    let (status, body) = app.post("/chat/conversations", ANA, "participants=2").await;
    assert_eq!((status, body), (StatusCode::UNPROCESSABLE_ENTITY, json!({"error": "Unknown participant."})));

    let (status, body) = app
        .post_json("/internal/users", None, json!({"users": [{"id": 2, "name": "Ben", "email": "ben@crm.test"}]}))
        .await;
    assert_eq!((status, body), (StatusCode::OK, json!({"upserted": 1})));

    let conv = app.direct(ANA, BEN).await;
    let (status, sidebar) = app.get("/chat/sidebar", Some(BEN)).await;
    assert_eq!(status, StatusCode::OK);
    let users = sidebar["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["name"], json!("Ana"));
    assert_eq!(users[0]["email"], Value::Null);
    assert_eq!(users[0]["conversation_id"], json!(conv));
}

#[tokio::test]
async fn internal_sync_checks_token_and_input() {
    let app = TestApp::empty(Some("svc-token"));
    let ben = json!({"users": [{"id": 2, "name": "Ben"}]});

    let (status, _) = app.post_json("/internal/users", None, ben.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.post_json("/internal/users", Some("wrong"), ben.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.post_json("/internal/users", Some("svc-token"), json!({"users": []})).await;
    assert_eq!((status, body), (StatusCode::UNPROCESSABLE_ENTITY, json!({"error": "users must not be empty."})));

    let (status, body) = app
        .post_json("/internal/users", Some("svc-token"), json!({"users": [{"id": 0, "name": "Nobody"}]}))
        .await;
    assert_eq!((status, body), (StatusCode::UNPROCESSABLE_ENTITY, json!({"error": "User id must be positive."})));

    let (status, body) = app.post_json("/internal/users", Some("svc-token"), ben).await;
    assert_eq!((status, body), (StatusCode::OK, json!({"upserted": 1})));
}
