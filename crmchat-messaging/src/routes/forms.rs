//! Request DTOs. Raw query/form input is deserialized with every field
//! optional and then converted into a typed request, so a missing or
//! malformed field is a 422 with the JSON error envelope rather than axum's
//! plaintext rejection.

use axum::extract::rejection::{FormRejection, JsonRejection, QueryRejection};
use axum::extract::{Form, Query};
use axum::Json;
use serde::Deserialize;
use validator::{Validate, ValidationErrors};

use crmchat_shared::errors::{AppError, AppResult};
use crmchat_shared::UserId;

pub fn query<T>(extracted: Result<Query<T>, QueryRejection>) -> AppResult<T> {
    extracted
        .map(|Query(raw)| raw)
        .map_err(|rejection| AppError::invalid_input(rejection.body_text()))
}

pub fn form<T>(extracted: Result<Form<T>, FormRejection>) -> AppResult<T> {
    extracted
        .map(|Form(raw)| raw)
        .map_err(|rejection| AppError::invalid_input(rejection.body_text()))
}

pub fn json<T>(extracted: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    extracted
        .map(|Json(raw)| raw)
        .map_err(|rejection| AppError::invalid_input(rejection.body_text()))
}

fn required_id(raw: Option<&str>, field: &str) -> AppResult<i64> {
    let raw = raw.map(str::trim).filter(|v| !v.is_empty());
    let raw = raw.ok_or_else(|| AppError::invalid_input(format!("{field} is required.")))?;
    parse_id(raw, field)
}

fn parse_id(raw: &str, field: &str) -> AppResult<i64> {
    raw.parse()
        .map_err(|_| AppError::invalid_input(format!("{field} must be an integer.")))
}

fn truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

fn validated<T: Validate>(req: T) -> AppResult<T> {
    req.validate().map_err(|e| AppError::invalid_input(first_message(&e)))?;
    Ok(req)
}

fn first_message(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| errors.to_string())
}

// --- Conversation ---

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationQuery {
    pub conversation_id: Option<String>,
}

impl ConversationQuery {
    pub fn conversation_id(&self) -> AppResult<i64> {
        required_id(self.conversation_id.as_deref(), "conversation_id")
    }
}

#[derive(Debug, Validate)]
pub struct CreateConversation {
    pub participants: Vec<UserId>,
    #[validate(length(max = 100, message = "Group name cannot exceed 100 characters."))]
    pub name: Option<String>,
}

impl CreateConversation {
    /// Accepts `participants`, `participants[]` (repeatable) and
    /// comma-separated lists in any combination.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> AppResult<Self> {
        let mut participants = Vec::new();
        let mut name = None;
        for (key, value) in pairs {
            match key.as_str() {
                "participants" | "participants[]" => {
                    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                        participants.push(parse_id(part, "participants")?);
                    }
                }
                "name" => name = Some(value),
                other => return Err(AppError::invalid_input(format!("Unexpected field `{other}`."))),
            }
        }
        validated(Self { participants, name })
    }
}

// --- Directory ---

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DirectoryEntry {
    #[validate(range(min = 1, message = "User id must be positive."))]
    pub id: i64, // `UserId` alias spelled out: validator's `range` only recognises primitive names
    #[validate(length(min = 1, max = 255, message = "User name must be 1 to 255 characters."))]
    pub name: String,
    #[validate(email(message = "Email is invalid."))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncUsersBody {
    pub users: Vec<DirectoryEntry>,
}

impl SyncUsersBody {
    pub fn entries(self) -> AppResult<Vec<DirectoryEntry>> {
        if self.users.is_empty() {
            return Err(AppError::invalid_input("users must not be empty."));
        }
        self.users.into_iter().map(validated).collect()
    }
}

// --- Messages ---

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageForm {
    pub conversation_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Validate)]
pub struct SendMessage {
    pub conversation_id: i64,
    #[validate(length(min = 1, message = "Message cannot be empty."))]
    pub message: String,
}

impl TryFrom<SendMessageForm> for SendMessage {
    type Error = AppError;

    fn try_from(raw: SendMessageForm) -> AppResult<Self> {
        let conversation_id = required_id(raw.conversation_id.as_deref(), "conversation_id")?;
        let message = raw.message.ok_or_else(|| AppError::invalid_input("message is required."))?;
        validated(Self { conversation_id, message })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadForm {
    pub conversation_id: Option<String>,
    pub last_message_id: Option<String>,
}

#[derive(Debug)]
pub struct MarkRead {
    pub conversation_id: i64,
    pub last_message_id: i64,
}

impl TryFrom<MarkReadForm> for MarkRead {
    type Error = AppError;

    fn try_from(raw: MarkReadForm) -> AppResult<Self> {
        Ok(Self {
            conversation_id: required_id(raw.conversation_id.as_deref(), "conversation_id")?,
            last_message_id: required_id(raw.last_message_id.as_deref(), "last_message_id")?,
        })
    }
}

// --- Sync ---

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollQuery {
    pub conversation_id: Option<String>,
    pub after_id: Option<String>,
}

#[derive(Debug)]
pub struct Poll {
    pub conversation_id: i64,
    pub after_id: i64,
}

impl TryFrom<PollQuery> for Poll {
    type Error = AppError;

    fn try_from(raw: PollQuery) -> AppResult<Self> {
        let conversation_id = required_id(raw.conversation_id.as_deref(), "conversation_id")?;
        let after_id = match raw.after_id.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => parse_id(v, "after_id")?,
            None => 0,
        };
        Ok(Self { conversation_id, after_id })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypingForm {
    pub conversation_id: Option<String>,
    pub is_typing: Option<String>,
}

#[derive(Debug)]
pub struct Typing {
    pub conversation_id: i64,
    pub is_typing: bool,
}

impl TryFrom<TypingForm> for Typing {
    type Error = AppError;

    fn try_from(raw: TypingForm) -> AppResult<Self> {
        Ok(Self {
            conversation_id: required_id(raw.conversation_id.as_deref(), "conversation_id")?,
            is_typing: raw.is_typing.as_deref().is_some_and(truthy),
        })
    }
}
