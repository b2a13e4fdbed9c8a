use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crmchat_shared::UserId;

use crate::schema::{conversation_participants, conversations, message_reads, messages, user_presence, users};

// --- User ---

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = users)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: UserId,
    pub name: &'a str,
    pub email: Option<&'a str>,
}

// --- Presence ---

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = user_presence)]
pub struct PresenceUpsert {
    pub user_id: UserId,
    pub last_seen: NaiveDateTime,
}

// --- Conversation ---

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: i64,
    pub is_group: bool,
    #[serde(skip)]
    pub direct_key: Option<String>,
    pub name: Option<String>,
    pub created_by: UserId,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversation<'a> {
    pub is_group: bool,
    pub direct_key: Option<&'a str>,
    pub name: Option<&'a str>,
    pub created_by: UserId,
    pub created_at: NaiveDateTime,
}

// --- Participant ---

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = conversation_participants)]
pub struct Participant {
    pub id: i64,
    pub conversation_id: i64,
    pub user_id: UserId,
    pub last_read_message_id: Option<i64>,
    pub typing_at: Option<NaiveDateTime>,
    pub joined_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversation_participants)]
pub struct NewParticipant {
    pub conversation_id: i64,
    pub user_id: UserId,
    pub joined_at: NaiveDateTime,
}

// --- Message ---

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: UserId,
    pub body: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage<'a> {
    pub conversation_id: i64,
    pub sender_id: UserId,
    pub body: &'a str,
    pub created_at: NaiveDateTime,
}

// --- Read receipt ---

#[derive(Debug, Queryable, Selectable, Insertable, Serialize, Clone, PartialEq)]
#[diesel(table_name = message_reads)]
pub struct ReadReceipt {
    pub message_id: i64,
    pub user_id: UserId,
    pub read_at: NaiveDateTime,
}
