//! Polling delta protocol and the full conversation view.
//!
//! A client opens a conversation once, then polls with `after_id` set to the
//! last `last_message_id` it received. Because message ids are strictly
//! monotonic and `messages` is everything with `id > after_id`, the union of
//! all poll responses has no gaps and no duplicates.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};

use crmchat_shared::errors::{AppError, AppResult};
use crmchat_shared::UserId;

use crate::services::conversations::{find_conversation, participant_users, require_participant};
use crate::services::messages::{latest_message_id, messages_after, receipts_from, MessageView, ReceiptView};
use crate::services::presence::{is_online, last_seen, record_presence};
use crate::services::typing::{active_typists, Typist};
use crate::services::ChatSettings;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollResponse {
    pub messages: Vec<MessageView>,
    pub reads: Vec<ReceiptView>,
    pub typing: Vec<Typist>,
    pub last_message_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantView {
    pub id: UserId,
    pub name: String,
    pub is_online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationView {
    pub id: i64,
    /// Group name, or the counterpart's name for a direct conversation.
    pub name: Option<String>,
    pub is_group: bool,
    pub participants: Vec<ParticipantView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenConversation {
    pub conversation: ConversationView,
    pub messages: Vec<MessageView>,
    pub last_message_id: i64,
    pub typing: Vec<Typist>,
}

/// Delta since `after_id`: new messages, receipts within the look-back
/// window, live typists and the new checkpoint. Doubles as a heartbeat.
pub fn poll(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    viewer: UserId,
    after_id: i64,
    now: NaiveDateTime,
    settings: &ChatSettings,
) -> AppResult<PollResponse> {
    require_participant(conn, conversation_id, viewer)?;
    record_presence(conn, viewer, now)?;

    let after_id = after_id.max(0);
    // One read snapshot: a send committing mid-poll must not land between the
    // message read and the checkpoint, or it would be skipped for good.
    let (messages, reads, typing, stored) = conn.transaction::<_, AppError, _>(|conn| {
        let messages = messages_after(conn, conversation_id, after_id, viewer)?;
        let from_id = after_id.saturating_sub(settings.receipt_lookback).max(0);
        let reads = receipts_from(conn, conversation_id, from_id)?;
        let typing = active_typists(conn, conversation_id, viewer, now, settings.typing_window)?;
        let stored = latest_message_id(conn, conversation_id)?.unwrap_or(0);
        Ok((messages, reads, typing, stored))
    })?;

    let seen = messages.last().map_or(0, |m| m.id);
    let last_message_id = after_id.max(seen).max(stored);

    tracing::trace!(
        conversation_id,
        viewer,
        after_id,
        delivered = messages.len(),
        last_message_id,
        "poll"
    );

    Ok(PollResponse {
        messages,
        reads,
        typing,
        last_message_id,
    })
}

/// Full history and participant list for a conversation the viewer belongs to.
pub fn open_conversation(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    viewer: UserId,
    now: NaiveDateTime,
    settings: &ChatSettings,
) -> AppResult<OpenConversation> {
    let conversation = find_conversation(conn, conversation_id)?.ok_or_else(AppError::conversation_not_found)?;
    require_participant(conn, conversation_id, viewer)?;
    record_presence(conn, viewer, now)?;

    let members = participant_users(conn, conversation_id)?;
    let ids: Vec<UserId> = members.iter().map(|u| u.id).collect();
    let seen = last_seen(conn, &ids)?;

    let name = if conversation.is_group {
        conversation.name.clone()
    } else {
        members.iter().find(|u| u.id != viewer).map(|u| u.name.clone())
    };

    let participants = members
        .into_iter()
        .map(|u| ParticipantView {
            is_online: is_online(seen.get(&u.id).copied(), now, settings),
            id: u.id,
            name: u.name,
        })
        .collect();

    let messages = messages_after(conn, conversation_id, 0, viewer)?;
    let last_message_id = messages.last().map_or(0, |m| m.id);
    let typing = active_typists(conn, conversation_id, viewer, now, settings.typing_window)?;

    Ok(OpenConversation {
        conversation: ConversationView {
            id: conversation.id,
            name,
            is_group: conversation.is_group,
            participants,
        },
        messages,
        last_message_id,
        typing,
    })
}
