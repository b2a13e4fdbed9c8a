//! Conversation list: every other user with presence and their direct
//! conversation, plus the caller's groups ordered by recent activity.

use std::cmp::Reverse;

use chrono::NaiveDateTime;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};

use crmchat_shared::errors::AppResult;
use crmchat_shared::UserId;

use crate::services::conversations::{direct_conversation_ids, groups_for, memberships};
use crate::services::directory::list_others;
use crate::services::messages::latest_message;
use crate::services::presence::{is_online, last_seen, record_presence};
use crate::services::read_cursor::unread_count;
use crate::services::ChatSettings;

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentUser {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SidebarUser {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub is_online: bool,
    /// None until a direct conversation with this user has been started.
    pub conversation_id: Option<i64>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePreview {
    pub id: i64,
    pub sender_id: UserId,
    pub sender: String,
    pub body: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SidebarGroup {
    pub id: i64,
    pub name: Option<String>,
    pub unread_count: i64,
    pub last_message: Option<MessagePreview>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sidebar {
    pub current_user: CurrentUser,
    pub users: Vec<SidebarUser>,
    pub groups: Vec<SidebarGroup>,
}

/// Cuts `body` to at most `max` characters, marking the cut with an ellipsis.
pub fn preview(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", body[..cut].trim_end()),
        None => body.to_string(),
    }
}

/// Read composition over presence, cursors and the latest message per group.
/// Not one transaction: counts may lag a concurrent send by one poll cycle.
pub fn build_sidebar(
    conn: &mut SqliteConnection,
    viewer_id: UserId,
    viewer_name: &str,
    now: NaiveDateTime,
    settings: &ChatSettings,
) -> AppResult<Sidebar> {
    record_presence(conn, viewer_id, now)?;

    let others = list_others(conn, viewer_id)?;
    let other_ids: Vec<UserId> = others.iter().map(|u| u.id).collect();
    let seen = last_seen(conn, &other_ids)?;
    let directs = direct_conversation_ids(conn, viewer_id, &other_ids)?;
    let cursors = memberships(conn, viewer_id)?;

    let mut users = Vec::with_capacity(others.len());
    for user in others {
        let conversation_id = directs.get(&user.id).copied();
        let unread = match conversation_id {
            Some(id) => {
                let cursor = cursors.get(&id).and_then(|p| p.last_read_message_id);
                unread_count(conn, id, viewer_id, cursor)?
            }
            None => 0,
        };
        users.push(SidebarUser {
            is_online: is_online(seen.get(&user.id).copied(), now, settings),
            id: user.id,
            name: user.name,
            email: user.email,
            conversation_id,
            unread_count: unread,
        });
    }

    let mut groups = Vec::new();
    for (conversation, participant) in groups_for(conn, viewer_id)? {
        let unread = unread_count(conn, conversation.id, viewer_id, participant.last_read_message_id)?;
        let last_message = latest_message(conn, conversation.id)?.map(|(message, sender)| MessagePreview {
            id: message.id,
            sender_id: message.sender_id,
            sender,
            body: preview(&message.body, PREVIEW_CHARS),
            created_at: message.created_at,
        });
        groups.push(SidebarGroup {
            id: conversation.id,
            name: conversation.name,
            unread_count: unread,
            last_message,
            created_at: conversation.created_at,
        });
    }
    groups.sort_by_key(|g| {
        let active = g.last_message.as_ref().map_or(g.created_at, |m| m.created_at);
        (Reverse(active), Reverse(g.id))
    });

    Ok(Sidebar {
        current_user: CurrentUser {
            id: viewer_id,
            name: viewer_name.to_string(),
        },
        users,
        groups,
    })
}
