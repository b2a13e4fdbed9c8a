//! Conversation resolution: maps a participant set to exactly one
//! conversation, deduplicating direct (two-person) conversations by key.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crmchat_shared::errors::{AppError, AppResult, ErrorCode};
use crmchat_shared::UserId;

use crate::models::{Conversation, NewConversation, NewParticipant, Participant, User};
use crate::schema::{conversation_participants, conversations, users};
use crate::services::directory;

/// Result of [`ensure_conversation`].
#[derive(Debug, Clone, Serialize)]
pub struct Resolved {
    pub conversation: Conversation,
    pub participants: Vec<User>,
    /// False when an existing direct conversation was returned.
    pub created: bool,
}

/// Deterministic key for the unordered pair `{a, b}`.
pub fn direct_key(a: UserId, b: UserId) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    hex::encode(Sha256::digest(format!("{lo}:{hi}").as_bytes()))
}

/// Deduplicates `ids` and adds the creator, in ascending order.
pub fn normalize_participants(ids: &[UserId], creator_id: UserId) -> Vec<UserId> {
    ids.iter()
        .copied()
        .chain(std::iter::once(creator_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Returns the conversation for `participant_ids` plus the creator.
///
/// Two participants resolve to their unique direct conversation, created on
/// first use. A concurrent creator of the same pair loses on the `direct_key`
/// unique constraint and re-fetches the winner's row. Three or more always
/// create a new group.
pub fn ensure_conversation(
    conn: &mut SqliteConnection,
    participant_ids: &[UserId],
    creator_id: UserId,
    name: Option<&str>,
    now: NaiveDateTime,
) -> AppResult<Resolved> {
    let ids = normalize_participants(participant_ids, creator_id);
    if ids.len() < 2 {
        return Err(AppError::invalid_input(
            "At least two unique participants are required.",
        ));
    }

    if directory::count_known(conn, &ids)? != ids.len() as i64 {
        return Err(AppError::invalid_input("Unknown participant."));
    }

    let (conversation, created) = if let &[a, b] = ids.as_slice() {
        resolve_direct(conn, a, b, creator_id, now)?
    } else {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let new_conv = NewConversation {
            is_group: true,
            direct_key: None,
            name,
            created_by: creator_id,
            created_at: now,
        };
        let conversation = conn
            .immediate_transaction(|conn| insert_with_participants(conn, &new_conv, &ids, now))
            .map_err(create_failed)?;
        (conversation, true)
    };

    if created {
        metrics::counter!("chat_conversations_created_total").increment(1);
        tracing::info!(
            conversation_id = conversation.id,
            is_group = conversation.is_group,
            creator_id,
            participants = ids.len(),
            "conversation created"
        );
    }

    let participants = participant_users(conn, conversation.id)?;
    Ok(Resolved { conversation, participants, created })
}

fn resolve_direct(
    conn: &mut SqliteConnection,
    a: UserId,
    b: UserId,
    creator_id: UserId,
    now: NaiveDateTime,
) -> AppResult<(Conversation, bool)> {
    let key = direct_key(a, b);
    if let Some(existing) = find_direct(conn, &key)? {
        return Ok((existing, false));
    }

    let new_conv = NewConversation {
        is_group: false,
        direct_key: Some(&key),
        name: None,
        created_by: creator_id,
        created_at: now,
    };

    match conn.immediate_transaction(|conn| insert_with_participants(conn, &new_conv, &[a, b], now)) {
        Ok(conversation) => Ok((conversation, true)),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            tracing::debug!(direct_key = %key, "direct conversation created concurrently, re-fetching");
            let winner = find_direct(conn, &key)?.ok_or_else(|| {
                AppError::with_details(
                    ErrorCode::ConversationCreateFailed,
                    "Unable to create conversation.",
                    "direct key conflict without a matching row",
                )
            })?;
            Ok((winner, false))
        }
        Err(e) => Err(create_failed(e)),
    }
}

fn insert_with_participants(
    conn: &mut SqliteConnection,
    new_conv: &NewConversation<'_>,
    member_ids: &[UserId],
    now: NaiveDateTime,
) -> QueryResult<Conversation> {
    let conversation: Conversation = diesel::insert_into(conversations::table)
        .values(new_conv)
        .returning(Conversation::as_returning())
        .get_result(conn)?;

    let members: Vec<NewParticipant> = member_ids
        .iter()
        .map(|&user_id| NewParticipant {
            conversation_id: conversation.id,
            user_id,
            joined_at: now,
        })
        .collect();

    diesel::insert_into(conversation_participants::table)
        .values(&members)
        .execute(conn)?;

    Ok(conversation)
}

fn create_failed(err: DieselError) -> AppError {
    AppError::with_details(
        ErrorCode::ConversationCreateFailed,
        "Unable to create conversation.",
        err.to_string(),
    )
}

pub fn find_direct(conn: &mut SqliteConnection, key: &str) -> QueryResult<Option<Conversation>> {
    conversations::table
        .filter(conversations::direct_key.eq(key))
        .select(Conversation::as_select())
        .first(conn)
        .optional()
}

pub fn find_conversation(conn: &mut SqliteConnection, id: i64) -> QueryResult<Option<Conversation>> {
    conversations::table
        .find(id)
        .select(Conversation::as_select())
        .first(conn)
        .optional()
}

pub fn find_participant(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    user_id: UserId,
) -> QueryResult<Option<Participant>> {
    conversation_participants::table
        .filter(conversation_participants::conversation_id.eq(conversation_id))
        .filter(conversation_participants::user_id.eq(user_id))
        .select(Participant::as_select())
        .first(conn)
        .optional()
}

/// Membership gate run before every conversation-scoped operation.
pub fn require_participant(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    user_id: UserId,
) -> AppResult<Participant> {
    find_participant(conn, conversation_id, user_id)?.ok_or_else(AppError::access_denied)
}

/// Members of a conversation with their directory entries, by user id.
pub fn participant_users(conn: &mut SqliteConnection, conversation_id: i64) -> QueryResult<Vec<User>> {
    conversation_participants::table
        .inner_join(users::table)
        .filter(conversation_participants::conversation_id.eq(conversation_id))
        .order(users::id.asc())
        .select(User::as_select())
        .load(conn)
}

/// Direct conversation id per counterpart, for each of `others` that already
/// has one with `viewer`.
pub fn direct_conversation_ids(
    conn: &mut SqliteConnection,
    viewer: UserId,
    others: &[UserId],
) -> QueryResult<HashMap<UserId, i64>> {
    let by_key: HashMap<String, UserId> = others
        .iter()
        .map(|&other| (direct_key(viewer, other), other))
        .collect();
    let keys: Vec<&str> = by_key.keys().map(String::as_str).collect();

    let rows: Vec<(i64, Option<String>)> = conversations::table
        .filter(conversations::direct_key.eq_any(keys))
        .select((conversations::id, conversations::direct_key))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, key)| key.and_then(|k| by_key.get(&k)).map(|&other| (other, id)))
        .collect())
}

/// Group conversations `viewer` belongs to, with the viewer's participant row.
pub fn groups_for(conn: &mut SqliteConnection, viewer: UserId) -> QueryResult<Vec<(Conversation, Participant)>> {
    conversations::table
        .inner_join(conversation_participants::table)
        .filter(conversation_participants::user_id.eq(viewer))
        .filter(conversations::is_group.eq(true))
        .select((Conversation::as_select(), Participant::as_select()))
        .load(conn)
}

/// The viewer's participant rows keyed by conversation id.
pub fn memberships(conn: &mut SqliteConnection, viewer: UserId) -> QueryResult<HashMap<i64, Participant>> {
    let rows: Vec<Participant> = conversation_participants::table
        .filter(conversation_participants::user_id.eq(viewer))
        .select(Participant::as_select())
        .load(conn)?;
    Ok(rows.into_iter().map(|p| (p.conversation_id, p)).collect())
}
