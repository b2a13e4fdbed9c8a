use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Timestamp};
use diesel::sqlite::SqliteConnection;

use crmchat_shared::errors::AppResult;
use crmchat_shared::UserId;

use crate::schema::{conversation_participants, messages};
use crate::services::conversations::{memberships, require_participant};

/// Acknowledges every message up to `last_message_id` for `user_id`.
///
/// The cursor only moves forward, and receipts are back-filled for every
/// message at or below it, so repeated or reordered calls converge on the
/// same state. Ids past the newest message are clamped to it.
pub fn mark_read(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    user_id: UserId,
    last_message_id: i64,
    now: NaiveDateTime,
) -> AppResult<()> {
    require_participant(conn, conversation_id, user_id)?;

    let advanced = conn.immediate_transaction(|conn| {
        let target: Option<i64> = messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .filter(messages::id.le(last_message_id))
            .select(diesel::dsl::max(messages::id))
            .first(conn)?;
        let Some(target) = target else {
            return Ok(None);
        };

        let moved = diesel::update(
            conversation_participants::table
                .filter(conversation_participants::conversation_id.eq(conversation_id))
                .filter(conversation_participants::user_id.eq(user_id))
                .filter(
                    conversation_participants::last_read_message_id
                        .is_null()
                        .or(conversation_participants::last_read_message_id.lt(target)),
                ),
        )
        .set(conversation_participants::last_read_message_id.eq(target))
        .execute(conn)?;

        let receipts = diesel::sql_query(
            "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) \
             SELECT id, ?, ? FROM messages WHERE conversation_id = ? AND id <= ?",
        )
        .bind::<BigInt, _>(user_id)
        .bind::<Timestamp, _>(now)
        .bind::<BigInt, _>(conversation_id)
        .bind::<BigInt, _>(target)
        .execute(conn)?;

        Ok::<_, diesel::result::Error>(Some((target, moved > 0, receipts)))
    })?;

    if let Some((cursor, true, receipts)) = advanced {
        tracing::debug!(conversation_id, user_id, cursor, receipts, "read cursor advanced");
    }
    Ok(())
}

/// Messages from other participants past `cursor` (all of them if unset).
pub fn unread_count(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    user_id: UserId,
    cursor: Option<i64>,
) -> QueryResult<i64> {
    messages::table
        .filter(messages::conversation_id.eq(conversation_id))
        .filter(messages::sender_id.ne(user_id))
        .filter(messages::id.gt(cursor.unwrap_or(0)))
        .count()
        .get_result(conn)
}

/// Unread messages summed over every conversation `user_id` belongs to.
pub fn total_unread(conn: &mut SqliteConnection, user_id: UserId) -> QueryResult<i64> {
    let mut total = 0;
    for (conversation_id, participant) in memberships(conn, user_id)? {
        total += unread_count(conn, conversation_id, user_id, participant.last_read_message_id)?;
    }
    Ok(total)
}
