use std::time::Duration;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};

use crmchat_shared::errors::AppResult;
use crmchat_shared::UserId;

use crate::schema::{conversation_participants, users};
use crate::services::conversations::require_participant;
use crate::services::within_window;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Typist {
    pub user_id: UserId,
    pub name: String,
}

/// Sets or clears the caller's typing flag. A set flag expires on its own
/// once it is older than the typing window.
pub fn set_typing(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    user_id: UserId,
    is_typing: bool,
    now: NaiveDateTime,
) -> AppResult<()> {
    require_participant(conn, conversation_id, user_id)?;

    diesel::update(
        conversation_participants::table
            .filter(conversation_participants::conversation_id.eq(conversation_id))
            .filter(conversation_participants::user_id.eq(user_id)),
    )
    .set(conversation_participants::typing_at.eq(is_typing.then_some(now)))
    .execute(conn)?;
    Ok(())
}

/// Participants other than `exclude` whose flag is younger than `window`.
pub fn active_typists(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    exclude: UserId,
    now: NaiveDateTime,
    window: Duration,
) -> QueryResult<Vec<Typist>> {
    let rows: Vec<(UserId, String, Option<NaiveDateTime>)> = conversation_participants::table
        .inner_join(users::table)
        .filter(conversation_participants::conversation_id.eq(conversation_id))
        .filter(conversation_participants::user_id.ne(exclude))
        .filter(conversation_participants::typing_at.is_not_null())
        .order(users::id.asc())
        .select((users::id, users::name, conversation_participants::typing_at))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .filter(|(_, _, at)| at.is_some_and(|at| within_window(at, now, window)))
        .map(|(user_id, name, _)| Typist { user_id, name })
        .collect())
}
