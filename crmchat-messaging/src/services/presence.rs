use std::collections::HashMap;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crmchat_shared::UserId;

use crate::models::PresenceUpsert;
use crate::schema::user_presence;
use crate::services::{within_window, ChatSettings};

/// Heartbeat: upserts `last_seen = now` for the user.
pub fn record_presence(conn: &mut SqliteConnection, user_id: UserId, now: NaiveDateTime) -> QueryResult<()> {
    diesel::insert_into(user_presence::table)
        .values(&PresenceUpsert { user_id, last_seen: now })
        .on_conflict(user_presence::user_id)
        .do_update()
        .set(user_presence::last_seen.eq(now))
        .execute(conn)?;
    Ok(())
}

pub fn last_seen(conn: &mut SqliteConnection, user_ids: &[UserId]) -> QueryResult<HashMap<UserId, NaiveDateTime>> {
    let rows: Vec<(UserId, NaiveDateTime)> = user_presence::table
        .filter(user_presence::user_id.eq_any(user_ids))
        .select((user_presence::user_id, user_presence::last_seen))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

pub fn is_online(last_seen: Option<NaiveDateTime>, now: NaiveDateTime, settings: &ChatSettings) -> bool {
    last_seen.is_some_and(|seen| within_window(seen, now, settings.online_window))
}
