//! Local mirror of the identity service's user directory.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crmchat_shared::types::auth::AuthUser;
use crmchat_shared::UserId;

use crate::models::{NewUser, User};
use crate::schema::users;

/// Inserts or refreshes a user record. A missing email keeps the stored one.
pub fn upsert_user(conn: &mut SqliteConnection, user: &NewUser<'_>) -> QueryResult<()> {
    let insert = diesel::insert_into(users::table)
        .values(user)
        .on_conflict(users::id)
        .do_update();
    match user.email {
        Some(email) => insert.set((users::name.eq(user.name), users::email.eq(email))).execute(conn)?,
        None => insert.set(users::name.eq(user.name)).execute(conn)?,
    };
    Ok(())
}

/// Mirrors the authenticated caller so their own id satisfies the foreign
/// keys of anything they create.
pub fn sync_caller(conn: &mut SqliteConnection, caller: &AuthUser) -> QueryResult<()> {
    upsert_user(conn, &NewUser { id: caller.id, name: &caller.name, email: None })
}

/// Every user except `viewer`, alphabetically.
pub fn list_others(conn: &mut SqliteConnection, viewer: UserId) -> QueryResult<Vec<User>> {
    users::table
        .filter(users::id.ne(viewer))
        .order((users::name.asc(), users::id.asc()))
        .select(User::as_select())
        .load(conn)
}

/// Returns how many of `ids` exist in the directory.
pub fn count_known(conn: &mut SqliteConnection, ids: &[UserId]) -> QueryResult<i64> {
    users::table
        .filter(users::id.eq_any(ids))
        .count()
        .get_result(conn)
}
