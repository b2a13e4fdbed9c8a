use diesel::connection::SimpleConnection;
use diesel::sqlite::SqliteConnection;
use diesel::QueryResult;

const CHAT_CORE: &str = include_str!("../migrations/0001_chat_core.sql");

/// Applies the embedded schema. Every statement is `IF NOT EXISTS`, so this
/// runs on every startup.
pub fn run_migrations(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(CHAT_CORE)?;
    tracing::info!("chat schema up to date");
    Ok(())
}
