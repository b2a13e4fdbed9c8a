//! Chat core. Every function takes an explicit connection and `now` so the
//! time-decay rules are deterministic and callers control transactions.

pub mod conversations;
pub mod directory;
pub mod messages;
pub mod presence;
pub mod read_cursor;
pub mod sidebar;
pub mod sync;
pub mod typing;

use std::time::Duration;

use chrono::{NaiveDateTime, Utc};

/// Tunables for the polling protocol. Clients are tuned to the defaults.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// A typing flag older than this is treated as cleared.
    pub typing_window: Duration,
    /// A user is online if their last heartbeat is younger than this.
    pub online_window: Duration,
    /// Polls report receipts for messages down to `after_id - receipt_lookback`.
    pub receipt_lookback: i64,
    pub max_message_len: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            typing_window: Duration::from_secs(5),
            online_window: Duration::from_secs(90),
            receipt_lookback: 50,
            max_message_len: 5_000,
        }
    }
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// True if `ts` happened less than `window` before `now`.
pub(crate) fn within_window(ts: NaiveDateTime, now: NaiveDateTime, window: Duration) -> bool {
    let window = chrono::Duration::milliseconds(window.as_millis() as i64);
    now.signed_duration_since(ts) < window
}
