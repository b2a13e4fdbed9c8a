use std::collections::HashMap;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};

use crmchat_shared::errors::{AppError, AppResult};
use crmchat_shared::UserId;

use crate::models::{Message, NewMessage, ReadReceipt};
use crate::schema::{conversation_participants, message_reads, messages, users};
use crate::services::conversations::require_participant;
use crate::services::ChatSettings;

/// One reader of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadBy {
    pub user_id: UserId,
    pub name: String,
    pub read_at: NaiveDateTime,
}

/// A read receipt as reported by a poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptView {
    pub message_id: i64,
    pub user_id: UserId,
    pub name: String,
    pub read_at: NaiveDateTime,
}

/// A message as rendered for one viewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageView {
    pub id: i64,
    pub sender_id: UserId,
    pub sender: String,
    pub body: String,
    pub created_at: NaiveDateTime,
    pub is_mine: bool,
    pub read_by: Vec<ReadBy>,
}

impl MessageView {
    fn new(message: Message, sender: String, viewer: UserId, read_by: Vec<ReadBy>) -> Self {
        Self {
            id: message.id,
            is_mine: message.sender_id == viewer,
            sender_id: message.sender_id,
            sender,
            body: message.body,
            created_at: message.created_at,
            read_by,
        }
    }
}

/// Appends a message. The message row, the sender's own receipt, the sender's
/// cursor advance and the typing reset commit together or not at all.
pub fn send_message(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    sender_id: UserId,
    body: &str,
    now: NaiveDateTime,
    settings: &ChatSettings,
) -> AppResult<MessageView> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::invalid_input("Message cannot be empty."));
    }
    if body.chars().count() > settings.max_message_len {
        return Err(AppError::invalid_input(format!(
            "Message cannot exceed {} characters.",
            settings.max_message_len
        )));
    }

    require_participant(conn, conversation_id, sender_id)?;

    let message = conn.immediate_transaction(|conn| {
        let message: Message = diesel::insert_into(messages::table)
            .values(&NewMessage {
                conversation_id,
                sender_id,
                body,
                created_at: now,
            })
            .returning(Message::as_returning())
            .get_result(conn)?;

        diesel::insert_into(message_reads::table)
            .values(&ReadReceipt {
                message_id: message.id,
                user_id: sender_id,
                read_at: now,
            })
            .on_conflict_do_nothing()
            .execute(conn)?;

        diesel::update(
            conversation_participants::table
                .filter(conversation_participants::conversation_id.eq(conversation_id))
                .filter(conversation_participants::user_id.eq(sender_id)),
        )
        .set(conversation_participants::typing_at.eq(None::<NaiveDateTime>))
        .execute(conn)?;

        // the cursor only moves forward
        diesel::update(
            conversation_participants::table
                .filter(conversation_participants::conversation_id.eq(conversation_id))
                .filter(conversation_participants::user_id.eq(sender_id))
                .filter(
                    conversation_participants::last_read_message_id
                        .is_null()
                        .or(conversation_participants::last_read_message_id.lt(message.id)),
                ),
        )
        .set(conversation_participants::last_read_message_id.eq(message.id))
        .execute(conn)?;

        Ok::<_, diesel::result::Error>(message)
    })?;

    metrics::counter!("chat_messages_sent_total").increment(1);
    tracing::info!(
        message_id = message.id,
        conversation_id,
        sender_id,
        "message sent"
    );

    let sender: String = users::table
        .find(sender_id)
        .select(users::name)
        .first(conn)?;
    let read_by = vec![ReadBy {
        user_id: sender_id,
        name: sender.clone(),
        read_at: now,
    }];

    Ok(MessageView::new(message, sender, sender_id, read_by))
}

/// Messages with `id > after_id` in ascending id order, with their readers.
pub fn messages_after(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    after_id: i64,
    viewer: UserId,
) -> QueryResult<Vec<MessageView>> {
    let rows: Vec<(Message, String)> = messages::table
        .inner_join(users::table)
        .filter(messages::conversation_id.eq(conversation_id))
        .filter(messages::id.gt(after_id))
        .order(messages::id.asc())
        .select((Message::as_select(), users::name))
        .load(conn)?;

    let mut readers: HashMap<i64, Vec<ReadBy>> = HashMap::new();
    for receipt in receipts_from(conn, conversation_id, after_id.saturating_add(1))? {
        readers.entry(receipt.message_id).or_default().push(ReadBy {
            user_id: receipt.user_id,
            name: receipt.name,
            read_at: receipt.read_at,
        });
    }

    Ok(rows
        .into_iter()
        .map(|(message, sender)| {
            let read_by = readers.remove(&message.id).unwrap_or_default();
            MessageView::new(message, sender, viewer, read_by)
        })
        .collect())
}

/// Receipts on messages of the conversation with `id >= from_id`.
pub fn receipts_from(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    from_id: i64,
) -> QueryResult<Vec<ReceiptView>> {
    let rows: Vec<(i64, UserId, String, NaiveDateTime)> = message_reads::table
        .inner_join(messages::table)
        .inner_join(users::table.on(users::id.eq(message_reads::user_id)))
        .filter(messages::conversation_id.eq(conversation_id))
        .filter(message_reads::message_id.ge(from_id))
        .order((message_reads::message_id.asc(), message_reads::read_at.asc(), message_reads::user_id.asc()))
        .select((message_reads::message_id, message_reads::user_id, users::name, message_reads::read_at))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(message_id, user_id, name, read_at)| ReceiptView {
            message_id,
            user_id,
            name,
            read_at,
        })
        .collect())
}

/// Highest message id in the conversation, if any.
pub fn latest_message_id(conn: &mut SqliteConnection, conversation_id: i64) -> QueryResult<Option<i64>> {
    messages::table
        .filter(messages::conversation_id.eq(conversation_id))
        .select(diesel::dsl::max(messages::id))
        .first(conn)
}

/// The message with the highest id, with its sender's name.
pub fn latest_message(
    conn: &mut SqliteConnection,
    conversation_id: i64,
) -> QueryResult<Option<(Message, String)>> {
    messages::table
        .inner_join(users::table)
        .filter(messages::conversation_id.eq(conversation_id))
        .order(messages::id.desc())
        .select((Message::as_select(), users::name))
        .first(conn)
        .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversations::ensure_conversation;
    use crate::services::test_support::{at, TestDb};
    use crate::models::Participant;

    fn direct(conn: &mut SqliteConnection) -> i64 {
        ensure_conversation(conn, &[2], 1, None, at(0)).unwrap().conversation.id
    }

    #[test]
    fn send_records_sender_receipt_and_cursor() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let conv = direct(&mut conn);

        let sent = send_message(&mut conn, conv, 1, "  Hello  ", at(5), &ChatSettings::default()).unwrap();
        assert_eq!(sent.body, "Hello");
        assert!(sent.is_mine);
        assert_eq!(sent.sender, "Ana");
        assert_eq!(sent.read_by.iter().map(|r| r.user_id).collect::<Vec<_>>(), vec![1]);

        let row: Participant = conversation_participants::table
            .filter(conversation_participants::conversation_id.eq(conv))
            .filter(conversation_participants::user_id.eq(1))
            .select(Participant::as_select())
            .first(&mut conn)
            .unwrap();
        assert_eq!(row.last_read_message_id, Some(sent.id));
        assert!(row.typing_at.is_none());

        let seen = messages_after(&mut conn, conv, 0, 1).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].read_by.len(), 1);
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let conv = direct(&mut conn);
        let settings = ChatSettings::default();

        let ids: Vec<i64> = (0..5)
            .map(|i| send_message(&mut conn, conv, 1 + (i % 2), "tick", at(1), &settings).unwrap().id)
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let listed: Vec<i64> = messages_after(&mut conn, conv, ids[1], 2).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(listed, ids[2..].to_vec());
        assert_eq!(latest_message_id(&mut conn, conv).unwrap(), ids.last().copied());
    }

    #[test]
    fn rejects_blank_and_oversized_bodies() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let conv = direct(&mut conn);
        let settings = ChatSettings { max_message_len: 4, ..ChatSettings::default() };

        assert!(matches!(
            send_message(&mut conn, conv, 1, " \n ", at(1), &settings),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            send_message(&mut conn, conv, 1, "hello", at(1), &settings),
            Err(AppError::Validation(_))
        ));
        assert_eq!(latest_message_id(&mut conn, conv).unwrap(), None);
    }

    #[test]
    fn outsiders_cannot_send() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let conv = direct(&mut conn);

        let err = send_message(&mut conn, conv, 3, "hi", at(1), &ChatSettings::default()).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
        assert_eq!(latest_message_id(&mut conn, conv).unwrap(), None);
    }

    #[test]
    fn latest_message_carries_sender_name() {
        let db = TestDb::new();
        let mut conn = db.conn();
        let conv = direct(&mut conn);
        let settings = ChatSettings::default();
        send_message(&mut conn, conv, 1, "first", at(1), &settings).unwrap();
        send_message(&mut conn, conv, 2, "second", at(1), &settings).unwrap();

        let (message, sender) = latest_message(&mut conn, conv).unwrap().unwrap();
        assert_eq!(message.body, "second");
        assert_eq!(sender, "Ben");
    }
}
