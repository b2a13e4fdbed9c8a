// Mirrors migrations/0001_chat_core.sql.

diesel::table! {
    users (id) {
        id -> BigInt,
        name -> Text,
        email -> Nullable<Text>,
    }
}

diesel::table! {
    user_presence (user_id) {
        user_id -> BigInt,
        last_seen -> Timestamp,
    }
}

diesel::table! {
    conversations (id) {
        id -> BigInt,
        is_group -> Bool,
        direct_key -> Nullable<Text>,
        name -> Nullable<Text>,
        created_by -> BigInt,
        created_at -> Timestamp,
    }
}

diesel::table! {
    conversation_participants (id) {
        id -> BigInt,
        conversation_id -> BigInt,
        user_id -> BigInt,
        last_read_message_id -> Nullable<BigInt>,
        typing_at -> Nullable<Timestamp>,
        joined_at -> Timestamp,
    }
}

diesel::table! {
    messages (id) {
        id -> BigInt,
        conversation_id -> BigInt,
        sender_id -> BigInt,
        body -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    message_reads (message_id, user_id) {
        message_id -> BigInt,
        user_id -> BigInt,
        read_at -> Timestamp,
    }
}

diesel::joinable!(conversation_participants -> conversations (conversation_id));
diesel::joinable!(conversation_participants -> users (user_id));
diesel::joinable!(messages -> conversations (conversation_id));
diesel::joinable!(messages -> users (sender_id));
diesel::joinable!(message_reads -> messages (message_id));
diesel::joinable!(message_reads -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    user_presence,
    conversations,
    conversation_participants,
    messages,
    message_reads,
);
