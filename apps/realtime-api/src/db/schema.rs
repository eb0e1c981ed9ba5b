// Tables owned by the community application. The gateway reads rooms,
// memberships and users, and inserts chat and direct messages.

diesel::table! {
    chat_rooms (id) {
        id -> Int8,
        community_id -> Int8,
        name -> Text,
        is_private -> Bool,
    }
}

diesel::table! {
    communities (id) {
        id -> Int8,
        name -> Text,
        owner_id -> Int8,
    }
}

diesel::table! {
    community_members (community_id, user_id) {
        community_id -> Int8,
        user_id -> Int8,
        role -> Text,
    }
}

diesel::table! {
    users (id) {
        id -> Int8,
        username -> Text,
        display_name -> Nullable<Text>,
        avatar_url -> Nullable<Text>,
    }
}

diesel::table! {
    chat_messages (id) {
        id -> Int8,
        room_id -> Int8,
        sender_id -> Int8,
        content -> Text,
        is_announcement -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    direct_messages (id) {
        id -> Int8,
        sender_id -> Int8,
        receiver_id -> Int8,
        content -> Text,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    chat_rooms,
    communities,
    community_members,
    users,
    chat_messages,
    direct_messages,
);
