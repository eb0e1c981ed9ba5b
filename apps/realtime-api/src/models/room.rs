use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::chat_rooms;

/// A chat room belonging to a community.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, PartialEq, Eq)]
#[diesel(table_name = chat_rooms)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: i64,
    pub community_id: i64,
    pub name: String,
    pub is_private: bool,
}
