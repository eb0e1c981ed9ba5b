use diesel::prelude::*;

use crate::db::schema::community_members;

pub const ROLE_MEMBER: &str = "member";
pub const ROLE_MODERATOR: &str = "moderator";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = community_members)]
pub struct CommunityMember {
    pub community_id: i64,
    pub user_id: i64,
    pub role: String,
}

/// Roles allowed to post announcements (owners always are).
pub fn is_moderator_role(role: &str) -> bool {
    role == ROLE_MODERATOR || role == ROLE_ADMIN
}
