pub mod community_member;
pub mod message;
pub mod numeric_id;
pub mod room;
pub mod user;

pub use numeric_id::NumericId;
