pub mod conversations;
pub mod forms;
pub mod health;
pub mod internal;
pub mod messages;
pub mod sidebar;
pub mod sync;
