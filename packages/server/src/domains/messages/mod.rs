pub mod handlers;
pub mod models;
pub mod scheduling;

pub use models::{Message, MessageChannel, MessageStatus};
pub use scheduling::next_send_slots;
