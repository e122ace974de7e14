pub mod handlers;
pub mod models;

pub use models::{is_placeholder_email, Lead, LeadStatus};
