pub mod models;

pub use models::{Campaign, CampaignStatus};
