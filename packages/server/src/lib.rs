// Lead Autopilot - API Core
//
// This crate provides the engine that turns campaign and lead mutations into
// background jobs: trigger rules, the durable job queue, and the polling
// worker that claims and executes jobs against external providers.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
