pub mod sql;
pub mod transitions;

pub use transitions::{InvalidTransition, StatusMachine};
