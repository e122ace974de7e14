//! Shared status transition validation.
//!
//! Both job and message statuses are guarded by the same mechanism: each
//! status enum declares its legal next states, and every status-mutating
//! entry point calls [`StatusMachine::ensure_transition`] before writing.
//! Terminal states declare no next states and therefore reject everything,
//! including transitions back into themselves.

use std::fmt::Display;

use thiserror::Error;

/// An attempted status write that is not in the transition table.
///
/// Callers must treat this as a hard failure: the row is left unchanged and
/// the write is never clamped to a "close enough" status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {entity} status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub entity: &'static str,
    pub from: String,
    pub to: String,
}

/// Transition table for a status enum.
pub trait StatusMachine: Sized + Copy + PartialEq + Display + 'static {
    /// Entity name used in error messages ("job", "message").
    const ENTITY: &'static str;

    /// Legal next states for this status. Empty for terminal states.
    fn transitions(self) -> &'static [Self];

    /// Whether `self -> to` appears in the transition table.
    fn can_transition(self, to: Self) -> bool {
        self.transitions().contains(&to)
    }

    /// Whether this status accepts no further transitions.
    fn is_terminal(self) -> bool {
        self.transitions().is_empty()
    }

    /// Validate `self -> to`, returning a descriptive error on violation.
    fn ensure_transition(self, to: Self) -> Result<(), InvalidTransition> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(InvalidTransition {
                entity: Self::ENTITY,
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Green,
        Yellow,
        Red,
        Broken,
    }

    impl Display for Light {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let s = match self {
                Light::Green => "green",
                Light::Yellow => "yellow",
                Light::Red => "red",
                Light::Broken => "broken",
            };
            write!(f, "{}", s)
        }
    }

    impl StatusMachine for Light {
        const ENTITY: &'static str = "light";

        fn transitions(self) -> &'static [Self] {
            match self {
                Light::Green => &[Light::Yellow],
                Light::Yellow => &[Light::Red],
                Light::Red => &[Light::Green],
                Light::Broken => &[],
            }
        }
    }

    #[test]
    fn legal_transition_passes() {
        assert!(Light::Green.ensure_transition(Light::Yellow).is_ok());
    }

    #[test]
    fn illegal_transition_names_the_pair() {
        let err = Light::Green.ensure_transition(Light::Red).unwrap_err();
        assert_eq!(err.entity, "light");
        assert_eq!(err.from, "green");
        assert_eq!(err.to, "red");
    }

    #[test]
    fn terminal_state_rejects_everything() {
        assert!(Light::Broken.is_terminal());
        assert!(Light::Broken.ensure_transition(Light::Green).is_err());
        assert!(Light::Broken.ensure_transition(Light::Broken).is_err());
    }
}
