//! # Per-Certificate Sync State Machine
//!
//! ```text
//! Idle ──▶ InFlight ──▶ Committed ──▶ Idle
//!              │
//!              └──────▶ Failed ─────▶ Idle
//! ```
//!
//! Transitions are validated at runtime; anything not drawn above is
//! rejected. `Committed` and `Failed` record how the last sync ended and
//! return to `Idle` when the next one begins.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a certificate's sync currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No sync running and none finished since the last reset.
    #[default]
    Idle,
    /// A request is outstanding.
    InFlight,
    /// The last sync advanced the cursor.
    Committed,
    /// The last sync ended with an error; the cursor did not move.
    Failed,
}

impl SyncState {
    /// Whether a sync has finished in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }

    /// Whether `self -> to` is an allowed transition.
    pub fn can_transition_to(&self, to: SyncState) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::InFlight)
                | (Self::InFlight, Self::Committed)
                | (Self::InFlight, Self::Failed)
                | (Self::Committed, Self::Idle)
                | (Self::Failed, Self::Idle)
        )
    }

    /// Move to `to`, or report why that is not allowed.
    pub fn transition(self, to: SyncState) -> Result<SyncState, StateError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(StateError::InvalidTransition { from: self, to })
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::InFlight => write!(f, "IN_FLIGHT"),
            Self::Committed => write!(f, "COMMITTED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A rejected state transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid sync transition: {from} -> {to}")]
    InvalidTransition { from: SyncState, to: SyncState },
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SyncState; 4] = [
        SyncState::Idle,
        SyncState::InFlight,
        SyncState::Committed,
        SyncState::Failed,
    ];

    #[test]
    fn full_cycle_through_committed() {
        let s = SyncState::Idle
            .transition(SyncState::InFlight)
            .and_then(|s| s.transition(SyncState::Committed))
            .and_then(|s| s.transition(SyncState::Idle))
            .unwrap();
        assert_eq!(s, SyncState::Idle);
    }

    #[test]
    fn full_cycle_through_failed() {
        let s = SyncState::Idle
            .transition(SyncState::InFlight)
            .and_then(|s| s.transition(SyncState::Failed))
            .and_then(|s| s.transition(SyncState::Idle))
            .unwrap();
        assert_eq!(s, SyncState::Idle);
    }

    #[test]
    fn in_flight_cannot_restart() {
        let err = SyncState::InFlight.transition(SyncState::InFlight).unwrap_err();
        assert_eq!(
            err,
            StateError::InvalidTransition {
                from: SyncState::InFlight,
                to: SyncState::InFlight
            }
        );
    }

    #[test]
    fn only_five_transitions_are_allowed() {
        let allowed = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .count();
        assert_eq!(allowed, 5);
    }

    #[test]
    fn idle_cannot_commit_directly() {
        assert!(SyncState::Idle.transition(SyncState::Committed).is_err());
        assert!(SyncState::Committed.transition(SyncState::InFlight).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(SyncState::Committed.is_terminal());
        assert!(SyncState::Failed.is_terminal());
        assert!(!SyncState::Idle.is_terminal());
        assert!(!SyncState::InFlight.is_terminal());
    }

    #[test]
    fn display_is_screaming_snake() {
        assert_eq!(SyncState::InFlight.to_string(), "IN_FLIGHT");
    }
}
