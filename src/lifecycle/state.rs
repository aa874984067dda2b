//! Per-protocol server state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol server lifecycle state.
///
/// State transitions:
/// ```text
/// NOT_STARTED → LISTENING → DRAINING → STOPPED
///      ↓            ↓           ↓
/// FAILED_TO_START FAILED      FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    #[default]
    NotStarted,
    Listening,
    Draining,
    Stopped,
    FailedToStart,
    /// The serve loop ended with an error or without being asked to stop.
    Failed,
}

impl ServerState {
    /// Check if this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ServerState::Stopped | ServerState::FailedToStart | ServerState::Failed
        )
    }

    /// Whether new connections and requests are accepted.
    pub fn is_accepting(self) -> bool {
        self == ServerState::Listening
    }

    /// Check if transition is valid.
    pub fn can_transition_to(self, to: ServerState) -> bool {
        match (self, to) {
            // NOT_STARTED
            (ServerState::NotStarted, ServerState::Listening) => true,
            (ServerState::NotStarted, ServerState::FailedToStart) => true,
            // LISTENING
            (ServerState::Listening, ServerState::Draining) => true,
            (ServerState::Listening, ServerState::Failed) => true,
            // DRAINING
            (ServerState::Draining, ServerState::Stopped) => true,
            (ServerState::Draining, ServerState::Failed) => true,
            // Terminal states never move
            _ => false,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::NotStarted => "not_started",
            ServerState::Listening => "listening",
            ServerState::Draining => "draining",
            ServerState::Stopped => "stopped",
            ServerState::FailedToStart => "failed_to_start",
            ServerState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        assert!(ServerState::NotStarted.can_transition_to(ServerState::Listening));
        assert!(ServerState::Listening.can_transition_to(ServerState::Draining));
        assert!(ServerState::Draining.can_transition_to(ServerState::Stopped));
    }

    #[test]
    fn test_cannot_skip_draining() {
        assert!(!ServerState::Listening.can_transition_to(ServerState::Stopped));
        assert!(!ServerState::NotStarted.can_transition_to(ServerState::Draining));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [ServerState::Stopped, ServerState::FailedToStart, ServerState::Failed] {
            assert!(terminal.is_terminal());
            for to in [
                ServerState::NotStarted,
                ServerState::Listening,
                ServerState::Draining,
                ServerState::Stopped,
                ServerState::Failed,
            ] {
                assert!(!terminal.can_transition_to(to), "{} -> {}", terminal, to);
            }
        }
    }

    #[test]
    fn test_only_listening_accepts() {
        assert!(ServerState::Listening.is_accepting());
        assert!(!ServerState::Draining.is_accepting());
        assert!(!ServerState::NotStarted.is_accepting());
    }
}
