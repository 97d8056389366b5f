//! Session lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::clock::TimestampUs;
use crate::error::ErrorKind;

/// Why scanning was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    LowQuality,
    ExcessiveMotion,
    ResourceConstraint,
    UserRequested,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PauseReason::LowQuality => "low quality",
            PauseReason::ExcessiveMotion => "excessive motion",
            PauseReason::ResourceConstraint => "resource constraint",
            PauseReason::UserRequested => "user request",
        };
        f.write_str(s)
    }
}

/// Exactly one of these is active per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanningState {
    #[default]
    Idle,
    Initializing,
    Scanning,
    Processing,
    Paused(PauseReason),
    Recovering { attempt: u32 },
    Error(ErrorKind),
    Complete,
}

impl ScanningState {
    /// States in which frames are consumed.
    #[inline]
    pub fn accepts_frames(self) -> bool {
        matches!(self, ScanningState::Scanning | ScanningState::Paused(_))
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanningState::Complete | ScanningState::Error(_))
    }

    /// Whether `self -> to` is a legal lifecycle edge.
    pub fn can_transition_to(self, to: ScanningState) -> bool {
        use ScanningState::*;
        match (self, to) {
            (Idle, Initializing) => true,
            (Initializing, Scanning | Error(_)) => true,
            (Scanning, Processing | Paused(_) | Recovering { .. } | Error(_)) => true,
            (Paused(_), Scanning | Processing | Recovering { .. } | Error(_)) => true,
            (Recovering { .. }, Scanning | Recovering { .. } | Processing | Error(_)) => true,
            (Processing, Complete | Error(_)) => true,
            (Complete | Error(_), Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ScanningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanningState::Idle => write!(f, "idle"),
            ScanningState::Initializing => write!(f, "initializing"),
            ScanningState::Scanning => write!(f, "scanning"),
            ScanningState::Processing => write!(f, "processing"),
            ScanningState::Paused(reason) => write!(f, "paused({reason})"),
            ScanningState::Recovering { attempt } => write!(f, "recovering({attempt})"),
            ScanningState::Error(kind) => write!(f, "error({kind})"),
            ScanningState::Complete => write!(f, "complete"),
        }
    }
}

/// One entry of the transition history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ScanningState,
    pub to: ScanningState,
    pub timestamp_us: TimestampUs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_edges() {
        use ScanningState::*;
        assert!(Idle.can_transition_to(Initializing));
        assert!(Scanning.can_transition_to(Paused(PauseReason::ExcessiveMotion)));
        assert!(Recovering { attempt: 1 }.can_transition_to(Recovering { attempt: 2 }));
        assert!(Processing.can_transition_to(Complete));
        assert!(!Idle.can_transition_to(Scanning));
        assert!(!Complete.can_transition_to(Scanning));
        assert!(!Processing.can_transition_to(Scanning));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ScanningState::Error(ErrorKind::UnrecoverableError).to_string(),
            "error(unrecoverable_error)"
        );
        assert_eq!(
            ScanningState::Recovering { attempt: 2 }.to_string(),
            "recovering(2)"
        );
    }
}
