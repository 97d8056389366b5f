//! Session layer: lifecycle state machine, error recovery, persistence and
//! the orchestrating [`ScanSession`].

mod recovery;
mod scan;
mod state_machine;
mod store;

pub use recovery::{
    ErrorRecoveryCoordinator, Escalation, FrameObservation, RecoveryAction, RecoveryConfig,
    RecoveryContext, RecoveryOutcome,
};
pub use scan::{FrameOutcome, ScanSession, SessionConfig, SessionStats, SessionSummary};
pub use state_machine::{RecoveryPoint, ScanningStateMachine, StateMachineConfig};
pub use store::{InMemorySessionStore, SessionSnapshot, SessionStore};
