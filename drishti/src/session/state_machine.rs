//! Scanning session lifecycle.
//!
//! # State Machine
//!
//! ```text
//!  ┌──────┐   ┌──────────────┐   ┌──────────┐   stop   ┌────────────┐   ┌──────────┐
//!  │ Idle │──▶│ Initializing │──▶│ Scanning │────────▶ │ Processing │──▶│ Complete │
//!  └──────┘   └──────┬───────┘   └─┬──▲──┬──┘          └─────┬──────┘   └──────────┘
//!     ▲              │     pause   │  │  │ failure           │
//!     │              │   ┌─────────▼┐ │ ┌▼────────────────┐  │
//!     │              │   │ Paused(r)│─┘ │ Recovering(n)   │◀─┘ (n+1)
//!     │              │   └──────────┘   └───────┬─────────┘
//!     │              ▼                          │ n > max attempts
//!     │         ┌──────────┐                    │
//!     └─────────│ Error(k) │◀───────────────────┘
//!               └──────────┘
//! ```
//!
//! Recovery points are snapshots of a known-good session (scanning with
//! acceptable metrics) that a recovered session resumes from, as long as
//! they are fresh.
//!
//! # Example
//!
//! ```ignore
//! let mut sm = ScanningStateMachine::new(StateMachineConfig::default());
//! sm.transition(ScanningState::Initializing, 0)?;
//! sm.transition(ScanningState::Scanning, 10_000)?;
//!
//! // On a recoverable failure
//! match sm.begin_recovery(now_us)? {
//!     ScanningState::Recovering { attempt } => { /* try fallback */ }
//!     _ => { /* attempts exhausted, session is in Error */ }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::adaptive::QualitySettings;
use crate::core::clock::{TimestampUs, ms_to_us};
use crate::core::ring_buffer::RingBuffer;
use crate::core::types::{QualityMetrics, ScanningMode, ScanningState, StateTransition};
use crate::error::{ErrorKind, Result, ScanError};
use crate::events::{Publisher, ScanEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateMachineConfig {
    /// Transitions retained for diagnostics.
    /// Default: 30
    pub history_capacity: usize,

    /// Default: 5
    pub recovery_point_capacity: usize,

    /// Age beyond which a recovery point is not reused.
    /// Default: 30000
    pub recovery_point_freshness_ms: u64,

    /// Minimum spacing between captured recovery points.
    /// Default: 2000
    pub recovery_point_interval_ms: u64,

    /// Recovery attempts before the session errors out.
    /// Default: 3
    pub max_recovery_attempts: u32,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            history_capacity: 30,
            recovery_point_capacity: 5,
            recovery_point_freshness_ms: 30_000,
            recovery_point_interval_ms: 2_000,
            max_recovery_attempts: 3,
        }
    }
}

/// Known-good session snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPoint {
    pub timestamp_us: TimestampUs,
    pub state: ScanningState,
    pub mode: ScanningMode,
    pub settings: QualitySettings,
    pub metrics: QualityMetrics,
}

/// Sole owner of the session's [`ScanningState`].
#[derive(Debug)]
pub struct ScanningStateMachine {
    config: StateMachineConfig,
    state: ScanningState,
    state_since_us: TimestampUs,
    recovery_attempts: u32,
    history: RingBuffer<StateTransition>,
    recovery_points: RingBuffer<RecoveryPoint>,
    last_recovery_point_us: Option<TimestampUs>,
    publisher: Publisher<ScanEvent>,
}

impl ScanningStateMachine {
    pub fn new(config: StateMachineConfig) -> Self {
        let history = RingBuffer::new(config.history_capacity);
        let recovery_points = RingBuffer::new(config.recovery_point_capacity);
        Self {
            config,
            state: ScanningState::Idle,
            state_since_us: 0,
            recovery_attempts: 0,
            history,
            recovery_points,
            last_recovery_point_us: None,
            publisher: Publisher::new(),
        }
    }

    pub fn state(&self) -> ScanningState {
        self.state
    }

    pub fn config(&self) -> &StateMachineConfig {
        &self.config
    }

    pub fn publisher(&self) -> &Publisher<ScanEvent> {
        &self.publisher
    }

    pub fn recovery_attempts(&self) -> u32 {
        self.recovery_attempts
    }

    /// Time spent in the current state.
    pub fn time_in_state_us(&self, now_us: TimestampUs) -> u64 {
        now_us.saturating_sub(self.state_since_us)
    }

    /// Move to `to`, rejecting edges outside the lifecycle table.
    pub fn transition(
        &mut self,
        to: ScanningState,
        now_us: TimestampUs,
    ) -> Result<StateTransition> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(ScanError::InvalidTransition { from, to });
        }
        let transition = StateTransition {
            from,
            to,
            timestamp_us: now_us,
        };
        match to {
            ScanningState::Error(_) => log::error!("Session: {} -> {}", from, to),
            _ => log::info!("Session: {} -> {}", from, to),
        }

        self.state = to;
        self.state_since_us = now_us;
        self.history.push(transition);
        self.publisher.publish(ScanEvent::StateChanged(transition));
        Ok(transition)
    }

    /// Enter (or advance) recovery. Exceeding the attempt cap moves the
    /// session to `Error(UnrecoverableError)` instead.
    ///
    /// Returns the state entered.
    pub fn begin_recovery(&mut self, now_us: TimestampUs) -> Result<ScanningState> {
        let attempt = self.recovery_attempts + 1;
        if attempt > self.config.max_recovery_attempts {
            log::warn!(
                "Session: recovery attempt {} exceeds cap {}",
                attempt,
                self.config.max_recovery_attempts
            );
            let to = ScanningState::Error(ErrorKind::UnrecoverableError);
            self.transition(to, now_us)?;
            return Ok(to);
        }
        let to = ScanningState::Recovering { attempt };
        self.transition(to, now_us)?;
        self.recovery_attempts = attempt;
        Ok(to)
    }

    pub fn reset_recovery_attempts(&mut self) {
        self.recovery_attempts = 0;
    }

    /// Enter `Error(kind)` from any non-terminal state.
    pub fn fail(&mut self, kind: ErrorKind, now_us: TimestampUs) -> Result<StateTransition> {
        self.transition(ScanningState::Error(kind), now_us)
    }

    /// Return a finished session to idle, dropping per-session state.
    pub fn reset(&mut self, now_us: TimestampUs) -> Result<StateTransition> {
        let transition = self.transition(ScanningState::Idle, now_us)?;
        self.recovery_attempts = 0;
        self.recovery_points.clear();
        self.last_recovery_point_us = None;
        Ok(transition)
    }

    /// Capture a recovery point if scanning with acceptable metrics and the
    /// capture interval has passed.
    pub fn capture_recovery_point(
        &mut self,
        mode: ScanningMode,
        settings: QualitySettings,
        metrics: QualityMetrics,
        acceptable: bool,
        now_us: TimestampUs,
    ) -> Option<RecoveryPoint> {
        if self.state != ScanningState::Scanning || !acceptable {
            return None;
        }
        if let Some(last) = self.last_recovery_point_us
            && now_us.saturating_sub(last) < ms_to_us(self.config.recovery_point_interval_ms)
        {
            return None;
        }
        let point = RecoveryPoint {
            timestamp_us: now_us,
            state: self.state,
            mode,
            settings,
            metrics,
        };
        log::debug!("Session: recovery point at {}us ({})", now_us, mode);
        self.recovery_points.push(point);
        self.last_recovery_point_us = Some(now_us);
        Some(point)
    }

    /// Newest recovery point still inside the freshness window.
    pub fn fresh_recovery_point(&self, now_us: TimestampUs) -> Option<RecoveryPoint> {
        let freshness = ms_to_us(self.config.recovery_point_freshness_ms);
        self.recovery_points
            .latest()
            .filter(|p| now_us.saturating_sub(p.timestamp_us) <= freshness)
            .copied()
    }

    pub fn recovery_points(&self) -> Vec<RecoveryPoint> {
        self.recovery_points.to_vec()
    }

    pub fn history(&self) -> Vec<StateTransition> {
        self.history.to_vec()
    }

    /// Time spent in each retained state, oldest first. The current state is
    /// open-ended and not included.
    pub fn transition_durations(&self) -> Vec<(ScanningState, u64)> {
        self.history
            .iter()
            .zip(self.history.iter().skip(1))
            .map(|(entered, left)| {
                (
                    entered.to,
                    left.timestamp_us.saturating_sub(entered.timestamp_us),
                )
            })
            .collect()
    }
}
