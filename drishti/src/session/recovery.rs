//! Failure classification and bounded recovery.
//!
//! | Kind                    | Policy                                   |
//! |-------------------------|------------------------------------------|
//! | signal unavailable      | skip                                     |
//! | processing in progress  | skip, caller retries next tick           |
//! | invalid frame data      | skip, counts toward the low-quality streak |
//! | quality below threshold | mode fallback                            |
//! | insufficient lighting   | relax the lighting threshold             |
//! | anything else           | escalate                                 |
//!
//! Every recovery goes through `ScanningStateMachine::begin_recovery`, so
//! the session-wide attempt cap bounds fallbacks and relaxations alike.

use serde::{Deserialize, Serialize};

use super::state_machine::ScanningStateMachine;
use crate::adaptive::{AdaptationEvent, AdaptiveQualityController, SettingField};
use crate::arbitration::{ModeArbitrator, ModeDecision};
use crate::core::clock::TimestampUs;
use crate::core::types::{QualityMetrics, ScanningState};
use crate::error::{ErrorKind, ScanError, Severity};
use crate::events::{Publisher, ScanEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Consecutive unacceptable or invalid frames that raise a quality failure.
    /// Default: 15
    pub low_quality_streak_limit: u32,

    /// Consecutive acceptable frames that earn back the fallback budget.
    /// Default: 30
    pub sustained_quality_frames: u32,

    /// Lighting below which a quality failure is classified as darkness.
    /// Default: 0.25
    pub insufficient_lighting_floor: f32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            low_quality_streak_limit: 15,
            sustained_quality_frames: 30,
            insufficient_lighting_floor: 0.25,
        }
    }
}

/// What a successful recovery did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryAction {
    ModeFallback(ModeDecision),
    SettingsRelaxed(AdaptationEvent),
}

/// A failure surfaced to the caller after recovery was exhausted or
/// impossible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    /// Kind the session's error state carries.
    pub kind: ErrorKind,
    /// Failure that started the escalation.
    pub cause: ErrorKind,
    pub message: String,
    pub attempts: u32,
    /// Recovery attempted before giving up, if any.
    pub attempted: Option<String>,
    pub metrics: Option<QualityMetrics>,
    pub timestamp_us: TimestampUs,
}

impl Escalation {
    pub fn severity(&self) -> Severity {
        self.kind.severity().max(self.cause.severity())
    }

    /// User-facing classification of the original failure.
    pub fn description(&self) -> &'static str {
        self.cause.description()
    }

    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        self.cause
            .recovery_suggestion()
            .or(self.kind.recovery_suggestion())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// Absorbed; nothing changed.
    Skipped,
    Recovered(RecoveryAction),
    Escalate(Escalation),
}

/// Per-frame verdict of the streak tracker.
#[derive(Debug, Default)]
pub struct FrameObservation {
    /// Failure raised by this frame, if the streak limit was reached.
    pub failure: Option<ScanError>,
    /// Set once per run of `sustained_quality_frames` acceptable frames.
    pub sustained: bool,
}

/// Components a recovery may act on.
pub struct RecoveryContext<'a> {
    pub state: &'a mut ScanningStateMachine,
    pub arbitrator: &'a mut ModeArbitrator,
    pub controller: &'a mut AdaptiveQualityController,
    pub metrics: Option<QualityMetrics>,
    pub now_us: TimestampUs,
}

#[derive(Debug)]
pub struct ErrorRecoveryCoordinator {
    config: RecoveryConfig,
    low_quality_streak: u32,
    good_streak: u32,
    recoveries: u32,
    escalations: u32,
    publisher: Publisher<ScanEvent>,
}

impl ErrorRecoveryCoordinator {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            low_quality_streak: 0,
            good_streak: 0,
            recoveries: 0,
            escalations: 0,
            publisher: Publisher::new(),
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn publisher(&self) -> &Publisher<ScanEvent> {
        &self.publisher
    }

    pub fn low_quality_streak(&self) -> u32 {
        self.low_quality_streak
    }

    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }

    pub fn escalations(&self) -> u32 {
        self.escalations
    }

    /// Track one evaluated frame.
    pub fn observe_frame(&mut self, acceptable: bool, lighting: f32) -> FrameObservation {
        if acceptable {
            self.low_quality_streak = 0;
            self.good_streak += 1;
            let sustained = self.good_streak >= self.config.sustained_quality_frames;
            if sustained {
                self.good_streak = 0;
            }
            return FrameObservation {
                failure: None,
                sustained,
            };
        }
        self.good_streak = 0;
        self.bump_streak(Some(lighting))
    }

    /// Track a frame rejected as malformed.
    pub fn observe_invalid_frame(&mut self) -> FrameObservation {
        self.good_streak = 0;
        self.bump_streak(None)
    }

    fn bump_streak(&mut self, lighting: Option<f32>) -> FrameObservation {
        self.low_quality_streak += 1;
        if self.low_quality_streak < self.config.low_quality_streak_limit {
            return FrameObservation::default();
        }
        let streak = std::mem::take(&mut self.low_quality_streak);
        let failure = match lighting {
            Some(level) if level < self.config.insufficient_lighting_floor => {
                ScanError::InsufficientLighting {
                    level,
                    required: self.config.insufficient_lighting_floor,
                }
            }
            _ => ScanError::QualityBelowThreshold(format!(
                "{streak} consecutive frames below threshold"
            )),
        };
        FrameObservation {
            failure: Some(failure),
            sustained: false,
        }
    }

    /// Apply the recovery policy for `error`.
    pub fn handle(&mut self, error: ScanError, ctx: RecoveryContext<'_>) -> RecoveryOutcome {
        let kind = error.kind();
        match kind {
            ErrorKind::SignalUnavailable
            | ErrorKind::ProcessingInProgress
            | ErrorKind::InvalidFrameData => {
                log::debug!("Recovery: absorbed {}", error);
                RecoveryOutcome::Skipped
            }
            ErrorKind::QualityBelowThreshold | ErrorKind::InsufficientLighting => {
                self.recover(error, ctx)
            }
            _ => self.escalate(kind, &error, None, ctx),
        }
    }

    fn recover(&mut self, error: ScanError, ctx: RecoveryContext<'_>) -> RecoveryOutcome {
        let cause = error.kind();
        let entered = match ctx.state.begin_recovery(ctx.now_us) {
            Ok(state) => state,
            Err(e) => return self.escalate(ErrorKind::UnrecoverableError, &e, None, ctx),
        };
        let ScanningState::Recovering { attempt } = entered else {
            // Attempt cap exceeded; the state machine already moved to Error
            return self.report(
                ErrorKind::UnrecoverableError,
                cause,
                &error,
                Some("attempt cap".to_string()),
                &ctx,
            );
        };

        self.publisher.publish(ScanEvent::RecoverableError {
            kind: cause,
            attempt,
            timestamp_us: ctx.now_us,
        });

        match cause {
            ErrorKind::InsufficientLighting => {
                match ctx.controller.relax(SettingField::Lighting, ctx.now_us) {
                    Some(event) => {
                        self.recoveries += 1;
                        log::info!("Recovery: lighting threshold relaxed (attempt {})", attempt);
                        RecoveryOutcome::Recovered(RecoveryAction::SettingsRelaxed(event))
                    }
                    None => self.escalate(
                        ErrorKind::UnrecoverableError,
                        &error,
                        Some("lighting relaxation at floor".to_string()),
                        ctx,
                    ),
                }
            }
            _ => match ctx.arbitrator.fallback(ctx.now_us) {
                Ok(decision) => {
                    self.recoveries += 1;
                    RecoveryOutcome::Recovered(RecoveryAction::ModeFallback(decision))
                }
                Err(fallback_error) => {
                    let attempted = format!("mode fallback: {fallback_error}");
                    self.escalate(
                        ErrorKind::UnrecoverableError,
                        &fallback_error,
                        Some(attempted),
                        ctx,
                    )
                }
            },
        }
    }

    /// Move the session to `Error(kind)` and report.
    fn escalate(
        &mut self,
        kind: ErrorKind,
        error: &ScanError,
        attempted: Option<String>,
        ctx: RecoveryContext<'_>,
    ) -> RecoveryOutcome {
        if !ctx.state.state().is_terminal()
            && let Err(e) = ctx.state.fail(kind, ctx.now_us)
        {
            log::error!("Recovery: could not enter error state: {}", e);
        }
        self.report(kind, error.kind(), error, attempted, &ctx)
    }

    fn report(
        &mut self,
        kind: ErrorKind,
        cause: ErrorKind,
        error: &ScanError,
        attempted: Option<String>,
        ctx: &RecoveryContext<'_>,
    ) -> RecoveryOutcome {
        let escalation = Escalation {
            kind,
            cause,
            message: error.to_string(),
            attempts: ctx.state.recovery_attempts(),
            attempted,
            metrics: ctx.metrics,
            timestamp_us: ctx.now_us,
        };
        log::error!(
            "Recovery: escalating {} ({}) after {} attempt(s), attempted={:?}, metrics={:?}",
            escalation.message,
            cause,
            escalation.attempts,
            escalation.attempted,
            escalation.metrics
        );
        self.escalations += 1;
        self.publisher
            .publish(ScanEvent::UnrecoverableError(escalation.clone()));
        RecoveryOutcome::Escalate(escalation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::AdaptationConfig;
    use crate::arbitration::ArbitrationConfig;
    use crate::core::types::{DeviceCapability, ScanningConditions, ScanningMode};
    use crate::session::StateMachineConfig;

    struct Rig {
        state: ScanningStateMachine,
        arbitrator: ModeArbitrator,
        controller: AdaptiveQualityController,
        coordinator: ErrorRecoveryCoordinator,
    }

    impl Rig {
        fn new(has_lidar: bool) -> Self {
            let mut state = ScanningStateMachine::new(StateMachineConfig::default());
            state.transition(ScanningState::Initializing, 0).unwrap();
            state.transition(ScanningState::Scanning, 1).unwrap();
            let mut arbitrator = ModeArbitrator::new(
                ArbitrationConfig::default(),
                DeviceCapability::new(has_lidar, 1.0),
            )
            .unwrap();
            arbitrator
                .evaluate(&ScanningConditions::new(0.9, 0.9, 0.1, 0.9), 1)
                .unwrap();
            Self {
                state,
                arbitrator,
                controller: AdaptiveQualityController::new(AdaptationConfig::default()),
                coordinator: ErrorRecoveryCoordinator::new(RecoveryConfig::default()),
            }
        }

        fn handle(&mut self, error: ScanError, now_us: TimestampUs) -> RecoveryOutcome {
            self.coordinator.handle(
                error,
                RecoveryContext {
                    state: &mut self.state,
                    arbitrator: &mut self.arbitrator,
                    controller: &mut self.controller,
                    metrics: None,
                    now_us,
                },
            )
        }
    }

    #[test]
    fn test_streak_raises_quality_failure() {
        let mut coordinator = ErrorRecoveryCoordinator::new(RecoveryConfig::default());
        for _ in 0..14 {
            assert!(coordinator.observe_frame(false, 0.6).failure.is_none());
        }
        let failure = coordinator.observe_frame(false, 0.6).failure;
        assert!(matches!(failure, Some(ScanError::QualityBelowThreshold(_))));
        assert_eq!(coordinator.low_quality_streak(), 0);
    }

    #[test]
    fn test_dark_streak_is_insufficient_lighting() {
        let mut coordinator = ErrorRecoveryCoordinator::new(RecoveryConfig::default());
        let mut last = None;
        for _ in 0..15 {
            last = coordinator.observe_frame(false, 0.1).failure;
        }
        assert!(matches!(last, Some(ScanError::InsufficientLighting { .. })));
    }

    #[test]
    fn test_invalid_frames_count_toward_streak() {
        let mut coordinator = ErrorRecoveryCoordinator::new(RecoveryConfig::default());
        for _ in 0..10 {
            coordinator.observe_frame(false, 0.6);
        }
        for _ in 0..4 {
            coordinator.observe_invalid_frame();
        }
        assert!(coordinator.observe_invalid_frame().failure.is_some());
    }

    #[test]
    fn test_sustained_quality_signalled_once_per_run() {
        let mut coordinator = ErrorRecoveryCoordinator::new(RecoveryConfig::default());
        let sustained: Vec<bool> = (0..60)
            .map(|_| coordinator.observe_frame(true, 0.8).sustained)
            .collect();
        assert_eq!(sustained.iter().filter(|s| **s).count(), 2);
        assert!(sustained[29]);
    }

    #[test]
    fn test_quality_failure_falls_back() {
        let mut rig = Rig::new(true);
        let outcome = rig.handle(ScanError::QualityBelowThreshold("test".into()), 10);
        let RecoveryOutcome::Recovered(RecoveryAction::ModeFallback(decision)) = outcome else {
            panic!("expected fallback, got {outcome:?}");
        };
        assert_eq!(decision.mode, ScanningMode::Photogrammetry);
        assert_eq!(rig.state.state(), ScanningState::Recovering { attempt: 1 });
    }

    #[test]
    fn test_exhausted_chain_escalates() {
        let mut rig = Rig::new(false);
        let outcome = rig.handle(ScanError::QualityBelowThreshold("test".into()), 10);
        let RecoveryOutcome::Escalate(escalation) = outcome else {
            panic!("expected escalation");
        };
        assert_eq!(escalation.kind, ErrorKind::UnrecoverableError);
        assert_eq!(escalation.cause, ErrorKind::NoFallbackAvailable);
        assert_eq!(
            rig.state.state(),
            ScanningState::Error(ErrorKind::UnrecoverableError)
        );
    }

    #[test]
    fn test_lighting_failure_relaxes() {
        let mut rig = Rig::new(true);
        let outcome = rig.handle(
            ScanError::InsufficientLighting {
                level: 0.1,
                required: 0.25,
            },
            10,
        );
        assert!(matches!(
            outcome,
            RecoveryOutcome::Recovered(RecoveryAction::SettingsRelaxed(_))
        ));
        assert!(rig.controller.settings().lighting_threshold < 0.6);
    }

    #[test]
    fn test_transient_kinds_skipped() {
        let mut rig = Rig::new(true);
        assert_eq!(
            rig.handle(ScanError::ProcessingInProgress, 10),
            RecoveryOutcome::Skipped
        );
        assert_eq!(rig.state.state(), ScanningState::Scanning);
    }

    #[test]
    fn test_fatal_kind_escalates_with_own_kind() {
        let mut rig = Rig::new(true);
        let rx = rig.coordinator.publisher().subscribe();
        let outcome = rig.handle(ScanError::DeviceNotSupported("no camera".into()), 10);
        assert!(matches!(outcome, RecoveryOutcome::Escalate(_)));
        assert_eq!(
            rig.state.state(),
            ScanningState::Error(ErrorKind::DeviceNotSupported)
        );
        assert!(matches!(rx.try_recv(), Ok(ScanEvent::UnrecoverableError(_))));
    }
}
