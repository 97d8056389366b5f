//! One scanning session, end to end.
//!
//! Per frame:
//!
//! ```text
//! Frame ─▶ SignalExtractors ─▶ QualityAggregator ─┬─▶ AdaptiveQualityController
//!                                                 ├─▶ ModeArbitrator
//!                                                 └─▶ acceptability ─▶ StateMachine
//!                                                                        │ streak
//!                                                                        ▼
//!                                                           ErrorRecoveryCoordinator
//! ```
//!
//! Resource reports arrive separately through [`ScanSession::apply_resource_report`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::recovery::{
    ErrorRecoveryCoordinator, Escalation, RecoveryAction, RecoveryConfig, RecoveryContext,
    RecoveryOutcome,
};
use super::state_machine::{ScanningStateMachine, StateMachineConfig};
use super::store::{SessionSnapshot, SessionStore};
use crate::adaptive::{AdaptiveQualityController, QualitySettings};
use crate::arbitration::{ModeArbitrator, ModeDecision};
use crate::config::DrishtiConfig;
use crate::core::clock::TimestampUs;
use crate::core::types::{
    Frame, PauseReason, QualityMetrics, ResourceMetrics, ScanningConditions, ScanningMode,
    ScanningState, StateTransition,
};
use crate::error::{Result, ScanError};
use crate::events::{EventSubscription, Publisher, ScanEvent};
use crate::quality::{
    ConditionsHistory, MetricKind, QualityAggregator, QualityAnalysis, QualityFailure,
    QualityVerdict, ThresholdProvider,
};
use crate::resources::{Resource, ResourceAction, ResourceReport};
use crate::signals::SignalExtractors;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Default: "scan"
    pub session_id: String,

    /// Motion stability below which scanning pauses.
    /// Default: 0.3
    pub motion_pause_threshold: f32,

    /// Surface complexity assumed before any depth has been seen.
    /// Default: 0.5
    pub fallback_complexity: f32,

    /// Quality snapshots kept on a memory-cleanup request.
    /// Default: 5
    pub memory_cleanup_keep: usize,

    /// Upper bound for flushing the in-flight frame on stop.
    /// Default: 2000
    pub stop_timeout_ms: u64,

    pub state_machine: StateMachineConfig,
    pub recovery: RecoveryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: "scan".to_string(),
            motion_pause_threshold: 0.3,
            fallback_complexity: 0.5,
            memory_cleanup_keep: 5,
            stop_timeout_ms: 2_000,
            state_machine: StateMachineConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

/// What happened to one submitted frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Accepted(QualityMetrics),
    Rejected(QualityVerdict),
    /// Malformed buffers.
    Invalid,
    /// Frame evaluated but the session is paused.
    Paused(PauseReason),
    /// Session state does not consume frames.
    Ignored(ScanningState),
    Recovered(RecoveryAction),
    Escalated(Escalation),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub frames_received: u64,
    pub frames_accepted: u64,
    pub frames_rejected: u64,
    pub frames_invalid: u64,
    pub frames_paused: u64,
    pub frames_ignored: u64,
    /// Dropped by the runner's frame gate before reaching the session.
    pub frames_dropped: u64,
    pub mode_switches: u32,
    pub adaptations: u32,
    pub recoveries: u32,
    pub escalations: u32,
    pub quality_warnings: u32,
    pub recovery_points: u32,
}

impl SessionStats {
    /// Accepted fraction of evaluated frames.
    pub fn acceptance_rate(&self) -> f32 {
        let evaluated = self.frames_accepted + self.frames_rejected;
        if evaluated == 0 {
            0.0
        } else {
            self.frames_accepted as f32 / evaluated as f32
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub final_state: ScanningState,
    pub final_mode: Option<ScanningMode>,
    pub retired_modes: Vec<ScanningMode>,
    pub settings: QualitySettings,
    pub stats: SessionStats,
    pub average_conditions: Option<ScanningConditions>,
    pub last_metrics: Option<QualityMetrics>,
    pub transitions: Vec<StateTransition>,
    pub escalation: Option<Escalation>,
    pub duration_us: u64,
}

pub struct ScanSession {
    config: SessionConfig,
    extractors: SignalExtractors,
    aggregator: QualityAggregator,
    conditions: ConditionsHistory,
    thresholds: Box<dyn ThresholdProvider>,
    controller: AdaptiveQualityController,
    arbitrator: ModeArbitrator,
    state: ScanningStateMachine,
    recovery: ErrorRecoveryCoordinator,
    store: Option<Arc<dyn SessionStore>>,
    resources: ResourceMetrics,
    critical_resources: Vec<Resource>,
    stats: SessionStats,
    escalation: Option<Escalation>,
    started_us: TimestampUs,
    publisher: Publisher<ScanEvent>,
}

impl ScanSession {
    /// Build every component from one config.
    ///
    /// Fails with `DeviceNotSupported` for incapable devices and `Config` for
    /// an unknown region.
    pub fn from_config(config: &DrishtiConfig) -> Result<Self> {
        config.validate()?;
        let arbitrator = ModeArbitrator::new(config.arbitration.clone(), config.device)?;

        let mut session_config = config.session.clone();
        session_config.state_machine.max_recovery_attempts =
            config.arbitration.max_fallback_attempts;

        Ok(Self {
            extractors: SignalExtractors::new(config.signals.clone()),
            aggregator: QualityAggregator::new(config.aggregator.clone()),
            conditions: ConditionsHistory::new(config.aggregator.conditions_window),
            thresholds: Box::new(config.threshold_provider()?),
            controller: AdaptiveQualityController::new(config.adaptation.clone()),
            arbitrator,
            state: ScanningStateMachine::new(session_config.state_machine.clone()),
            recovery: ErrorRecoveryCoordinator::new(session_config.recovery.clone()),
            store: None,
            // The capability query's thermal state stands until the monitor reports
            resources: ResourceMetrics {
                thermal_state: config.device.thermal_state,
                ..ResourceMetrics::default()
            },
            critical_resources: Vec::new(),
            stats: SessionStats::default(),
            escalation: None,
            started_us: 0,
            publisher: Publisher::new(),
            config: session_config,
        })
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_thresholds(mut self, provider: Box<dyn ThresholdProvider>) -> Self {
        self.thresholds = provider;
        self
    }

    pub fn id(&self) -> &str {
        &self.config.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ScanningState {
        self.state.state()
    }

    pub fn mode(&self) -> Option<ScanningMode> {
        self.arbitrator.current()
    }

    pub fn settings(&self) -> QualitySettings {
        self.controller.settings()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn current_metrics(&self) -> Option<QualityMetrics> {
        self.aggregator.current_metrics()
    }

    pub fn state_machine(&self) -> &ScanningStateMachine {
        &self.state
    }

    pub fn arbitrator(&self) -> &ModeArbitrator {
        &self.arbitrator
    }

    pub fn controller(&self) -> &AdaptiveQualityController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut AdaptiveQualityController {
        &mut self.controller
    }

    pub fn aggregator(&self) -> &QualityAggregator {
        &self.aggregator
    }

    /// Events from every component of this session.
    pub fn subscribe(&self) -> EventSubscription<ScanEvent> {
        EventSubscription::new()
            .with(self.publisher.subscribe())
            .with(self.state.publisher().subscribe())
            .with(self.arbitrator.publisher().subscribe())
            .with(self.controller.publisher().subscribe())
            .with(self.recovery.publisher().subscribe())
    }

    /// Account for frames the caller dropped before they reached the session.
    pub fn record_dropped(&mut self, count: u64) {
        self.stats.frames_dropped += count;
    }

    /// Idle -> Initializing -> Scanning with an initial mode.
    pub fn start(&mut self, now_us: TimestampUs) -> Result<ModeDecision> {
        self.state.transition(ScanningState::Initializing, now_us)?;
        self.started_us = now_us;

        let initial = ScanningConditions {
            device_performance: self.device_performance(),
            surface_complexity: self.config.fallback_complexity,
            ..ScanningConditions::default()
        }
        .at(now_us);

        let decision = match self.arbitrator.evaluate(&initial, now_us) {
            Ok(Some(decision)) => decision,
            Ok(None) => {
                return Err(ScanError::Unrecoverable(
                    "arbitrator selected no initial mode".to_string(),
                ));
            }
            Err(e) => {
                self.state.fail(e.kind(), now_us)?;
                return Err(e);
            }
        };
        self.stats.mode_switches += 1;
        self.state.transition(ScanningState::Scanning, now_us)?;
        log::info!(
            "Session {}: scanning in {} mode (region {})",
            self.config.session_id,
            decision.mode,
            self.thresholds.region()
        );
        Ok(decision)
    }

    /// User-requested pause.
    pub fn pause(&mut self, now_us: TimestampUs) -> Result<()> {
        self.state
            .transition(ScanningState::Paused(PauseReason::UserRequested), now_us)?;
        Ok(())
    }

    /// Resume after a user-requested pause.
    pub fn resume(&mut self, now_us: TimestampUs) -> Result<()> {
        self.state.transition(ScanningState::Scanning, now_us)?;
        self.extractors.reset_motion();
        Ok(())
    }

    /// Evaluate one frame.
    pub fn process_frame(&mut self, frame: &Frame, now_us: TimestampUs) -> Result<FrameOutcome> {
        self.stats.frames_received += 1;
        let state = self.state.state();
        if !state.accepts_frames() {
            self.stats.frames_ignored += 1;
            return Ok(FrameOutcome::Ignored(state));
        }
        let Some(mode) = self.arbitrator.current() else {
            self.stats.frames_ignored += 1;
            return Ok(FrameOutcome::Ignored(state));
        };
        if state == ScanningState::Paused(PauseReason::UserRequested) {
            self.stats.frames_paused += 1;
            return Ok(FrameOutcome::Paused(PauseReason::UserRequested));
        }

        let signals = match self.extractors.extract(frame, mode) {
            Ok(signals) => signals,
            Err(e @ ScanError::InvalidFrameData(_)) => {
                log::debug!("Session: frame {}us rejected: {}", frame.timestamp_us, e);
                self.stats.frames_invalid += 1;
                // A paused session waits for its own condition to clear
                if state != ScanningState::Scanning {
                    return Ok(FrameOutcome::Invalid);
                }
                let observation = self.recovery.observe_invalid_frame();
                if let Some(failure) = observation.failure {
                    return self.run_recovery(failure, None, now_us);
                }
                return Ok(FrameOutcome::Invalid);
            }
            Err(e) => return Err(e),
        };

        let metrics = signals.to_metrics();
        self.aggregator.push(metrics);

        let fallback_complexity = self
            .conditions
            .latest()
            .map_or(self.config.fallback_complexity, |c| c.surface_complexity);
        let conditions = signals.to_conditions(
            self.device_performance(),
            self.resources.battery_level,
            fallback_complexity,
        );
        self.conditions.push(conditions);

        if let Some(reason) = self.update_pause(conditions.motion_stability, now_us)? {
            self.stats.frames_paused += 1;
            return Ok(FrameOutcome::Paused(reason));
        }

        let settings = self.controller.settings();
        let thresholds = self.thresholds.thresholds().tightened(
            settings.lighting_threshold,
            settings.motion_threshold,
            settings.feature_quality_threshold,
        );
        let mut verdict = thresholds.evaluate(&metrics);
        if mode.requires_lidar()
            && !signals.density_meets_floor()
            && !verdict.fails(MetricKind::PointDensity)
        {
            verdict.failures.push(QualityFailure {
                metric: MetricKind::PointDensity,
                value: metrics.point_density.unwrap_or(0.0),
                threshold: self.extractors.config().density_floor(mode),
            });
        }
        let acceptable = verdict.is_acceptable();

        let analysis = QualityAnalysis::new(metrics, self.aggregator.trend(), acceptable);
        if self
            .controller
            .adapt(&analysis, &self.resources, now_us)
            .is_some()
        {
            self.stats.adaptations += 1;
        }

        let smoothed = self.conditions.average().unwrap_or(conditions);
        if let Some(decision) = self.arbitrator.evaluate(&smoothed, now_us)? {
            self.stats.mode_switches += 1;
            self.extractors.reset_motion();
            log::debug!("Session: delta {:?}", decision.delta);
        }

        if acceptable {
            self.stats.frames_accepted += 1;
            if let Some(mode) = self.arbitrator.current()
                && self
                    .state
                    .capture_recovery_point(mode, self.controller.settings(), metrics, true, now_us)
                    .is_some()
            {
                self.stats.recovery_points += 1;
                self.persist(now_us);
            }
        } else {
            self.stats.frames_rejected += 1;
            self.stats.quality_warnings += 1;
            if log::log_enabled!(log::Level::Debug) {
                log::debug!("Session: frame rejected: {}", verdict.summary());
            }
            self.publisher.publish(ScanEvent::QualityWarning {
                failures: verdict.failures.clone(),
                timestamp_us: now_us,
            });
        }

        let observation = self.recovery.observe_frame(acceptable, metrics.lighting_score);
        if observation.sustained {
            self.arbitrator.reset_fallback_attempts();
            self.state.reset_recovery_attempts();
        }
        if let Some(failure) = observation.failure {
            return self.run_recovery(failure, Some(metrics), now_us);
        }

        Ok(if acceptable {
            FrameOutcome::Accepted(metrics)
        } else {
            FrameOutcome::Rejected(verdict)
        })
    }

    /// Device performance from the latest resource sample.
    fn device_performance(&self) -> f32 {
        self.resources
            .device_performance(self.arbitrator.capability().processing_power)
    }

    /// Pause on shaky capture or critical resources; resume when cleared.
    ///
    /// Returns the active pause reason, if any.
    fn update_pause(
        &mut self,
        motion_stability: f32,
        now_us: TimestampUs,
    ) -> Result<Option<PauseReason>> {
        let shaky = motion_stability < self.config.motion_pause_threshold;
        let constrained = !self.critical_resources.is_empty();

        match self.state.state() {
            ScanningState::Paused(PauseReason::UserRequested) => {
                Ok(Some(PauseReason::UserRequested))
            }
            ScanningState::Paused(reason) => {
                let still = match reason {
                    PauseReason::ExcessiveMotion => shaky,
                    PauseReason::ResourceConstraint => constrained,
                    _ => false,
                };
                if still {
                    Ok(Some(reason))
                } else {
                    self.state.transition(ScanningState::Scanning, now_us)?;
                    Ok(None)
                }
            }
            ScanningState::Scanning if constrained => {
                let reason = PauseReason::ResourceConstraint;
                self.state.transition(ScanningState::Paused(reason), now_us)?;
                Ok(Some(reason))
            }
            ScanningState::Scanning if shaky => {
                let reason = PauseReason::ExcessiveMotion;
                self.state.transition(ScanningState::Paused(reason), now_us)?;
                Ok(Some(reason))
            }
            _ => Ok(None),
        }
    }

    fn run_recovery(
        &mut self,
        failure: ScanError,
        metrics: Option<QualityMetrics>,
        now_us: TimestampUs,
    ) -> Result<FrameOutcome> {
        let outcome = self.recovery.handle(
            failure,
            RecoveryContext {
                state: &mut self.state,
                arbitrator: &mut self.arbitrator,
                controller: &mut self.controller,
                metrics,
                now_us,
            },
        );
        match outcome {
            RecoveryOutcome::Skipped => Ok(FrameOutcome::Invalid),
            RecoveryOutcome::Recovered(action) => {
                self.stats.recoveries += 1;
                match action {
                    RecoveryAction::ModeFallback(_) => {
                        self.stats.mode_switches += 1;
                        self.extractors.reset_motion();
                        if let Some(point) = self.state.fresh_recovery_point(now_us) {
                            log::info!(
                                "Session: resuming from recovery point at {}us",
                                point.timestamp_us
                            );
                            if self
                                .controller
                                .force_quality_update(point.settings, now_us)
                                .is_some()
                            {
                                self.stats.adaptations += 1;
                            }
                        }
                    }
                    RecoveryAction::SettingsRelaxed(_) => self.stats.adaptations += 1,
                }
                self.state.transition(ScanningState::Scanning, now_us)?;
                Ok(FrameOutcome::Recovered(action))
            }
            RecoveryOutcome::Escalate(escalation) => {
                self.stats.escalations += 1;
                self.escalation = Some(escalation.clone());
                self.persist(now_us);
                Ok(FrameOutcome::Escalated(escalation))
            }
        }
    }

    /// Take in one resource monitor tick.
    pub fn apply_resource_report(
        &mut self,
        report: &ResourceReport,
        now_us: TimestampUs,
    ) -> Result<()> {
        self.resources = report.metrics;
        self.critical_resources = report.critical.clone();

        for action in &report.actions {
            match action {
                ResourceAction::Cooldown => {
                    if self.controller.throttle(None, now_us).is_some() {
                        self.stats.adaptations += 1;
                    }
                }
                ResourceAction::MemoryCleanup => {
                    let keep = self.config.memory_cleanup_keep;
                    self.aggregator.release_memory(keep);
                    self.conditions.retain_latest(keep);
                }
            }
        }

        match self.state.state() {
            ScanningState::Scanning if !self.critical_resources.is_empty() => {
                log::warn!(
                    "Session: pausing, critical resources {:?}",
                    self.critical_resources
                );
                self.state.transition(
                    ScanningState::Paused(PauseReason::ResourceConstraint),
                    now_us,
                )?;
            }
            ScanningState::Paused(PauseReason::ResourceConstraint)
                if self.critical_resources.is_empty() =>
            {
                self.state.transition(ScanningState::Scanning, now_us)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Finish the session: Processing -> Complete, or keep the error state.
    pub fn stop(&mut self, now_us: TimestampUs) -> Result<SessionSummary> {
        match self.state.state() {
            ScanningState::Scanning
            | ScanningState::Paused(_)
            | ScanningState::Recovering { .. } => {
                self.state.transition(ScanningState::Processing, now_us)?;
                self.state.transition(ScanningState::Complete, now_us)?;
            }
            ScanningState::Processing => {
                self.state.transition(ScanningState::Complete, now_us)?;
            }
            ScanningState::Complete | ScanningState::Error(_) => {}
            other => {
                return Err(ScanError::InvalidTransition {
                    from: other,
                    to: ScanningState::Processing,
                });
            }
        }
        self.persist(now_us);
        let summary = self.summary(now_us);
        log::info!(
            "Session {}: {} after {:.1}s, {}/{} frames accepted ({:.0}%)",
            summary.session_id,
            summary.final_state,
            summary.duration_us as f64 / 1e6,
            summary.stats.frames_accepted,
            summary.stats.frames_received,
            summary.stats.acceptance_rate() * 100.0
        );
        Ok(summary)
    }

    pub fn summary(&self, now_us: TimestampUs) -> SessionSummary {
        SessionSummary {
            session_id: self.config.session_id.clone(),
            final_state: self.state.state(),
            final_mode: self.arbitrator.current(),
            retired_modes: self.arbitrator.retired().to_vec(),
            settings: self.controller.settings(),
            stats: self.stats,
            average_conditions: self.conditions.average(),
            last_metrics: self.aggregator.current_metrics(),
            transitions: self.state.history(),
            escalation: self.escalation.clone(),
            duration_us: now_us.saturating_sub(self.started_us),
        }
    }

    pub fn snapshot(&self, now_us: TimestampUs) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.config.session_id.clone(),
            state: self.state.state(),
            mode: self.arbitrator.current(),
            region: self.thresholds.region().to_string(),
            thresholds: self.thresholds.thresholds(),
            settings: self.controller.settings(),
            metrics_history: self.aggregator.history(),
            recovery_points: self.state.recovery_points(),
            adaptation_events: self.controller.events(),
            timestamp_us: now_us,
        }
    }

    /// Save a snapshot; a failing store is logged, never fatal to the scan.
    fn persist(&self, now_us: TimestampUs) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&self.snapshot(now_us)) {
            log::warn!("Session {}: snapshot not saved: {}", self.config.session_id, e);
        }
    }
}
