//! Quality/resource feedback onto capture settings.
//!
//! Normal adaptation steps a *candidate* each analysis and only applies it
//! once it differs from the applied settings by more than the deadband (or
//! the tier changes) and the minimum interval has passed. Thermal pressure
//! overrides everything and is undone when the device cools.
//!
//! A threshold is never tightened past the best value its metric reached in
//! the recent window, and a threshold the whole window failed to reach steps
//! back down toward that peak. An acceptance gate therefore always stays
//! within reach of the observed signal.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::settings::{ProcessingTier, QualitySettings, SettingField, ThresholdRange};
use crate::core::clock::{TimestampUs, ms_to_us};
use crate::core::ring_buffer::RingBuffer;
use crate::core::types::{QualityMetrics, ResourceMetrics};
use crate::events::{Publisher, ScanEvent};
use crate::quality::QualityAnalysis;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    /// Minimum time between gated updates.
    /// Default: 500
    pub min_interval_ms: u64,

    /// Relative change any field must exceed for an update to apply.
    /// Default: 0.1
    pub deadband: f32,

    /// Multiplicative step per adjustment.
    /// Default: 0.08
    pub step: f32,

    /// Default: [0.3, 1.0]
    pub lighting_range: ThresholdRange,

    /// Default: [0.3, 1.0]
    pub motion_range: ThresholdRange,

    /// Default: [0.2, 0.9]
    pub feature_range: ThresholdRange,

    /// Margin above a threshold that counts as over-performing, capped at
    /// half the headroom left below the range maximum.
    /// Default: 0.2
    pub overperform_margin: f32,

    /// Consecutive over-performing analyses before loosening.
    /// Default: 3
    pub overperform_streak: u32,

    /// Analyses whose peak bounds how far a threshold may tighten.
    /// Default: 30
    pub ceiling_window: usize,

    /// Audit trail capacity.
    /// Default: 100
    pub event_capacity: usize,

    /// Settings at session start.
    pub initial: QualitySettings,

    /// CPU above this (or memory above `medium_memory_mb`) selects Medium.
    /// Default: 0.8
    pub medium_cpu: f32,

    /// Default: 150.0
    pub medium_memory_mb: f32,

    /// CPU below this and memory below `high_memory_mb` selects High.
    /// Default: 0.5
    pub high_cpu: f32,

    /// Default: 100.0
    pub high_memory_mb: f32,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 500,
            deadband: 0.1,
            step: 0.08,
            lighting_range: ThresholdRange::new(0.3, 1.0),
            motion_range: ThresholdRange::new(0.3, 1.0),
            feature_range: ThresholdRange::new(0.2, 0.9),
            overperform_margin: 0.2,
            overperform_streak: 3,
            ceiling_window: 30,
            event_capacity: 100,
            initial: QualitySettings::default(),
            medium_cpu: 0.8,
            medium_memory_mb: 150.0,
            high_cpu: 0.5,
            high_memory_mb: 100.0,
        }
    }
}

impl AdaptationConfig {
    pub fn range(&self, field: SettingField) -> ThresholdRange {
        match field {
            SettingField::Lighting => self.lighting_range,
            SettingField::Motion => self.motion_range,
            SettingField::FeatureQuality => self.feature_range,
        }
    }

    /// Over-performance margin at `threshold`.
    pub fn overperform_margin_at(&self, field: SettingField, threshold: f32) -> f32 {
        let headroom = (self.range(field).max - threshold).max(0.0);
        self.overperform_margin.min(headroom * 0.5)
    }

    pub fn thermal_safe(&self) -> QualitySettings {
        QualitySettings::thermal_safe(self.lighting_range, self.motion_range, self.feature_range)
    }

    /// Clamp every threshold into its range.
    pub fn clamp(&self, mut settings: QualitySettings) -> QualitySettings {
        for field in SettingField::ALL {
            settings.set(field, self.range(field).clamp(settings.get(field)));
        }
        settings
    }

    /// Tier implied by resource load, or `None` inside the hysteresis band.
    pub fn tier_for(&self, resources: &ResourceMetrics) -> Option<ProcessingTier> {
        if resources.cpu_usage > self.medium_cpu || resources.memory_usage_mb > self.medium_memory_mb
        {
            Some(ProcessingTier::Medium)
        } else if resources.cpu_usage < self.high_cpu
            && resources.memory_usage_mb < self.high_memory_mb
        {
            Some(ProcessingTier::High)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationReason {
    QualityImprovement,
    PerformanceOptimization,
    ErrorRecovery,
    ThermalMitigation,
    UserRequest,
}

impl fmt::Display for AdaptationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdaptationReason::QualityImprovement => "quality improvement",
            AdaptationReason::PerformanceOptimization => "performance optimization",
            AdaptationReason::ErrorRecovery => "error recovery",
            AdaptationReason::ThermalMitigation => "thermal mitigation",
            AdaptationReason::UserRequest => "user request",
        };
        f.write_str(s)
    }
}

/// One applied settings change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptationEvent {
    pub timestamp_us: TimestampUs,
    pub previous: QualitySettings,
    pub new: QualitySettings,
    /// Metrics that triggered the change, when one analysis did.
    pub metrics: Option<QualityMetrics>,
    pub reason: AdaptationReason,
}

/// Which gates an update must pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Interval and deadband.
    Gated,
    /// Deadband only.
    Forced,
    /// Interval only; used while an applied threshold sits above every
    /// value in a full observation window.
    Eased,
    /// Neither; skipped only when nothing changes.
    Override,
}

/// Sole owner of the current [`QualitySettings`].
#[derive(Debug)]
pub struct AdaptiveQualityController {
    config: AdaptationConfig,
    settings: QualitySettings,
    candidate: QualitySettings,
    last_applied_us: Option<TimestampUs>,
    overperform: [u32; 3],
    /// Recent lighting / motion / feature values, in `SettingField::ALL` order.
    observed: RingBuffer<[f32; 3]>,
    /// Settings to restore once thermal pressure clears.
    pre_throttle: Option<QualitySettings>,
    events: RingBuffer<AdaptationEvent>,
    publisher: Publisher<ScanEvent>,
}

impl AdaptiveQualityController {
    pub fn new(config: AdaptationConfig) -> Self {
        let settings = config.clamp(config.initial);
        let events = RingBuffer::new(config.event_capacity);
        let observed = RingBuffer::new(config.ceiling_window);
        Self {
            config,
            settings,
            candidate: settings,
            last_applied_us: None,
            overperform: [0; 3],
            observed,
            pre_throttle: None,
            events,
            publisher: Publisher::new(),
        }
    }

    /// Snapshot of the applied settings.
    pub fn settings(&self) -> QualitySettings {
        self.settings
    }

    pub fn config(&self) -> &AdaptationConfig {
        &self.config
    }

    pub fn is_throttled(&self) -> bool {
        self.pre_throttle.is_some()
    }

    pub fn events(&self) -> Vec<AdaptationEvent> {
        self.events.to_vec()
    }

    pub fn publisher(&self) -> &Publisher<ScanEvent> {
        &self.publisher
    }

    /// Feed one analysis and the latest resource sample.
    pub fn adapt(
        &mut self,
        analysis: &QualityAnalysis,
        resources: &ResourceMetrics,
        now_us: TimestampUs,
    ) -> Option<AdaptationEvent> {
        if resources.thermal_state.is_elevated() {
            return self.throttle(Some(analysis.metrics), now_us);
        }
        if let Some(saved) = self.pre_throttle.take() {
            log::info!(
                "Adaptation: thermal {} cleared, restoring {}",
                resources.thermal_state,
                saved
            );
            self.overperform = [0; 3];
            return self.apply(
                saved,
                AdaptationReason::ThermalMitigation,
                UpdateMode::Override,
                Some(analysis.metrics),
                now_us,
            );
        }

        let metrics = &analysis.metrics;
        let values = [
            metrics.lighting_score,
            metrics.motion_score,
            metrics.feature_preservation,
        ];
        self.observed.push(values);
        for (i, field) in SettingField::ALL.into_iter().enumerate() {
            self.step_field(i, field, values[i]);
        }

        let mut reason = AdaptationReason::QualityImprovement;
        if let Some(tier) = self.config.tier_for(resources) {
            if tier != self.settings.processing_tier {
                reason = AdaptationReason::PerformanceOptimization;
            }
            self.candidate.processing_tier = tier;
        }

        let mode = if self.gate_unreached() {
            UpdateMode::Eased
        } else {
            UpdateMode::Gated
        };
        self.apply(self.candidate, reason, mode, Some(analysis.metrics), now_us)
    }

    /// Whether some applied threshold is above everything its metric reached
    /// over a full window.
    fn gate_unreached(&self) -> bool {
        self.observed.len() == self.observed.capacity()
            && SettingField::ALL
                .into_iter()
                .enumerate()
                .any(|(i, field)| self.settings.get(field) > self.peak(i))
    }

    /// Best value of one metric over the recent window.
    fn peak(&self, index: usize) -> f32 {
        self.observed
            .iter()
            .map(|values| values[index])
            .fold(f32::NEG_INFINITY, f32::max)
    }

    fn step_field(&mut self, index: usize, field: SettingField, value: f32) {
        let threshold = self.candidate.get(field);
        let range = self.config.range(field);
        let peak = self.peak(index);
        let window_full = self.observed.len() == self.observed.capacity();
        if window_full && threshold > peak {
            // Nothing in the window reached the gate: ease it toward the peak
            let eased = (threshold * (1.0 - self.config.step)).max(peak);
            self.candidate.set(field, range.clamp(eased));
            self.overperform[index] = 0;
        } else if value < threshold {
            if peak > threshold {
                let raised = (threshold * (1.0 + self.config.step)).min(peak);
                self.candidate.set(field, range.clamp(raised));
            }
            self.overperform[index] = 0;
        } else if value >= threshold + self.config.overperform_margin_at(field, threshold) {
            self.overperform[index] += 1;
            if self.overperform[index] >= self.config.overperform_streak {
                self.candidate
                    .set(field, range.clamp(threshold * (1.0 - self.config.step)));
                self.overperform[index] = 0;
            }
        } else {
            self.overperform[index] = 0;
        }
    }

    /// Force the most conservative settings, remembering the current ones.
    pub fn throttle(
        &mut self,
        metrics: Option<QualityMetrics>,
        now_us: TimestampUs,
    ) -> Option<AdaptationEvent> {
        if self.pre_throttle.is_none() {
            log::warn!("Adaptation: thermal pressure, switching to thermal-safe settings");
            self.pre_throttle = Some(self.settings);
        }
        self.apply(
            self.config.thermal_safe(),
            AdaptationReason::ThermalMitigation,
            UpdateMode::Override,
            metrics,
            now_us,
        )
    }

    /// Apply caller-chosen settings, bypassing the interval gate but not the
    /// deadband. While throttled the settings become the restore target.
    pub fn force_quality_update(
        &mut self,
        settings: QualitySettings,
        now_us: TimestampUs,
    ) -> Option<AdaptationEvent> {
        let settings = self.config.clamp(settings);
        if self.pre_throttle.is_some() {
            log::info!("Adaptation: throttled, deferring forced update to {}", settings);
            self.pre_throttle = Some(settings);
            return None;
        }
        self.apply(
            settings,
            AdaptationReason::UserRequest,
            UpdateMode::Forced,
            None,
            now_us,
        )
    }

    /// Loosen one threshold by one step for error recovery.
    ///
    /// Returns `None` when the threshold is already at its floor.
    pub fn relax(&mut self, field: SettingField, now_us: TimestampUs) -> Option<AdaptationEvent> {
        let mut relaxed = self.settings;
        let range = self.config.range(field);
        relaxed.set(field, range.clamp(relaxed.get(field) * (1.0 - self.config.step)));
        self.apply(
            relaxed,
            AdaptationReason::ErrorRecovery,
            UpdateMode::Override,
            None,
            now_us,
        )
    }

    /// Apply `new` if it passes the gates of `mode`.
    pub fn apply(
        &mut self,
        new: QualitySettings,
        reason: AdaptationReason,
        mode: UpdateMode,
        metrics: Option<QualityMetrics>,
        now_us: TimestampUs,
    ) -> Option<AdaptationEvent> {
        if new == self.settings {
            return None;
        }
        if matches!(mode, UpdateMode::Gated | UpdateMode::Eased)
            && let Some(last) = self.last_applied_us
            && now_us.saturating_sub(last) < ms_to_us(self.config.min_interval_ms)
        {
            return None;
        }
        if matches!(mode, UpdateMode::Gated | UpdateMode::Forced)
            && new.processing_tier == self.settings.processing_tier
            && self.settings.max_relative_change(&new) <= self.config.deadband
        {
            if log::log_enabled!(log::Level::Trace) {
                log::trace!("Adaptation: {} within deadband", new);
            }
            return None;
        }

        let event = AdaptationEvent {
            timestamp_us: now_us,
            previous: self.settings,
            new,
            metrics,
            reason,
        };
        log::info!("Adaptation ({}): {} -> {}", reason, self.settings, new);

        self.settings = new;
        self.candidate = new;
        self.last_applied_us = Some(now_us);
        self.events.push(event);
        self.publisher.publish(ScanEvent::SettingsChanged(event));
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ThermalState;
    use crate::quality::QualityTrend;
    use approx::assert_relative_eq;

    fn analysis(lighting: f32, motion: f32, feature: f32) -> QualityAnalysis {
        QualityAnalysis::new(
            QualityMetrics {
                lighting_score: lighting,
                motion_score: motion,
                feature_preservation: feature,
                ..Default::default()
            },
            QualityTrend::default(),
            true,
        )
    }

    fn idle() -> ResourceMetrics {
        ResourceMetrics::default()
    }

    #[test]
    fn test_underperformance_accumulates_past_deadband() {
        let mut controller = AdaptiveQualityController::new(AdaptationConfig::default());
        // Lighting has reached 0.9 recently, so there is room to tighten
        assert!(controller.adapt(&analysis(0.9, 0.75, 0.65), &idle(), 0).is_none());
        let dim = analysis(0.5, 0.75, 0.65);

        // One 8% step stays inside the 10% deadband
        assert!(controller.adapt(&dim, &idle(), 1_000_000).is_none());
        let event = controller.adapt(&dim, &idle(), 2_000_000).unwrap();
        assert_eq!(event.reason, AdaptationReason::QualityImprovement);
        assert_relative_eq!(
            controller.settings().lighting_threshold,
            0.6 * 1.08 * 1.08,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_tightening_capped_at_recent_peak() {
        let mut controller = AdaptiveQualityController::new(AdaptationConfig::default());
        controller.adapt(&analysis(0.7, 0.75, 0.65), &idle(), 0);
        for i in 1..40 {
            controller.adapt(&analysis(0.45, 0.75, 0.65), &idle(), i * 1_000_000);
        }
        // Never above what the metric actually reached
        assert!(controller.settings().lighting_threshold <= 0.7 + 1e-6);
    }

    #[test]
    fn test_dim_only_never_raises_threshold() {
        let mut controller = AdaptiveQualityController::new(AdaptationConfig::default());
        for i in 0..12 {
            controller.adapt(&analysis(0.44, 0.75, 0.65), &idle(), i * 100_000);
        }
        assert!(controller.settings().lighting_threshold <= 0.6 + 1e-6);
    }

    #[test]
    fn test_unreached_threshold_eases_toward_peak() {
        let mut controller = AdaptiveQualityController::new(AdaptationConfig::default());
        controller.force_quality_update(
            QualitySettings {
                lighting_threshold: 0.95,
                ..Default::default()
            },
            0,
        );
        let steady = analysis(0.8, 0.75, 0.65);
        for i in 1..=60 {
            controller.adapt(&steady, &idle(), i * 1_000_000);
        }
        let threshold = controller.settings().lighting_threshold;
        assert!(threshold <= 0.8 + 1e-6, "threshold stuck at {threshold}");
    }

    #[test]
    fn test_loosening_reachable_near_range_max() {
        let config = AdaptationConfig::default();
        // Headroom 0.05 halves to a 0.025 margin
        assert_relative_eq!(
            config.overperform_margin_at(SettingField::Lighting, 0.95),
            0.025,
            epsilon = 1e-6
        );
        assert_relative_eq!(config.overperform_margin_at(SettingField::Lighting, 0.5), 0.2);

        let mut controller = AdaptiveQualityController::new(config);
        controller.force_quality_update(
            QualitySettings {
                lighting_threshold: 0.95,
                ..Default::default()
            },
            0,
        );
        for i in 1..=6 {
            controller.adapt(&analysis(0.98, 0.75, 0.65), &idle(), i * 1_000_000);
        }
        assert!(controller.settings().lighting_threshold < 0.95);
    }

    #[test]
    fn test_interval_gate() {
        let mut controller = AdaptiveQualityController::new(AdaptationConfig::default());
        let busy = ResourceMetrics {
            cpu_usage: 0.9,
            ..Default::default()
        };
        let ok = analysis(0.7, 0.75, 0.65);
        assert!(controller.adapt(&ok, &busy, 0).is_some());
        let calm = idle();
        // Tier would go back to High but only 100 ms have passed
        assert!(controller.adapt(&ok, &calm, 100_000).is_none());
        let event = controller.adapt(&ok, &calm, 600_000).unwrap();
        assert_eq!(event.new.processing_tier, ProcessingTier::High);
        assert_eq!(event.reason, AdaptationReason::PerformanceOptimization);
    }

    #[test]
    fn test_overperformance_loosens_after_streak() {
        let mut controller = AdaptiveQualityController::new(AdaptationConfig::default());
        let bright = analysis(0.95, 0.75, 0.65);
        for i in 0..5 {
            assert!(controller.adapt(&bright, &idle(), i * 1_000_000).is_none());
        }
        // Second loosening step on the sixth analysis clears the deadband
        let event = controller.adapt(&bright, &idle(), 5_000_000).unwrap();
        assert_eq!(event.reason, AdaptationReason::QualityImprovement);
        assert_relative_eq!(
            controller.settings().lighting_threshold,
            0.6 * 0.92 * 0.92,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_tier_bands() {
        let config = AdaptationConfig::default();
        let load = |cpu, mem| ResourceMetrics {
            cpu_usage: cpu,
            memory_usage_mb: mem,
            ..Default::default()
        };
        assert_eq!(config.tier_for(&load(0.85, 50.0)), Some(ProcessingTier::Medium));
        assert_eq!(config.tier_for(&load(0.2, 160.0)), Some(ProcessingTier::Medium));
        assert_eq!(config.tier_for(&load(0.2, 50.0)), Some(ProcessingTier::High));
        assert_eq!(config.tier_for(&load(0.6, 50.0)), None);
    }

    #[test]
    fn test_thermal_override_bypasses_gates_and_restores() {
        let mut controller = AdaptiveQualityController::new(AdaptationConfig::default());
        let ok = analysis(0.7, 0.75, 0.65);
        let hot = ResourceMetrics {
            thermal_state: ThermalState::Critical,
            ..Default::default()
        };
        controller.force_quality_update(
            QualitySettings {
                lighting_threshold: 0.8,
                ..Default::default()
            },
            0,
        );
        let throttled = controller.adapt(&ok, &hot, 1).unwrap();
        assert_eq!(throttled.reason, AdaptationReason::ThermalMitigation);
        assert_eq!(controller.settings(), controller.config().thermal_safe());
        assert!(controller.is_throttled());

        // Holding hot does nothing more
        assert!(controller.adapt(&ok, &hot, 2).is_none());

        let restored = controller.adapt(&ok, &idle(), 3).unwrap();
        assert_eq!(restored.reason, AdaptationReason::ThermalMitigation);
        assert_eq!(controller.settings().lighting_threshold, 0.8);
        assert!(!controller.is_throttled());
    }

    #[test]
    fn test_forced_update_is_idempotent() {
        let mut controller = AdaptiveQualityController::new(AdaptationConfig::default());
        let target = QualitySettings {
            motion_threshold: 0.9,
            ..Default::default()
        };
        assert!(controller.force_quality_update(target, 0).is_some());
        assert!(controller.force_quality_update(target, 1).is_none());
        assert_eq!(controller.events().len(), 1);
    }

    #[test]
    fn test_relax_reaches_floor() {
        let mut controller = AdaptiveQualityController::new(AdaptationConfig::default());
        let mut applied = 0;
        for i in 0..30 {
            if controller.relax(SettingField::Lighting, i).is_some() {
                applied += 1;
            }
        }
        assert!(applied > 0);
        assert_eq!(controller.settings().lighting_threshold, 0.3);
        assert!(controller.relax(SettingField::Lighting, 31).is_none());
        let last = controller.events().last().copied().unwrap();
        assert_eq!(last.reason, AdaptationReason::ErrorRecovery);
    }

    #[test]
    fn test_audit_trail_is_bounded() {
        let config = AdaptationConfig {
            event_capacity: 4,
            ..Default::default()
        };
        let mut controller = AdaptiveQualityController::new(config);
        for i in 0..10 {
            controller.relax(SettingField::Motion, i);
        }
        assert_eq!(controller.events().len(), 4);
    }

    #[test]
    fn test_settings_changed_published() {
        let mut controller = AdaptiveQualityController::new(AdaptationConfig::default());
        let rx = controller.publisher().subscribe();
        controller.relax(SettingField::FeatureQuality, 0);
        assert!(matches!(rx.try_recv(), Ok(ScanEvent::SettingsChanged(_))));
    }
}
