//! Mode scoring, dwell hysteresis and the fallback chain.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::delta::CaptureConfigDelta;
use crate::core::clock::{TimestampUs, ms_to_us};
use crate::core::types::{DeviceCapability, ScanningConditions, ScanningMode};
use crate::error::{Result, ScanError};
use crate::events::{Publisher, ScanEvent};

/// Linear scoring weights over one conditions sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeWeights {
    pub lighting: f32,
    pub motion: f32,
    /// Weight on `1 - surface_complexity`.
    pub simplicity: f32,
    pub complexity: f32,
    pub device_performance: f32,
    /// Constant subtracted from the score.
    pub overhead: f32,
}

impl Default for ModeWeights {
    fn default() -> Self {
        Self {
            lighting: 0.25,
            motion: 0.25,
            simplicity: 0.0,
            complexity: 0.0,
            device_performance: 0.5,
            overhead: 0.0,
        }
    }
}

impl ModeWeights {
    pub fn score(&self, c: &ScanningConditions) -> f32 {
        self.lighting * c.lighting_level
            + self.motion * c.motion_stability
            + self.simplicity * (1.0 - c.surface_complexity)
            + self.complexity * c.surface_complexity
            + self.device_performance * c.device_performance
            - self.overhead
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Minimum time between signal-driven switches.
    /// Default: 5000
    pub min_dwell_ms: u64,

    /// Device performance at or above which hybrid is a candidate.
    /// Default: 0.7
    pub hybrid_performance_floor: f32,

    /// Fallbacks allowed per session.
    /// Default: 3
    pub max_fallback_attempts: u32,

    /// Devices below this processing power are rejected.
    /// Default: 0.2
    pub min_processing_power: f32,

    pub lidar: ModeWeights,
    pub photogrammetry: ModeWeights,
    pub hybrid: ModeWeights,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            min_dwell_ms: 5000,
            hybrid_performance_floor: 0.7,
            max_fallback_attempts: 3,
            min_processing_power: 0.2,
            lidar: ModeWeights {
                lighting: 0.10,
                motion: 0.20,
                simplicity: 0.35,
                complexity: 0.0,
                device_performance: 0.35,
                overhead: 0.0,
            },
            photogrammetry: ModeWeights {
                lighting: 0.45,
                motion: 0.30,
                simplicity: 0.0,
                complexity: 0.15,
                device_performance: 0.10,
                overhead: 0.0,
            },
            hybrid: ModeWeights {
                lighting: 0.30,
                motion: 0.25,
                simplicity: 0.10,
                complexity: 0.0,
                device_performance: 0.35,
                overhead: 0.05,
            },
        }
    }
}

impl ArbitrationConfig {
    pub fn weights(&self, mode: ScanningMode) -> &ModeWeights {
        match mode {
            ScanningMode::Lidar => &self.lidar,
            ScanningMode::Photogrammetry => &self.photogrammetry,
            ScanningMode::Hybrid => &self.hybrid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeChangeReason {
    /// First selection of the session.
    Initial,
    /// Another mode scored higher.
    Conditions,
    /// Repeated quality failure.
    Fallback,
}

impl fmt::Display for ModeChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModeChangeReason::Initial => "initial",
            ModeChangeReason::Conditions => "conditions",
            ModeChangeReason::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeDecision {
    pub previous: Option<ScanningMode>,
    pub mode: ScanningMode,
    pub reason: ModeChangeReason,
    pub delta: CaptureConfigDelta,
    pub timestamp_us: TimestampUs,
}

/// Sole owner of the current capture mode.
#[derive(Debug)]
pub struct ModeArbitrator {
    config: ArbitrationConfig,
    capability: DeviceCapability,
    current: Option<ScanningMode>,
    last_switch_us: Option<TimestampUs>,
    retired: Vec<ScanningMode>,
    fallback_attempts: u32,
    last_conditions: ScanningConditions,
    publisher: Publisher<ScanEvent>,
}

impl ModeArbitrator {
    /// Fails with `DeviceNotSupported` for devices that cannot scan at all.
    pub fn new(config: ArbitrationConfig, capability: DeviceCapability) -> Result<Self> {
        if !capability.is_supported(config.min_processing_power) {
            return Err(ScanError::DeviceNotSupported(format!(
                "processing power {:.2} below minimum {:.2}",
                capability.processing_power, config.min_processing_power
            )));
        }
        log::info!(
            "ModeArbitrator: lidar={}, processing_power={:.2}",
            capability.has_lidar,
            capability.processing_power
        );
        Ok(Self {
            config,
            capability,
            current: None,
            last_switch_us: None,
            retired: Vec::new(),
            fallback_attempts: 0,
            last_conditions: ScanningConditions::default(),
            publisher: Publisher::new(),
        })
    }

    pub fn current(&self) -> Option<ScanningMode> {
        self.current
    }

    pub fn capability(&self) -> DeviceCapability {
        self.capability
    }

    pub fn config(&self) -> &ArbitrationConfig {
        &self.config
    }

    pub fn fallback_attempts(&self) -> u32 {
        self.fallback_attempts
    }

    /// Modes fallen back from in this session.
    pub fn retired(&self) -> &[ScanningMode] {
        &self.retired
    }

    pub fn publisher(&self) -> &Publisher<ScanEvent> {
        &self.publisher
    }

    /// Hardware can run `mode` at all.
    pub fn hardware_supports(&self, mode: ScanningMode) -> bool {
        !mode.requires_lidar() || self.capability.has_lidar
    }

    /// Candidates for this conditions sample, in chain order.
    pub fn eligible_modes(&self, conditions: &ScanningConditions) -> Vec<ScanningMode> {
        ScanningMode::ALL
            .into_iter()
            .filter(|m| self.hardware_supports(*m))
            .filter(|m| !self.retired.contains(m))
            .filter(|m| {
                *m != ScanningMode::Hybrid
                    || conditions.device_performance >= self.config.hybrid_performance_floor
            })
            .collect()
    }

    pub fn score(&self, mode: ScanningMode, conditions: &ScanningConditions) -> f32 {
        self.config.weights(mode).score(conditions)
    }

    /// Highest-scoring eligible mode; ties keep the current mode.
    pub fn best_mode(&self, conditions: &ScanningConditions) -> Option<ScanningMode> {
        let eligible = self.eligible_modes(conditions);
        let mut best = self
            .current
            .filter(|m| eligible.contains(m))
            .map(|m| (m, self.score(m, conditions)));
        for mode in eligible {
            let score = self.score(mode, conditions);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((mode, score)),
            }
        }
        best.map(|(m, _)| m)
    }

    /// Whether a signal-driven switch is allowed at `now_us`.
    pub fn dwell_elapsed(&self, now_us: TimestampUs) -> bool {
        match (self.current, self.last_switch_us) {
            (Some(_), Some(last)) => {
                now_us.saturating_sub(last) >= ms_to_us(self.config.min_dwell_ms)
            }
            _ => true,
        }
    }

    /// Re-evaluate the mode. Returns the decision when a switch happened.
    pub fn evaluate(
        &mut self,
        conditions: &ScanningConditions,
        now_us: TimestampUs,
    ) -> Result<Option<ModeDecision>> {
        self.last_conditions = *conditions;
        if !self.dwell_elapsed(now_us) {
            return Ok(None);
        }
        let Some(best) = self.best_mode(conditions) else {
            return match self.current {
                Some(_) => Ok(None),
                None => Err(ScanError::DeviceNotSupported(
                    "no capture mode is eligible".to_string(),
                )),
            };
        };
        if Some(best) == self.current {
            return Ok(None);
        }
        let reason = if self.current.is_none() {
            ModeChangeReason::Initial
        } else {
            ModeChangeReason::Conditions
        };
        Ok(Some(self.switch_to(best, reason, now_us)))
    }

    /// Advance along the fallback chain after repeated quality failure.
    ///
    /// The mode being left is retired for the rest of the session.
    pub fn fallback(&mut self, now_us: TimestampUs) -> Result<ModeDecision> {
        let current = self
            .current
            .ok_or_else(|| ScanError::Unrecoverable("fallback before mode selection".into()))?;

        if self.fallback_attempts >= self.config.max_fallback_attempts {
            return Err(ScanError::QualityBelowThreshold(format!(
                "{} fallback attempts exhausted in {} mode",
                self.fallback_attempts, current
            )));
        }

        let next = ScanningMode::FALLBACK_CHAIN
            .into_iter()
            .skip(current.chain_position() + 1)
            .find(|m| self.hardware_supports(*m) && !self.retired.contains(m))
            .ok_or(ScanError::NoFallbackAvailable(current))?;

        self.fallback_attempts += 1;
        self.retired.push(current);
        log::warn!(
            "ModeArbitrator: fallback {} -> {} (attempt {}/{})",
            current,
            next,
            self.fallback_attempts,
            self.config.max_fallback_attempts
        );
        Ok(self.switch_to(next, ModeChangeReason::Fallback, now_us))
    }

    /// Sustained acceptable quality earns back the fallback budget.
    pub fn reset_fallback_attempts(&mut self) {
        if self.fallback_attempts > 0 {
            log::info!(
                "ModeArbitrator: fallback counter reset ({} -> 0)",
                self.fallback_attempts
            );
            self.fallback_attempts = 0;
        }
    }

    fn switch_to(
        &mut self,
        mode: ScanningMode,
        reason: ModeChangeReason,
        now_us: TimestampUs,
    ) -> ModeDecision {
        let decision = ModeDecision {
            previous: self.current,
            mode,
            reason,
            delta: CaptureConfigDelta::for_mode(mode, &self.last_conditions),
            timestamp_us: now_us,
        };
        if reason != ModeChangeReason::Fallback {
            log::info!(
                "ModeArbitrator: {} -> {} ({})",
                self.current.map_or("none".to_string(), |m| m.to_string()),
                mode,
                reason
            );
        }
        self.current = Some(mode);
        self.last_switch_us = Some(now_us);
        self.publisher.publish(ScanEvent::ModeChanged {
            from: decision.previous,
            to: mode,
            reason,
            delta: decision.delta,
            timestamp_us: now_us,
        });
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbitrator(has_lidar: bool) -> ModeArbitrator {
        ModeArbitrator::new(
            ArbitrationConfig::default(),
            DeviceCapability::new(has_lidar, 1.0),
        )
        .unwrap()
    }

    #[test]
    fn test_good_conditions_select_lidar() {
        let mut arb = arbitrator(true);
        let c = ScanningConditions::new(0.9, 0.9, 0.1, 0.9);
        let decision = arb.evaluate(&c, 0).unwrap().unwrap();
        assert_eq!(decision.mode, ScanningMode::Lidar);
        assert_eq!(decision.reason, ModeChangeReason::Initial);
        assert!(decision.delta.reconstruction_enabled);
    }

    #[test]
    fn test_no_lidar_selects_photogrammetry() {
        let mut arb = arbitrator(false);
        let c = ScanningConditions::new(0.2, 0.4, 0.8, 0.5);
        assert_eq!(
            arb.eligible_modes(&c),
            vec![ScanningMode::Photogrammetry]
        );
        let decision = arb.evaluate(&c, 0).unwrap().unwrap();
        assert_eq!(decision.mode, ScanningMode::Photogrammetry);
    }

    #[test]
    fn test_hybrid_floor_is_inclusive() {
        let arb = arbitrator(true);
        let at_floor = ScanningConditions::new(0.5, 0.5, 0.5, 0.7);
        assert!(arb.eligible_modes(&at_floor).contains(&ScanningMode::Hybrid));
        let below = ScanningConditions::new(0.5, 0.5, 0.5, 0.69);
        assert!(!arb.eligible_modes(&below).contains(&ScanningMode::Hybrid));
    }

    #[test]
    fn test_dwell_blocks_second_switch() {
        let mut arb = arbitrator(true);
        let lidar_friendly = ScanningConditions::new(0.3, 0.9, 0.0, 1.0);
        let photo_friendly = ScanningConditions::new(1.0, 1.0, 1.0, 0.2);
        arb.evaluate(&lidar_friendly, 0).unwrap();
        arb.evaluate(&photo_friendly, 1_000_000).unwrap();
        assert_eq!(arb.current(), Some(ScanningMode::Lidar));
        let decision = arb.evaluate(&photo_friendly, 5_000_000).unwrap().unwrap();
        assert_eq!(decision.mode, ScanningMode::Photogrammetry);
        assert_eq!(decision.reason, ModeChangeReason::Conditions);
    }

    #[test]
    fn test_tie_prefers_current() {
        let config = ArbitrationConfig {
            lidar: ModeWeights::default(),
            photogrammetry: ModeWeights::default(),
            ..Default::default()
        };
        let mut arb = ModeArbitrator::new(config, DeviceCapability::new(true, 1.0)).unwrap();
        let c = ScanningConditions::new(0.5, 0.5, 0.5, 0.5);
        arb.evaluate(&c, 0).unwrap();
        assert_eq!(arb.current(), Some(ScanningMode::Lidar));
        assert!(arb.evaluate(&c, 10_000_000).unwrap().is_none());
    }

    #[test]
    fn test_fallback_chain_then_exhausted() {
        let mut arb = arbitrator(true);
        arb.evaluate(&ScanningConditions::new(0.9, 0.9, 0.1, 0.9), 0)
            .unwrap();
        assert_eq!(arb.fallback(1).unwrap().mode, ScanningMode::Photogrammetry);
        assert_eq!(arb.fallback(2).unwrap().mode, ScanningMode::Hybrid);
        assert!(matches!(
            arb.fallback(3),
            Err(ScanError::NoFallbackAvailable(ScanningMode::Hybrid))
        ));
        assert_eq!(arb.retired(), &[ScanningMode::Lidar, ScanningMode::Photogrammetry]);
    }

    #[test]
    fn test_retired_mode_never_rescored() {
        let mut arb = arbitrator(true);
        let c = ScanningConditions::new(0.9, 0.9, 0.1, 0.9);
        arb.evaluate(&c, 0).unwrap();
        arb.fallback(1).unwrap();
        // Lidar would win on score but stays retired
        let decision = arb.evaluate(&c, 60_000_000).unwrap();
        assert_eq!(decision.map(|d| d.mode), Some(ScanningMode::Hybrid));
        assert!(!arb.eligible_modes(&c).contains(&ScanningMode::Lidar));
    }

    #[test]
    fn test_fallback_without_lidar_is_exhausted() {
        let mut arb = arbitrator(false);
        arb.evaluate(&ScanningConditions::default(), 0).unwrap();
        assert!(matches!(
            arb.fallback(1),
            Err(ScanError::NoFallbackAvailable(ScanningMode::Photogrammetry))
        ));
    }

    #[test]
    fn test_attempt_cap() {
        let config = ArbitrationConfig {
            max_fallback_attempts: 1,
            ..Default::default()
        };
        let mut arb = ModeArbitrator::new(config, DeviceCapability::new(true, 1.0)).unwrap();
        arb.evaluate(&ScanningConditions::new(0.9, 0.9, 0.1, 0.9), 0)
            .unwrap();
        arb.fallback(1).unwrap();
        assert!(matches!(
            arb.fallback(2),
            Err(ScanError::QualityBelowThreshold(_))
        ));
        arb.reset_fallback_attempts();
        assert_eq!(arb.fallback(3).unwrap().mode, ScanningMode::Hybrid);
    }

    #[test]
    fn test_unsupported_device() {
        let result = ModeArbitrator::new(
            ArbitrationConfig::default(),
            DeviceCapability::new(true, 0.05),
        );
        assert!(matches!(result, Err(ScanError::DeviceNotSupported(_))));
    }

    #[test]
    fn test_mode_change_published() {
        let mut arb = arbitrator(true);
        let rx = arb.publisher().subscribe();
        arb.evaluate(&ScanningConditions::new(0.9, 0.9, 0.1, 0.9), 0)
            .unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(ScanEvent::ModeChanged {
                from: None,
                to: ScanningMode::Lidar,
                ..
            })
        ));
    }
}
