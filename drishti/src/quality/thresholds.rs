//! Acceptance thresholds and the regional threshold table.
//!
//! Threshold values differ per deployment region, so they are injected
//! through [`ThresholdProvider`] instead of living in the scoring code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::types::QualityMetrics;
use crate::error::{Result, ScanError};

/// Minimum/maximum values a frame must meet to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub min_lighting: f32,
    pub min_motion: f32,
    pub min_point_density: f32,
    pub max_noise_level: f32,
    pub min_surface_completeness: f32,
    pub min_feature_preservation: f32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_lighting: 0.4,
            min_motion: 0.5,
            min_point_density: 0.5,
            max_noise_level: 0.5,
            min_surface_completeness: 0.6,
            min_feature_preservation: 0.3,
        }
    }
}

/// Metric named in a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Lighting,
    Motion,
    PointDensity,
    NoiseLevel,
    SurfaceCompleteness,
    FeaturePreservation,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricKind::Lighting => "lighting",
            MetricKind::Motion => "motion",
            MetricKind::PointDensity => "point_density",
            MetricKind::NoiseLevel => "noise_level",
            MetricKind::SurfaceCompleteness => "surface_completeness",
            MetricKind::FeaturePreservation => "feature_preservation",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityFailure {
    pub metric: MetricKind,
    pub value: f32,
    pub threshold: f32,
}

impl fmt::Display for QualityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.2} (threshold {:.2})",
            self.metric, self.value, self.threshold
        )
    }
}

/// Outcome of an acceptability check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub failures: Vec<QualityFailure>,
}

impl QualityVerdict {
    #[inline]
    pub fn is_acceptable(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn fails(&self, metric: MetricKind) -> bool {
        self.failures.iter().any(|f| f.metric == metric)
    }

    /// One-line summary for logs and error messages.
    pub fn summary(&self) -> String {
        if self.failures.is_empty() {
            return "acceptable".to_string();
        }
        self.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl QualityThresholds {
    /// Check every scalar the snapshot carries. Absent depth-derived scores
    /// are skipped.
    pub fn evaluate(&self, metrics: &QualityMetrics) -> QualityVerdict {
        let mut failures = Vec::new();
        let mut min_check = |metric, value: f32, threshold: f32| {
            if value < threshold {
                failures.push(QualityFailure {
                    metric,
                    value,
                    threshold,
                });
            }
        };

        min_check(MetricKind::Lighting, metrics.lighting_score, self.min_lighting);
        min_check(MetricKind::Motion, metrics.motion_score, self.min_motion);
        min_check(
            MetricKind::FeaturePreservation,
            metrics.feature_preservation,
            self.min_feature_preservation,
        );
        if let Some(density) = metrics.point_density {
            min_check(MetricKind::PointDensity, density, self.min_point_density);
        }
        if let Some(completeness) = metrics.surface_completeness {
            min_check(
                MetricKind::SurfaceCompleteness,
                completeness,
                self.min_surface_completeness,
            );
        }
        if let Some(noise) = metrics.noise_level
            && noise > self.max_noise_level
        {
            failures.push(QualityFailure {
                metric: MetricKind::NoiseLevel,
                value: noise,
                threshold: self.max_noise_level,
            });
        }

        QualityVerdict { failures }
    }

    #[inline]
    pub fn is_acceptable(&self, metrics: &QualityMetrics) -> bool {
        self.evaluate(metrics).is_acceptable()
    }

    /// Raise the lighting, motion and feature minimums to the given adaptive
    /// values where those are stricter.
    pub fn tightened(&self, lighting: f32, motion: f32, feature: f32) -> Self {
        Self {
            min_lighting: self.min_lighting.max(lighting),
            min_motion: self.min_motion.max(motion),
            min_feature_preservation: self.min_feature_preservation.max(feature),
            ..*self
        }
    }
}

/// Source of the active acceptance thresholds.
pub trait ThresholdProvider: Send {
    fn thresholds(&self) -> QualityThresholds;

    /// Region name, for logs and snapshots.
    fn region(&self) -> &str;
}

/// Fixed thresholds, mainly for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticThresholds(pub QualityThresholds);

impl ThresholdProvider for StaticThresholds {
    fn thresholds(&self) -> QualityThresholds {
        self.0
    }

    fn region(&self) -> &str {
        "static"
    }
}

/// Per-region table with one active region.
#[derive(Debug, Clone)]
pub struct RegionalThresholds {
    table: BTreeMap<String, QualityThresholds>,
    active: String,
}

impl RegionalThresholds {
    /// Fails with `ScanError::Config` if `region` is not in the table.
    pub fn new(table: BTreeMap<String, QualityThresholds>, region: &str) -> Result<Self> {
        if !table.contains_key(region) {
            return Err(ScanError::Config(format!(
                "unknown region '{}' (known: {})",
                region,
                table.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(Self {
            table,
            active: region.to_string(),
        })
    }

    pub fn select(&mut self, region: &str) -> Result<()> {
        if !self.table.contains_key(region) {
            return Err(ScanError::Config(format!("unknown region '{region}'")));
        }
        log::info!("Threshold region: {} -> {}", self.active, region);
        self.active = region.to_string();
        Ok(())
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }
}

impl ThresholdProvider for RegionalThresholds {
    fn thresholds(&self) -> QualityThresholds {
        self.table.get(&self.active).copied().unwrap_or_default()
    }

    fn region(&self) -> &str {
        &self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_metrics() -> QualityMetrics {
        QualityMetrics {
            lighting_score: 0.8,
            motion_score: 0.9,
            texture_quality: 0.7,
            feature_preservation: 0.7,
            point_density: Some(0.9),
            noise_level: Some(0.1),
            surface_completeness: Some(0.9),
            depth_confidence: Some(1.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_acceptable_snapshot() {
        let t = QualityThresholds::default();
        assert!(t.is_acceptable(&good_metrics()));
    }

    #[test]
    fn test_each_failure_reported() {
        let t = QualityThresholds::default();
        let metrics = QualityMetrics {
            point_density: Some(0.2),
            noise_level: Some(0.8),
            ..good_metrics()
        };
        let verdict = t.evaluate(&metrics);
        assert!(!verdict.is_acceptable());
        assert!(verdict.fails(MetricKind::PointDensity));
        assert!(verdict.fails(MetricKind::NoiseLevel));
        assert_eq!(verdict.failures.len(), 2);
    }

    #[test]
    fn test_missing_depth_scores_skipped() {
        let t = QualityThresholds::default();
        let metrics = QualityMetrics {
            point_density: None,
            noise_level: None,
            surface_completeness: None,
            ..good_metrics()
        };
        assert!(t.is_acceptable(&metrics));
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let t = QualityThresholds::default();
        let metrics = QualityMetrics {
            lighting_score: t.min_lighting,
            noise_level: Some(t.max_noise_level),
            ..good_metrics()
        };
        assert!(t.is_acceptable(&metrics));
    }

    #[test]
    fn test_tightened_only_raises() {
        let t = QualityThresholds::default().tightened(0.7, 0.1, 0.3);
        assert_eq!(t.min_lighting, 0.7);
        assert_eq!(t.min_motion, 0.5);
        assert_eq!(t.min_feature_preservation, 0.3);
    }

    #[test]
    fn test_regional_table() {
        let mut table = BTreeMap::new();
        table.insert("default".to_string(), QualityThresholds::default());
        table.insert(
            "strict".to_string(),
            QualityThresholds {
                min_point_density: 0.8,
                ..Default::default()
            },
        );
        let mut provider = RegionalThresholds::new(table.clone(), "default").unwrap();
        assert_eq!(provider.thresholds().min_point_density, 0.5);
        provider.select("strict").unwrap();
        assert_eq!(provider.thresholds().min_point_density, 0.8);
        assert_eq!(provider.region(), "strict");
        assert!(provider.select("mars").is_err());
        assert!(RegionalThresholds::new(table, "mars").is_err());
    }
}
