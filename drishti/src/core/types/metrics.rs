//! Per-frame quality snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::clock::TimestampUs;

/// Signals the extractors can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Lighting,
    Motion,
    TextureQuality,
    SurfaceComplexity,
    PointDensity,
    DepthConfidence,
    NoiseLevel,
    SurfaceCompleteness,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalKind::Lighting => "lighting",
            SignalKind::Motion => "motion",
            SignalKind::TextureQuality => "texture_quality",
            SignalKind::SurfaceComplexity => "surface_complexity",
            SignalKind::PointDensity => "point_density",
            SignalKind::DepthConfidence => "depth_confidence",
            SignalKind::NoiseLevel => "noise_level",
            SignalKind::SurfaceCompleteness => "surface_completeness",
        };
        f.write_str(s)
    }
}

/// Sensor calibration as reported by platform tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    #[default]
    Calibrated,
    Limited,
    Uncalibrated,
}

/// Immutable quality snapshot for one evaluated frame.
///
/// Image-derived scores are always present. Depth-derived scores are `None`
/// when the frame carried no depth buffer; acceptability skips them.
/// All scores are in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub timestamp_us: TimestampUs,
    pub lighting_score: f32,
    /// Higher = more stable.
    pub motion_score: f32,
    pub texture_quality: f32,
    pub feature_preservation: f32,
    /// Fraction of valid depth samples.
    pub point_density: Option<f32>,
    /// Normalised local depth noise; lower is better.
    pub noise_level: Option<f32>,
    pub surface_completeness: Option<f32>,
    pub depth_confidence: Option<f32>,
    pub calibration: CalibrationStatus,
}

impl QualityMetrics {
    /// Depth accuracy, the complement of the noise level.
    #[inline]
    pub fn accuracy(&self) -> Option<f32> {
        self.noise_level.map(|n| 1.0 - n)
    }

    /// Whether any depth-derived score is present.
    pub fn has_depth(&self) -> bool {
        self.point_density.is_some()
    }
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            timestamp_us: 0,
            lighting_score: 0.0,
            motion_score: 0.0,
            texture_quality: 0.0,
            feature_preservation: 0.0,
            point_density: None,
            noise_level: None,
            surface_completeness: None,
            depth_confidence: None,
            calibration: CalibrationStatus::Calibrated,
        }
    }
}
