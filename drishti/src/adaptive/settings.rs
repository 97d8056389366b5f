//! Tunable capture settings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing effort, ordered from cheapest to richest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingTier {
    Low,
    Medium,
    #[default]
    High,
}

impl fmt::Display for ProcessingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingTier::Low => "low",
            ProcessingTier::Medium => "medium",
            ProcessingTier::High => "high",
        };
        f.write_str(s)
    }
}

/// Threshold addressed by a single-field adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingField {
    Lighting,
    Motion,
    FeatureQuality,
}

impl SettingField {
    pub const ALL: [SettingField; 3] = [
        SettingField::Lighting,
        SettingField::Motion,
        SettingField::FeatureQuality,
    ];
}

/// Closed interval a threshold is clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRange {
    pub min: f32,
    pub max: f32,
}

impl ThresholdRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualitySettings {
    pub lighting_threshold: f32,
    pub motion_threshold: f32,
    pub feature_quality_threshold: f32,
    pub processing_tier: ProcessingTier,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            lighting_threshold: 0.6,
            motion_threshold: 0.7,
            feature_quality_threshold: 0.6,
            processing_tier: ProcessingTier::High,
        }
    }
}

impl QualitySettings {
    /// Most conservative settings: cheapest tier, loosest thresholds.
    pub fn thermal_safe(
        lighting: ThresholdRange,
        motion: ThresholdRange,
        feature: ThresholdRange,
    ) -> Self {
        Self {
            lighting_threshold: lighting.min,
            motion_threshold: motion.min,
            feature_quality_threshold: feature.min,
            processing_tier: ProcessingTier::Low,
        }
    }

    pub fn get(&self, field: SettingField) -> f32 {
        match field {
            SettingField::Lighting => self.lighting_threshold,
            SettingField::Motion => self.motion_threshold,
            SettingField::FeatureQuality => self.feature_quality_threshold,
        }
    }

    pub fn set(&mut self, field: SettingField, value: f32) {
        match field {
            SettingField::Lighting => self.lighting_threshold = value,
            SettingField::Motion => self.motion_threshold = value,
            SettingField::FeatureQuality => self.feature_quality_threshold = value,
        }
    }

    /// Largest relative change of any threshold from `self` to `other`.
    pub fn max_relative_change(&self, other: &QualitySettings) -> f32 {
        SettingField::ALL
            .iter()
            .map(|f| {
                let old = self.get(*f);
                let new = other.get(*f);
                if old.abs() <= f32::EPSILON {
                    if new.abs() <= f32::EPSILON { 0.0 } else { f32::INFINITY }
                } else {
                    ((new - old) / old).abs()
                }
            })
            .fold(0.0, f32::max)
    }
}

impl fmt::Display for QualitySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lighting={:.3} motion={:.3} feature={:.3} tier={}",
            self.lighting_threshold,
            self.motion_threshold,
            self.feature_quality_threshold,
            self.processing_tier
        )
    }
}
