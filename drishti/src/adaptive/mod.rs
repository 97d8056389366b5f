//! Adaptive quality control.
//!
//! Maps quality analyses and resource samples onto [`QualitySettings`]
//! with deadband/interval gating and a thermal override.

mod controller;
mod settings;

pub use controller::{
    AdaptationConfig, AdaptationEvent, AdaptationReason, AdaptiveQualityController, UpdateMode,
};
pub use settings::{ProcessingTier, QualitySettings, SettingField, ThresholdRange};
