//! Configuration loading for Drishti
//!
//! ```toml
//! region = "default"
//!
//! [device]
//! has_lidar = true
//! processing_power = 0.9
//!
//! [arbitration]
//! min_dwell_ms = 5000
//!
//! [regions.default]
//! min_lighting = 0.4
//! ```
//!
//! Every section is optional; missing fields take their defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::adaptive::AdaptationConfig;
use crate::arbitration::ArbitrationConfig;
use crate::core::types::DeviceCapability;
use crate::error::{Result, ScanError};
use crate::quality::{AggregatorConfig, QualityThresholds, RegionalThresholds};
use crate::resources::ResourceConfig;
use crate::session::SessionConfig;
use crate::signals::SignalConfig;

/// Main configuration structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrishtiConfig {
    /// Capability of the device the session runs on
    #[serde(default = "default_device")]
    pub device: DeviceCapability,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub signals: SignalConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub resources: ResourceConfig,

    /// `max_fallback_attempts` here also caps state-machine recovery attempts
    #[serde(default)]
    pub arbitration: ArbitrationConfig,

    #[serde(default)]
    pub adaptation: AdaptationConfig,

    /// Active deployment region (default: "default")
    #[serde(default = "default_region")]
    pub region: String,

    /// Acceptance thresholds per deployment region
    #[serde(default = "default_regions")]
    pub regions: BTreeMap<String, QualityThresholds>,
}

// Default value functions

fn default_device() -> DeviceCapability {
    DeviceCapability::default()
}

fn default_region() -> String {
    "default".to_string()
}

fn default_regions() -> BTreeMap<String, QualityThresholds> {
    let mut regions = BTreeMap::new();
    regions.insert("default".to_string(), QualityThresholds::default());
    regions.insert(
        "strict".to_string(),
        QualityThresholds {
            min_lighting: 0.5,
            min_point_density: 0.6,
            max_noise_level: 0.4,
            min_surface_completeness: 0.7,
            ..QualityThresholds::default()
        },
    );
    regions
}

impl Default for DrishtiConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            session: SessionConfig::default(),
            signals: SignalConfig::default(),
            aggregator: AggregatorConfig::default(),
            resources: ResourceConfig::default(),
            arbitration: ArbitrationConfig::default(),
            adaptation: AdaptationConfig::default(),
            region: default_region(),
            regions: default_regions(),
        }
    }
}

impl DrishtiConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("Failed to read config file: {}", e)))?;
        let config: DrishtiConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.regions.contains_key(&self.region) {
            return Err(ScanError::Config(format!(
                "region '{}' has no threshold table",
                self.region
            )));
        }
        let capacities = [
            ("aggregator.window_size", self.aggregator.window_size),
            ("aggregator.trend_window", self.aggregator.trend_window),
            ("aggregator.conditions_window", self.aggregator.conditions_window),
            (
                "session.state_machine.history_capacity",
                self.session.state_machine.history_capacity,
            ),
            (
                "session.state_machine.recovery_point_capacity",
                self.session.state_machine.recovery_point_capacity,
            ),
            ("adaptation.event_capacity", self.adaptation.event_capacity),
            ("adaptation.ceiling_window", self.adaptation.ceiling_window),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, value)| *value == 0) {
            return Err(ScanError::Config(format!("{name} must be at least 1")));
        }
        if self.arbitration.max_fallback_attempts == 0 {
            return Err(ScanError::Config(
                "arbitration.max_fallback_attempts must be at least 1".to_string(),
            ));
        }
        let ranges = [
            ("adaptation.lighting_range", self.adaptation.lighting_range),
            ("adaptation.motion_range", self.adaptation.motion_range),
            ("adaptation.feature_range", self.adaptation.feature_range),
        ];
        if let Some((name, range)) = ranges.iter().find(|(_, r)| !r.is_valid()) {
            return Err(ScanError::Config(format!(
                "{name} is inverted or non-finite ({} > {})",
                range.min, range.max
            )));
        }
        if !(self.resources.warning_ratio > 0.0 && self.resources.warning_ratio <= 1.0) {
            return Err(ScanError::Config(format!(
                "resources.warning_ratio must be in (0, 1], got {}",
                self.resources.warning_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.session.motion_pause_threshold) {
            return Err(ScanError::Config(format!(
                "session.motion_pause_threshold must be in [0, 1], got {}",
                self.session.motion_pause_threshold
            )));
        }
        Ok(())
    }

    /// Threshold provider for the configured region
    pub fn threshold_provider(&self) -> Result<RegionalThresholds> {
        RegionalThresholds::new(self.regions.clone(), &self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::ThresholdRange;
    use crate::quality::ThresholdProvider;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_validate() {
        let config = DrishtiConfig::default();
        config.validate().unwrap();
        assert_eq!(config.threshold_provider().unwrap().region(), "default");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drishti.toml");
        std::fs::write(
            &path,
            r#"
region = "strict"

[device]
has_lidar = false
processing_power = 0.6

[arbitration]
min_dwell_ms = 2000
"#,
        )
        .unwrap();

        let config = DrishtiConfig::load(&path).unwrap();
        assert!(!config.device.has_lidar);
        assert_eq!(config.arbitration.min_dwell_ms, 2000);
        assert_eq!(config.arbitration.max_fallback_attempts, 3);
        assert_eq!(config.aggregator.window_size, 30);
        let provider = config.threshold_provider().unwrap();
        assert_relative_eq!(provider.thresholds().min_lighting, 0.5);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.toml");
        let mut config = DrishtiConfig::default();
        config.session.session_id = "kitchen".to_string();
        config.adaptation.min_interval_ms = 250;
        config.to_file(&path).unwrap();

        let back = DrishtiConfig::load(&path).unwrap();
        assert_eq!(back.session.session_id, "kitchen");
        assert_eq!(back.adaptation.min_interval_ms, 250);
        assert_eq!(back.regions.len(), 2);
    }

    #[test]
    fn test_unknown_region_rejected() {
        let config = DrishtiConfig {
            region: "atlantis".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ScanError::Config(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = DrishtiConfig::default();
        config.aggregator.window_size = 0;
        assert!(config.validate().is_err());

        let mut config = DrishtiConfig::default();
        config.adaptation.lighting_range = ThresholdRange::new(0.9, 0.2);
        assert!(config.validate().is_err());

        let mut config = DrishtiConfig::default();
        config.resources.warning_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = DrishtiConfig::default();
        config.adaptation.ceiling_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shipped_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("drishti.toml");
        let config = DrishtiConfig::load(&path).unwrap();
        assert_eq!(config.region, "default");
        assert_eq!(config.arbitration.min_dwell_ms, 5000);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = DrishtiConfig::load(Path::new("/nonexistent/drishti.toml")).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }
}
