//! Environmental / device conditions consumed by mode arbitration.

use serde::{Deserialize, Serialize};

use crate::core::clock::TimestampUs;

/// One conditions sample. All fields in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanningConditions {
    pub lighting_level: f32,
    pub motion_stability: f32,
    pub surface_complexity: f32,
    pub device_performance: f32,
    pub battery_level: f32,
    pub timestamp_us: TimestampUs,
}

impl ScanningConditions {
    pub fn new(
        lighting_level: f32,
        motion_stability: f32,
        surface_complexity: f32,
        device_performance: f32,
    ) -> Self {
        Self {
            lighting_level,
            motion_stability,
            surface_complexity,
            device_performance,
            battery_level: 1.0,
            timestamp_us: 0,
        }
    }

    pub fn at(mut self, timestamp_us: TimestampUs) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }
}

impl Default for ScanningConditions {
    fn default() -> Self {
        Self::new(0.5, 1.0, 0.0, 1.0)
    }
}
