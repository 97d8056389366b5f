//! Device resource samples and capability.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::clock::TimestampUs;

/// Platform thermal state, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThermalState {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalState {
    /// Multiplier applied to device performance.
    pub fn performance_factor(self) -> f32 {
        match self {
            ThermalState::Nominal => 1.0,
            ThermalState::Fair => 0.9,
            ThermalState::Serious => 0.7,
            ThermalState::Critical => 0.4,
        }
    }

    /// Serious or worse: adaptation must throttle.
    #[inline]
    pub fn is_elevated(self) -> bool {
        self >= ThermalState::Serious
    }
}

impl fmt::Display for ThermalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThermalState::Nominal => "nominal",
            ThermalState::Fair => "fair",
            ThermalState::Serious => "serious",
            ThermalState::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// One resource sample published by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    /// CPU utilisation, 0..1.
    pub cpu_usage: f32,
    /// Process memory in MB.
    pub memory_usage_mb: f32,
    /// GPU utilisation, 0..1.
    pub gpu_utilization: f32,
    pub thermal_state: ThermalState,
    /// Frames processed per second since the previous sample.
    pub frame_rate: f32,
    /// Free disk space in MB.
    pub disk_space_mb: f32,
    /// Battery charge, 0..1.
    pub battery_level: f32,
    pub timestamp_us: TimestampUs,
}

impl ResourceMetrics {
    /// Headroom-adjusted performance given the device's raw processing power.
    pub fn device_performance(&self, processing_power: f32) -> f32 {
        let load = self.cpu_usage.max(self.gpu_utilization).clamp(0.0, 1.0);
        (processing_power * self.thermal_state.performance_factor() * (1.0 - 0.5 * load))
            .clamp(0.0, 1.0)
    }
}

impl Default for ResourceMetrics {
    fn default() -> Self {
        Self {
            cpu_usage: 0.0,
            memory_usage_mb: 0.0,
            gpu_utilization: 0.0,
            thermal_state: ThermalState::Nominal,
            frame_rate: 0.0,
            disk_space_mb: f32::MAX,
            battery_level: 1.0,
            timestamp_us: 0,
        }
    }
}

/// One-shot capability query result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapability {
    pub has_lidar: bool,
    /// Normalised processing power, 0..1.
    pub processing_power: f32,
    #[serde(default)]
    pub thermal_state: ThermalState,
}

impl DeviceCapability {
    pub fn new(has_lidar: bool, processing_power: f32) -> Self {
        Self {
            has_lidar,
            processing_power,
            thermal_state: ThermalState::Nominal,
        }
    }

    /// Whether any capture mode can run on this device.
    pub fn is_supported(&self, min_processing_power: f32) -> bool {
        self.processing_power.is_finite() && self.processing_power >= min_processing_power
    }
}

impl Default for DeviceCapability {
    fn default() -> Self {
        Self::new(true, 1.0)
    }
}
