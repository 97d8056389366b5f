//! Threshold tiers and rising-edge alerting.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::clock::TimestampUs;
use crate::core::types::{ResourceMetrics, ThermalState};
use crate::events::{Publisher, ScanEvent};

/// Critical levels; warning fires at `warning_ratio` of critical.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Sampling period in milliseconds.
    /// Default: 1000
    pub sample_period_ms: u64,

    /// Default: 0.95
    pub cpu_critical: f32,

    /// Default: 0.95
    pub gpu_critical: f32,

    /// Process memory in MB.
    /// Default: 300.0
    pub memory_critical_mb: f32,

    /// Free disk in MB (lower is worse).
    /// Default: 500.0
    pub disk_critical_mb: f32,

    /// Battery charge (lower is worse).
    /// Default: 0.10
    pub battery_critical: f32,

    /// Warning tier as a fraction of critical.
    /// Default: 0.8
    pub warning_ratio: f32,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: 1000,
            cpu_critical: 0.95,
            gpu_critical: 0.95,
            memory_critical_mb: 300.0,
            disk_critical_mb: 500.0,
            battery_critical: 0.10,
            warning_ratio: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Cpu,
    Memory,
    Gpu,
    Thermal,
    Disk,
    Battery,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Resource::Cpu,
        Resource::Memory,
        Resource::Gpu,
        Resource::Thermal,
        Resource::Disk,
        Resource::Battery,
    ];

    fn index(self) -> usize {
        match self {
            Resource::Cpu => 0,
            Resource::Memory => 1,
            Resource::Gpu => 2,
            Resource::Thermal => 3,
            Resource::Disk => 4,
            Resource::Battery => 5,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::Cpu => "cpu",
            Resource::Memory => "memory",
            Resource::Gpu => "gpu",
            Resource::Thermal => "thermal",
            Resource::Disk => "disk",
            Resource::Battery => "battery",
        };
        f.write_str(s)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    #[default]
    Normal,
    Warning,
    Critical,
}

/// Downstream work a critical condition demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceAction {
    Cooldown,
    MemoryCleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceAlert {
    pub resource: Resource,
    pub level: AlertLevel,
    pub value: f32,
    /// Threshold of the tier that was crossed.
    pub threshold: f32,
    pub timestamp_us: TimestampUs,
}

/// Result of one monitor tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceReport {
    pub metrics: ResourceMetrics,
    /// Rising edges only.
    pub alerts: Vec<ResourceAlert>,
    pub cleared: Vec<Resource>,
    pub actions: Vec<ResourceAction>,
    /// Resources at critical after this tick, edge or not.
    pub critical: Vec<Resource>,
}

impl ResourceReport {
    /// No edge or action in this tick.
    pub fn is_quiet(&self) -> bool {
        self.alerts.is_empty() && self.cleared.is_empty() && self.actions.is_empty()
    }
}

/// Edge-triggered resource alerting.
#[derive(Debug)]
pub struct ResourceMonitor {
    config: ResourceConfig,
    levels: [AlertLevel; 6],
    latest: Option<ResourceMetrics>,
    publisher: Publisher<ScanEvent>,
}

impl ResourceMonitor {
    pub fn new(config: ResourceConfig) -> Self {
        Self {
            config,
            levels: [AlertLevel::Normal; 6],
            latest: None,
            publisher: Publisher::new(),
        }
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn publisher(&self) -> &Publisher<ScanEvent> {
        &self.publisher
    }

    pub fn latest(&self) -> Option<ResourceMetrics> {
        self.latest
    }

    pub fn level(&self, resource: Resource) -> AlertLevel {
        self.levels[resource.index()]
    }

    /// Any resource at warning or above.
    pub fn under_pressure(&self) -> bool {
        self.levels.iter().any(|l| *l >= AlertLevel::Warning)
    }

    /// Classify a sample and report the edges it produced.
    pub fn evaluate(&mut self, metrics: ResourceMetrics) -> ResourceReport {
        let mut report = ResourceReport {
            metrics,
            ..Default::default()
        };

        for resource in Resource::ALL {
            let (level, value, threshold) = self.classify(resource, &metrics);
            let previous = std::mem::replace(&mut self.levels[resource.index()], level);

            if level > previous {
                let alert = ResourceAlert {
                    resource,
                    level,
                    value,
                    threshold,
                    timestamp_us: metrics.timestamp_us,
                };
                log::warn!(
                    "Resource {}: {:?} -> {:?} ({:.2}, threshold {:.2})",
                    resource,
                    previous,
                    level,
                    value,
                    threshold
                );
                report.alerts.push(alert);

                if level == AlertLevel::Critical {
                    match resource {
                        Resource::Thermal => report.actions.push(ResourceAction::Cooldown),
                        Resource::Memory => report.actions.push(ResourceAction::MemoryCleanup),
                        _ => {}
                    }
                }
            } else if level == AlertLevel::Normal && previous != AlertLevel::Normal {
                log::info!("Resource {}: cleared", resource);
                report.cleared.push(resource);
            } else if level < previous {
                log::debug!("Resource {}: {:?} -> {:?}", resource, previous, level);
            }
        }

        report.critical = Resource::ALL
            .into_iter()
            .filter(|r| self.level(*r) == AlertLevel::Critical)
            .collect();
        self.latest = Some(metrics);
        self.publish(&report);
        report
    }

    fn publish(&self, report: &ResourceReport) {
        let ts = report.metrics.timestamp_us;
        for alert in &report.alerts {
            let event = match alert.level {
                AlertLevel::Critical => ScanEvent::ResourceCritical(*alert),
                _ => ScanEvent::ResourceWarning(*alert),
            };
            self.publisher.publish(event);
        }
        for resource in &report.cleared {
            self.publisher.publish(ScanEvent::ResourceCleared {
                resource: *resource,
                timestamp_us: ts,
            });
        }
        for action in &report.actions {
            self.publisher.publish(ScanEvent::ResourceActionRequested {
                action: *action,
                timestamp_us: ts,
            });
        }
    }

    /// Returns (level, observed value, threshold of the reported tier).
    fn classify(&self, resource: Resource, m: &ResourceMetrics) -> (AlertLevel, f32, f32) {
        let c = &self.config;
        match resource {
            Resource::Cpu => higher_is_worse(m.cpu_usage, c.cpu_critical, c.warning_ratio),
            Resource::Gpu => higher_is_worse(m.gpu_utilization, c.gpu_critical, c.warning_ratio),
            Resource::Memory => {
                higher_is_worse(m.memory_usage_mb, c.memory_critical_mb, c.warning_ratio)
            }
            Resource::Disk => lower_is_worse(m.disk_space_mb, c.disk_critical_mb, c.warning_ratio),
            Resource::Battery => {
                lower_is_worse(m.battery_level, c.battery_critical, c.warning_ratio)
            }
            Resource::Thermal => {
                let level = match m.thermal_state {
                    ThermalState::Critical => AlertLevel::Critical,
                    ThermalState::Serious => AlertLevel::Warning,
                    _ => AlertLevel::Normal,
                };
                let rank = m.thermal_state as u8 as f32;
                let threshold = match level {
                    AlertLevel::Critical => ThermalState::Critical as u8 as f32,
                    _ => ThermalState::Serious as u8 as f32,
                };
                (level, rank, threshold)
            }
        }
    }
}

fn higher_is_worse(value: f32, critical: f32, ratio: f32) -> (AlertLevel, f32, f32) {
    let warning = critical * ratio;
    if value >= critical {
        (AlertLevel::Critical, value, critical)
    } else if value >= warning {
        (AlertLevel::Warning, value, warning)
    } else {
        (AlertLevel::Normal, value, warning)
    }
}

fn lower_is_worse(value: f32, critical: f32, ratio: f32) -> (AlertLevel, f32, f32) {
    let warning = critical / ratio;
    if value <= critical {
        (AlertLevel::Critical, value, critical)
    } else if value <= warning {
        (AlertLevel::Warning, value, warning)
    } else {
        (AlertLevel::Normal, value, warning)
    }
}
