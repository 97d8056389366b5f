//! Resource sampling backends.

use std::collections::VecDeque;
use sysinfo::{Components, Disks, Pid, ProcessesToUpdate, System};

use crate::core::types::{ResourceMetrics, ThermalState};
use crate::error::Result;

/// Source of raw resource samples.
///
/// The monitor thread stamps `timestamp_us` and `frame_rate`; samplers only
/// fill the host-observed fields.
pub trait ResourceSampler: Send {
    fn sample(&mut self) -> Result<ResourceMetrics>;
}

const BYTES_PER_MB: f32 = 1024.0 * 1024.0;

/// Host sampler backed by `sysinfo`.
///
/// GPU utilisation and battery are not observable here and are reported as
/// idle / full.
pub struct SysinfoSampler {
    system: System,
    disks: Disks,
    components: Components,
    pid: Option<Pid>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn process_memory_mb(&mut self) -> f32 {
        let Some(pid) = self.pid else {
            return 0.0;
        };
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system
            .process(pid)
            .map(|p| p.memory() as f32 / BYTES_PER_MB)
            .unwrap_or(0.0)
    }

    fn free_disk_mb(&mut self) -> f32 {
        self.disks.refresh(true);
        let free: u64 = self.disks.list().iter().map(|d| d.available_space()).sum();
        if self.disks.list().is_empty() {
            f32::MAX
        } else {
            free as f32 / BYTES_PER_MB
        }
    }

    fn thermal_state(&mut self) -> ThermalState {
        self.components.refresh(true);
        let hottest = self
            .components
            .list()
            .iter()
            .filter_map(|c| c.temperature())
            .filter(|t| t.is_finite())
            .fold(None, |acc: Option<f32>, t| Some(acc.map_or(t, |a| a.max(t))));
        hottest.map_or(ThermalState::Nominal, thermal_from_celsius)
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SysinfoSampler {
    fn sample(&mut self) -> Result<ResourceMetrics> {
        self.system.refresh_cpu_all();
        let cpu_usage = (self.system.global_cpu_usage() / 100.0).clamp(0.0, 1.0);
        let memory_usage_mb = self.process_memory_mb();
        let disk_space_mb = self.free_disk_mb();
        let thermal_state = self.thermal_state();

        Ok(ResourceMetrics {
            cpu_usage,
            memory_usage_mb,
            gpu_utilization: 0.0,
            thermal_state,
            frame_rate: 0.0,
            disk_space_mb,
            battery_level: 1.0,
            timestamp_us: 0,
        })
    }
}

/// Map the hottest sensor reading to a platform-style thermal state.
pub fn thermal_from_celsius(celsius: f32) -> ThermalState {
    if celsius >= 95.0 {
        ThermalState::Critical
    } else if celsius >= 85.0 {
        ThermalState::Serious
    } else if celsius >= 75.0 {
        ThermalState::Fair
    } else {
        ThermalState::Nominal
    }
}

/// Replays a fixed sequence, then repeats the final sample.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSampler {
    pending: VecDeque<ResourceMetrics>,
    last: ResourceMetrics,
}

impl ScriptedSampler {
    pub fn new(samples: impl IntoIterator<Item = ResourceMetrics>) -> Self {
        Self {
            pending: samples.into_iter().collect(),
            last: ResourceMetrics::default(),
        }
    }

    /// Always reports the same sample.
    pub fn constant(sample: ResourceMetrics) -> Self {
        Self {
            pending: VecDeque::new(),
            last: sample,
        }
    }

    pub fn push(&mut self, sample: ResourceMetrics) {
        self.pending.push_back(sample);
    }
}

impl ResourceSampler for ScriptedSampler {
    fn sample(&mut self) -> Result<ResourceMetrics> {
        if let Some(next) = self.pending.pop_front() {
            self.last = next;
        }
        Ok(self.last)
    }
}
