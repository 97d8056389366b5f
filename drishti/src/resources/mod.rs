//! Device resource monitoring.
//!
//! [`ResourceSampler`] produces raw samples (host via `sysinfo`, or a
//! scripted sequence); [`ResourceMonitor`] classifies them against warning
//! and critical tiers and reports only edges.

mod monitor;
mod sampler;

pub use monitor::{
    AlertLevel, Resource, ResourceAction, ResourceAlert, ResourceConfig, ResourceMonitor,
    ResourceReport,
};
pub use sampler::{ResourceSampler, ScriptedSampler, SysinfoSampler, thermal_from_celsius};
