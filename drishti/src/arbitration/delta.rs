//! Capture configuration handed to the platform session on a mode change.

use serde::{Deserialize, Serialize};

use crate::core::types::{ScanningConditions, ScanningMode};

/// Per-frame buffers the capture session must deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameSemantics {
    pub scene_depth: bool,
    pub smoothed_scene_depth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionFilterMode {
    #[default]
    Off,
    Light,
    Strong,
}

impl MotionFilterMode {
    /// Heavier filtering for shakier capture.
    pub fn for_stability(stability: f32) -> Self {
        if stability < 0.5 {
            MotionFilterMode::Strong
        } else if stability < 0.8 {
            MotionFilterMode::Light
        } else {
            MotionFilterMode::Off
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentTexturing {
    #[default]
    Manual,
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfigDelta {
    pub mode: ScanningMode,
    pub frame_semantics: FrameSemantics,
    pub reconstruction_enabled: bool,
    pub motion_filter: MotionFilterMode,
    pub environment_texturing: EnvironmentTexturing,
}

impl CaptureConfigDelta {
    /// Pure function of mode and conditions.
    pub fn for_mode(mode: ScanningMode, conditions: &ScanningConditions) -> Self {
        let depth = mode.requires_lidar();
        Self {
            mode,
            frame_semantics: FrameSemantics {
                scene_depth: depth,
                smoothed_scene_depth: depth,
            },
            reconstruction_enabled: depth,
            motion_filter: MotionFilterMode::for_stability(conditions.motion_stability),
            environment_texturing: if depth {
                EnvironmentTexturing::Automatic
            } else {
                EnvironmentTexturing::Manual
            },
        }
    }
}
