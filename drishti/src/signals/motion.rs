//! Motion stability from consecutive camera poses.

use std::f32::consts::PI;

use crate::core::math::{normalize_angle, unit};
use crate::core::types::CameraPose;

/// Tracks the previous pose and scores frame-to-frame stability.
#[derive(Debug, Clone)]
pub struct MotionTracker {
    /// Translation at which positional stability bottoms out (metres).
    reference_distance: f32,
    previous: Option<CameraPose>,
}

impl MotionTracker {
    pub fn new(reference_distance: f32) -> Self {
        Self {
            reference_distance: reference_distance.max(f32::EPSILON),
            previous: None,
        }
    }

    /// Stability in [0, 1] relative to the previous pose; higher = steadier.
    ///
    /// The first pose after construction or `reset` is fully stable.
    pub fn update(&mut self, pose: CameraPose) -> f32 {
        let stability = match self.previous {
            Some(prev) => pose_stability(&prev, &pose, self.reference_distance),
            None => 1.0,
        };
        self.previous = Some(pose);
        stability
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Average of rotational and positional stability between two poses.
pub fn pose_stability(prev: &CameraPose, curr: &CameraPose, reference_distance: f32) -> f32 {
    let rot_sq: f32 = (0..3)
        .map(|i| normalize_angle(curr.rotation[i] - prev.rotation[i]).powi(2))
        .sum();
    let rotational = unit(rot_sq.sqrt() / PI);

    let pos_sq: f32 = (0..3)
        .map(|i| (curr.position[i] - prev.position[i]).powi(2))
        .sum();
    let positional = unit(pos_sq.sqrt() / reference_distance);

    ((1.0 - rotational) + (1.0 - positional)) / 2.0
}
