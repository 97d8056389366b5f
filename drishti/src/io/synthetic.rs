//! Scripted synthetic capture for the demo binary and tests.
//!
//! A script is a list of phases, each holding the scene brightness, hand
//! shake and depth dropout for a number of frames. The last phase repeats
//! forever.

use serde::{Deserialize, Serialize};

use super::noise::SensorNoise;
use crate::core::clock::{TimestampUs, secs_to_us};
use crate::core::types::{CameraImage, CameraPose, DepthMap, Frame, TrackingState};

/// Anything that yields frames in capture order.
pub trait FrameSource {
    /// `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<Frame>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapturePhase {
    pub frames: u32,
    /// Scene brightness, 0..1.
    pub brightness: f32,
    /// Positional shake per frame (metres, 1 sigma).
    pub shake: f32,
    /// Fraction of depth samples with no return.
    pub depth_dropout: f32,
}

impl CapturePhase {
    pub fn steady(frames: u32, brightness: f32) -> Self {
        Self {
            frames,
            brightness,
            shake: 0.002,
            depth_dropout: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Default: 128
    pub width: u32,
    /// Default: 96
    pub height: u32,
    /// Depth resolution is the image resolution divided by this.
    /// Default: 4
    pub depth_downsample: u32,
    /// Default: 30.0
    pub fps: f32,
    /// Emit depth maps (LiDAR-equipped device).
    /// Default: true
    pub with_depth: bool,
    /// Stop after this many frames; unbounded when `None`.
    pub max_frames: Option<u64>,
    /// Default: 42
    pub seed: u64,
    pub phases: Vec<CapturePhase>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 96,
            depth_downsample: 4,
            fps: 30.0,
            with_depth: true,
            max_frames: None,
            seed: 42,
            phases: vec![
                CapturePhase::steady(90, 0.75),
                CapturePhase::steady(60, 0.15),
                CapturePhase {
                    frames: 20,
                    brightness: 0.7,
                    shake: 0.15,
                    depth_dropout: 0.3,
                },
                CapturePhase::steady(120, 0.7),
            ],
        }
    }
}

pub struct SyntheticFrameSource {
    config: SyntheticConfig,
    noise: SensorNoise,
    index: u64,
    phase: usize,
    phase_frame: u32,
    pose: CameraPose,
}

impl SyntheticFrameSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let noise = SensorNoise::new(config.seed);
        Self {
            config,
            noise,
            index: 0,
            phase: 0,
            phase_frame: 0,
            pose: CameraPose::default(),
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    pub fn frames_emitted(&self) -> u64 {
        self.index
    }

    fn frame_interval_us(&self) -> TimestampUs {
        secs_to_us(1.0 / self.config.fps.max(1.0))
    }

    fn current_phase(&self) -> CapturePhase {
        self.config
            .phases
            .get(self.phase)
            .copied()
            .unwrap_or(CapturePhase::steady(u32::MAX, 0.7))
    }

    fn advance_phase(&mut self) {
        self.phase_frame += 1;
        let has_next = self.phase + 1 < self.config.phases.len();
        if has_next && self.phase_frame >= self.current_phase().frames {
            self.phase += 1;
            self.phase_frame = 0;
            log::debug!("Synthetic source: phase {}", self.phase);
        }
    }

    fn render_image(&mut self, phase: &CapturePhase) -> CameraImage {
        let (w, h) = (self.config.width, self.config.height);
        let base = phase.brightness.clamp(0.0, 1.0) * 255.0;
        let grain = 2.0 + 6.0 * (1.0 - phase.brightness);
        let mut pixels = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                // Checker texture with a slow gradient
                let checker = if (x / 8 + y / 8) % 2 == 0 { 1.0 } else { 0.6 };
                let gradient = 0.85 + 0.15 * (x as f32 / w as f32);
                let v = base * checker * gradient;
                let r = self.noise.pixel(v, grain);
                let g = self.noise.pixel(v, grain);
                let b = self.noise.pixel(v * 0.95, grain);
                pixels.push([r, g, b]);
            }
        }
        CameraImage::new(w, h, pixels)
    }

    fn render_depth(&mut self, phase: &CapturePhase) -> DepthMap {
        let ds = self.config.depth_downsample.max(1);
        let (w, h) = ((self.config.width / ds).max(1), (self.config.height / ds).max(1));
        let mut depths = Vec::with_capacity((w * h) as usize);
        let mut confidence = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                if self.noise.chance(phase.depth_dropout) {
                    depths.push(0.0);
                    confidence.push(0);
                    continue;
                }
                // Gently curved surface about 1.2 m away
                let u = x as f32 / w as f32 - 0.5;
                let v = y as f32 / h as f32 - 0.5;
                let d = 1.2 + 0.1 * (u * u + v * v) + self.noise.gaussian(0.003);
                depths.push(d);
                confidence.push(if self.noise.chance(0.9) { 2 } else { 1 });
            }
        }
        DepthMap::new(w, h, depths).with_confidence(confidence)
    }
}

impl FrameSource for SyntheticFrameSource {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.config.max_frames.is_some_and(|max| self.index >= max) {
            return None;
        }
        let phase = self.current_phase();
        let timestamp_us = self.index * self.frame_interval_us();

        let shake = self.noise.jitter3(phase.shake);
        let twist = self.noise.jitter3(phase.shake * 2.0);
        for i in 0..3 {
            self.pose.position[i] += shake[i];
            self.pose.rotation[i] += twist[i];
        }
        // Slow orbit around the subject
        self.pose.rotation[2] += 0.002;

        let image = self.render_image(&phase);
        let mut frame = Frame::new(timestamp_us, image, self.pose);
        if self.config.with_depth {
            let depth = self.render_depth(&phase);
            frame = frame.with_depth(depth);
        }
        if phase.shake > 0.05 {
            frame = frame.with_tracking(TrackingState::Limited);
        }

        self.index += 1;
        self.advance_phase();
        Some(frame)
    }
}
