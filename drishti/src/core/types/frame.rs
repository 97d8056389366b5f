//! Sensor frame bundle delivered by the capture platform (~30 Hz).

use serde::{Deserialize, Serialize};

use crate::core::clock::TimestampUs;
use crate::error::{Result, ScanError};

/// RGB8 camera image.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraImage {
    pub width: u32,
    pub height: u32,
    /// Row-major pixels, `width * height` entries.
    pub pixels: Vec<[u8; 3]>,
}

impl CameraImage {
    pub fn new(width: u32, height: u32, pixels: Vec<[u8; 3]>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Image filled with a single colour.
    pub fn uniform(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(width, height, vec![rgb; (width * height) as usize])
    }

    /// Reject zero-sized images and buffers that disagree with the dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::InvalidFrameData(format!(
                "camera image has zero dimension ({}x{})",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize;
        if self.pixels.len() != expected {
            return Err(ScanError::InvalidFrameData(format!(
                "camera image holds {} pixels, expected {}",
                self.pixels.len(),
                expected
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.pixels[(y * self.width + x) as usize]
    }
}

/// Depth buffer in metres with optional per-sample confidence.
///
/// Samples that are non-finite or non-positive are invalid returns.
/// Confidence levels follow the platform convention: 0 = low, 1 = medium,
/// 2 = high.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    pub width: u32,
    pub height: u32,
    pub depths: Vec<f32>,
    pub confidence: Option<Vec<u8>>,
}

/// Highest confidence level reported by depth sensors.
pub const MAX_CONFIDENCE_LEVEL: u8 = 2;

impl DepthMap {
    pub fn new(width: u32, height: u32, depths: Vec<f32>) -> Self {
        Self {
            width,
            height,
            depths,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: Vec<u8>) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::InvalidFrameData(format!(
                "depth map has zero dimension ({}x{})",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize;
        if self.depths.len() != expected {
            return Err(ScanError::InvalidFrameData(format!(
                "depth map holds {} samples, expected {}",
                self.depths.len(),
                expected
            )));
        }
        if let Some(conf) = &self.confidence
            && conf.len() != expected
        {
            return Err(ScanError::InvalidFrameData(format!(
                "confidence map holds {} samples, expected {}",
                conf.len(),
                expected
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn is_valid(depth: f32) -> bool {
        depth.is_finite() && depth > 0.0
    }

    /// Depth at (x, y) if the sample is a valid return.
    #[inline]
    pub fn depth(&self, x: u32, y: u32) -> Option<f32> {
        let d = self.depths[(y * self.width + x) as usize];
        Self::is_valid(d).then_some(d)
    }
}

/// Camera pose: position in metres, orientation as (roll, pitch, yaw) radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: [f32; 3],
    pub rotation: [f32; 3],
}

impl CameraPose {
    pub fn new(position: [f32; 3], rotation: [f32; 3]) -> Self {
        Self { position, rotation }
    }
}

/// Platform tracking quality for the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    #[default]
    Normal,
    Limited,
    NotAvailable,
}

/// One tick from the frame source.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp_us: TimestampUs,
    pub image: CameraImage,
    pub depth: Option<DepthMap>,
    pub pose: CameraPose,
    pub tracking: TrackingState,
}

impl Frame {
    pub fn new(timestamp_us: TimestampUs, image: CameraImage, pose: CameraPose) -> Self {
        Self {
            timestamp_us,
            image,
            depth: None,
            pose,
            tracking: TrackingState::Normal,
        }
    }

    pub fn with_depth(mut self, depth: DepthMap) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_tracking(mut self, tracking: TrackingState) -> Self {
        self.tracking = tracking;
        self
    }
}
