//! Luminance sampling.

use crate::core::types::CameraImage;

/// Rec. 709 luma weights.
const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

/// Luma of one RGB8 pixel, normalised to [0, 1].
#[inline]
pub fn luma(rgb: [u8; 3]) -> f32 {
    (LUMA_R * rgb[0] as f32 + LUMA_G * rgb[1] as f32 + LUMA_B * rgb[2] as f32) / 255.0
}

/// Luma sampled on a coarse grid (every `stride`-th pixel in both axes).
#[derive(Debug, Clone)]
pub struct LumaGrid {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
}

impl LumaGrid {
    /// Sample the image. The image must already be validated.
    pub fn sample(image: &CameraImage, stride: usize) -> Self {
        let stride = stride.max(1);
        let xs: Vec<u32> = (0..image.width).step_by(stride).collect();
        let ys: Vec<u32> = (0..image.height).step_by(stride).collect();

        let mut values = Vec::with_capacity(xs.len() * ys.len());
        for &y in &ys {
            for &x in &xs {
                values.push(luma(image.pixel(x, y)));
            }
        }

        Self {
            width: xs.len(),
            height: ys.len(),
            values,
        }
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    /// Average luma, the lighting level in [0, 1].
    pub fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }
}

/// Lighting level of an image in [0, 1].
pub fn lighting_level(image: &CameraImage, stride: usize) -> f32 {
    LumaGrid::sample(image, stride).mean()
}
