use std::time::Duration;

use image::{imageops, GrayImage, ImageBuffer, Luma};

use crate::capture::{DepthEncoding, DepthFrame, DepthMap};
use crate::error::ConversionError;

/// Single-channel float image as handed to the presentation layer
pub type DepthImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Rotation applied to match the sensor to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Up,
    /// Rotated 90 degrees clockwise
    Right,
    Down,
    /// Rotated 90 degrees counter-clockwise
    Left,
}

impl DepthMap {
    /// Convert to another Float32 depth or disparity encoding
    ///
    /// Depth and disparity are reciprocals. Samples that are not finite and
    /// positive carry no distance and become NaN.
    pub fn converting(&self, target: DepthEncoding) -> Result<DepthMap, ConversionError> {
        if !matches!(
            target,
            DepthEncoding::DepthFloat32 | DepthEncoding::DisparityFloat32
        ) {
            return Err(ConversionError::Unsupported(target));
        }

        let expected = self.width as usize * self.height as usize;
        if self.data.len() != expected {
            return Err(ConversionError::SizeMismatch {
                expected,
                actual: self.data.len(),
            });
        }

        let data = if self.encoding.is_disparity() == target.is_disparity() {
            self.data.clone()
        } else {
            self.data.iter().map(|&v| reciprocal(v)).collect()
        };

        Ok(DepthMap {
            width: self.width,
            height: self.height,
            encoding: target,
            data,
        })
    }

    /// Fill samples without depth from their finite 4-neighbours
    pub fn fill_holes(&mut self) {
        let (width, height) = (self.width as i64, self.height as i64);
        let source = self.data.clone();

        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) as usize;
                if source[idx].is_finite() {
                    continue;
                }

                let (sum, count) = [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
                    .into_iter()
                    .filter(|&(nx, ny)| nx >= 0 && ny >= 0 && nx < width && ny < height)
                    .map(|(nx, ny)| source[(ny * width + nx) as usize])
                    .filter(|v| v.is_finite())
                    .fold((0.0f32, 0u32), |(sum, count), v| (sum + v, count + 1));

                if count > 0 {
                    self.data[idx] = sum / count as f32;
                }
            }
        }
    }
}

fn reciprocal(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        1.0 / value
    } else {
        f32::NAN
    }
}

/// A converted depth frame ready to be shown
#[derive(Debug, Clone)]
pub struct DisplayImage {
    pub image: DepthImage,
    pub encoding: DepthEncoding,
    pub orientation: Orientation,
    pub timestamp: Duration,
    pub sequence: u64,
}

impl DisplayImage {
    pub fn from_depth_map(
        map: DepthMap,
        orientation: Orientation,
        timestamp: Duration,
        sequence: u64,
    ) -> Result<Self, ConversionError> {
        let expected = map.width as usize * map.height as usize;
        let actual = map.data.len();
        let encoding = map.encoding;

        let buffer = DepthImage::from_raw(map.width, map.height, map.data)
            .ok_or(ConversionError::SizeMismatch { expected, actual })?;

        let image = match orientation {
            Orientation::Up => buffer,
            Orientation::Right => imageops::rotate90(&buffer),
            Orientation::Down => imageops::rotate180(&buffer),
            Orientation::Left => imageops::rotate270(&buffer),
        };

        Ok(Self {
            image,
            encoding,
            orientation,
            timestamp,
            sequence,
        })
    }

    /// Convert a frame to `target` and orient it for display
    pub fn from_frame(
        frame: DepthFrame,
        target: DepthEncoding,
        orientation: Orientation,
    ) -> Result<Self, ConversionError> {
        let converted = frame.depth_map.converting(target)?;
        Self::from_depth_map(converted, orientation, frame.timestamp, frame.sequence)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Normalize finite samples to 0..=255, near values bright
    ///
    /// For depth near means small, for disparity near means large. Samples
    /// without depth are black.
    pub fn to_luma8(&self) -> GrayImage {
        let (min, max) = self
            .image
            .pixels()
            .map(|p| p[0])
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let range = if max > min { max - min } else { 1.0 };
        let disparity = self.encoding.is_disparity();

        GrayImage::from_fn(self.image.width(), self.image.height(), |x, y| {
            let v = self.image.get_pixel(x, y)[0];
            if !v.is_finite() {
                return Luma([0]);
            }
            let t = (v - min) / range;
            let brightness = if disparity { t } else { 1.0 - t };
            Luma([(brightness * 255.0).round().clamp(0.0, 255.0) as u8])
        })
    }
}
