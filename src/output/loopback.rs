use super::PresentationSurface;
use crate::depth::DisplayImage;
use anyhow::{Context, Result};
use image::GrayImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Grey depth preview written to a v4l2loopback device
pub struct LoopbackOutput {
    file: File,
    width: u32,
    height: u32,
}

impl LoopbackOutput {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        Ok(Self {
            file,
            width,
            height,
        })
    }

    /// Pack a grey image as YUYV with neutral chroma
    fn luma_to_yuyv(image: &GrayImage) -> Vec<u8> {
        let (width, height) = image.dimensions();
        let mut yuyv = Vec::with_capacity(width as usize * height as usize * 2);

        for y in 0..height {
            for x in (0..width).step_by(2) {
                let y0 = image.get_pixel(x, y)[0];
                let y1 = if x + 1 < width {
                    image.get_pixel(x + 1, y)[0]
                } else {
                    y0
                };

                // YUYV format: Y0 U Y1 V
                yuyv.extend_from_slice(&[y0, 128, y1, 128]);
            }
        }

        yuyv
    }
}

impl PresentationSurface for LoopbackOutput {
    fn present(&mut self, image: &DisplayImage) -> Result<()> {
        let luma = image.to_luma8();
        let frame = if luma.dimensions() != (self.width, self.height) {
            image::imageops::resize(
                &luma,
                self.width,
                self.height,
                image::imageops::FilterType::Nearest,
            )
        } else {
            luma
        };

        self.file
            .write_all(&Self::luma_to_yuyv(&frame))
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_luma_to_yuyv_packs_pairs() {
        let image = GrayImage::from_fn(3, 1, |x, _| Luma([(x as u8 + 1) * 10]));
        let yuyv = LoopbackOutput::luma_to_yuyv(&image);

        // Odd width repeats the last sample
        assert_eq!(yuyv, vec![10, 128, 20, 128, 30, 128, 30, 128]);
    }
}
