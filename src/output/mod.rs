mod loopback;
mod png_sequence;

pub use loopback::LoopbackOutput;
pub use png_sequence::PngSequenceOutput;

use anyhow::Result;

use crate::depth::DisplayImage;

/// Trait for surfaces that show the current depth image
pub trait PresentationSurface {
    /// Replace the image on screen
    fn present(&mut self, image: &DisplayImage) -> Result<()>;
}
