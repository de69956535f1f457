use super::PresentationSurface;
use crate::depth::DisplayImage;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Writes every presented image as a numbered grey PNG
pub struct PngSequenceOutput {
    directory: PathBuf,
}

impl PngSequenceOutput {
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create {}", directory.display()))?;

        tracing::info!("Writing depth previews to {}", directory.display());
        Ok(Self { directory })
    }

    pub fn frame_path(&self, sequence: u64) -> PathBuf {
        self.directory.join(format!("frame_{:06}.png", sequence))
    }
}

impl PresentationSurface for PngSequenceOutput {
    fn present(&mut self, image: &DisplayImage) -> Result<()> {
        let path = self.frame_path(image.sequence);
        image
            .to_luma8()
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::debug!("Wrote {}", path.display());
        Ok(())
    }
}
