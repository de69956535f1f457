use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use flume::{Receiver, Sender};

use crate::capture::{DepthEncoding, DepthFrame};
use crate::depth::{DisplayImage, Orientation};
use crate::output::PresentationSurface;
use crate::session::DepthDataDelegate;

/// User-owned toggle between disparity and depth display
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct DisplayModeSwitch(Arc<AtomicBool>);

impl DisplayModeSwitch {
    pub fn new(disparity: bool) -> Self {
        Self(Arc::new(AtomicBool::new(disparity)))
    }

    pub fn is_disparity(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Flip the mode, returning the new value
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::AcqRel)
    }

    /// Flip the mode after every `every` presented images (0 never flips)
    ///
    /// Returns the new mode when it flipped.
    pub fn toggle_after(&self, presented: u64, every: u64) -> Option<bool> {
        (every > 0 && presented > 0 && presented % every == 0).then(|| self.toggle())
    }

    pub fn target_encoding(&self) -> DepthEncoding {
        if self.is_disparity() {
            DepthEncoding::DisparityFloat32
        } else {
            DepthEncoding::DepthFloat32
        }
    }
}

/// Converts each delivered frame and hands it to the presentation context
pub struct DepthPresenter {
    mode: DisplayModeSwitch,
    orientation: Orientation,
    handoff: Sender<DisplayImage>,
    dropped: Arc<AtomicU64>,
}

impl DepthPresenter {
    /// Returns the presenter and the receiving end for the presentation loop
    ///
    /// At most one converted image waits for the presentation context. A frame
    /// converted while that slot is still taken is dropped, so the depth queue
    /// never waits on presentation.
    pub fn new(mode: DisplayModeSwitch) -> (Self, Receiver<DisplayImage>) {
        let (handoff, images) = flume::bounded(1);
        let presenter = Self {
            mode,
            orientation: Orientation::Right,
            handoff,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (presenter, images)
    }

    /// Counter of frames that failed conversion or found the hand-off full
    pub fn dropped_frames(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}

impl DepthDataDelegate for DepthPresenter {
    fn depth_data_output(&mut self, frame: DepthFrame) {
        let _span = tracing::debug_span!("depth_frame", sequence = frame.sequence).entered();

        let target = self.mode.target_encoding();
        let presented = DisplayImage::from_frame(frame, target, self.orientation)
            .ok()
            .is_some_and(|image| self.handoff.try_send(image).is_ok());

        if !presented {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Show handed-off images in arrival order until `limit` images have been
/// presented or every sender is gone
///
/// `after_present` runs on this context after each image with the running
/// count. Returns the number of images presented.
pub fn run_presentation_loop<S, F>(
    images: &Receiver<DisplayImage>,
    surface: &mut S,
    limit: Option<u64>,
    mut after_present: F,
) -> Result<u64>
where
    S: PresentationSurface + ?Sized,
    F: FnMut(&DisplayImage, u64),
{
    let mut presented = 0u64;

    while limit.map_or(true, |limit| presented < limit) {
        let Ok(image) = images.recv() else {
            break;
        };

        surface
            .present(&image)
            .with_context(|| format!("Failed to present frame {}", image.sequence))?;
        presented += 1;
        after_present(&image, presented);
    }

    Ok(presented)
}
