use super::types::{CaptureFormat, DepthEncoding, DepthFormat};
use super::CaptureDevice;
use crate::error::CaptureError;

/// Select the widest capture format offering 32-bit float depth, and its
/// widest 32-bit float depth format
///
/// Only reads device capabilities. Among formats of equal width the last one
/// enumerated wins.
pub fn select_format<D>(device: &D) -> Result<(CaptureFormat, DepthFormat), CaptureError>
where
    D: CaptureDevice + ?Sized,
{
    select_from(device.formats())
}

fn select_from(formats: Vec<CaptureFormat>) -> Result<(CaptureFormat, DepthFormat), CaptureError> {
    let selected = formats
        .into_iter()
        .filter(|f| f.depth_formats_with(DepthEncoding::DepthFloat32).next().is_some())
        .max_by_key(CaptureFormat::width)
        .ok_or(CaptureError::NoDepthCapableFormat)?;

    let selected_depth = selected
        .depth_formats_with(DepthEncoding::DepthFloat32)
        .max_by_key(|d| d.width())
        .copied()
        .ok_or_else(|| CaptureError::NoFloat32DepthFormat(selected.to_string()))?;

    tracing::debug!(
        "Selected format {} with depth format {}",
        selected,
        selected_depth
    );

    Ok((selected, selected_depth))
}
