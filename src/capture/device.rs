use super::types::{CaptureFormat, DepthFormat};
use super::CaptureDevice;
use crate::error::CaptureError;

/// Exclusive configuration access to a device, released on drop
pub struct ConfigurationGuard<'a, D: CaptureDevice + ?Sized> {
    device: &'a D,
}

impl<'a, D: CaptureDevice + ?Sized> ConfigurationGuard<'a, D> {
    pub fn acquire(device: &'a D) -> Result<Self, CaptureError> {
        device.lock_for_configuration()?;
        tracing::debug!("Locked {} for configuration", device.unique_id());
        Ok(Self { device })
    }

    pub fn set_active_formats(
        &self,
        format: &CaptureFormat,
        depth_format: &DepthFormat,
    ) -> Result<(), CaptureError> {
        self.device.set_active_formats(format, depth_format)
    }
}

impl<D: CaptureDevice + ?Sized> Drop for ConfigurationGuard<'_, D> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
        tracing::debug!("Unlocked {}", self.device.unique_id());
    }
}

/// Make `format` and `depth_format` the device's active pair
///
/// The pair is validated against the device's capabilities before anything is
/// written, so a failure leaves the previous active formats in place.
pub fn configure_device<D>(
    device: &D,
    format: &CaptureFormat,
    depth_format: &DepthFormat,
) -> Result<(), CaptureError>
where
    D: CaptureDevice + ?Sized,
{
    let guard = ConfigurationGuard::acquire(device)?;

    if !device.formats().contains(format) {
        return Err(CaptureError::UnsupportedFormat(format.to_string()));
    }
    if !format.supports_depth(depth_format) {
        return Err(CaptureError::UnsupportedFormat(depth_format.to_string()));
    }

    guard.set_active_formats(format, depth_format)?;
    drop(guard);

    tracing::info!(
        "Selected format: {}, depth format: {}",
        format,
        depth_format
    );
    Ok(())
}
