mod device;
mod discovery;
mod format;
mod simulated;
pub mod types;

pub use device::{configure_device, ConfigurationGuard};
pub use discovery::DiscoveryQuery;
pub use format::select_format;
pub use simulated::{SimulatedDualCamera, SimulatedScene};
pub use types::{
    CaptureFormat, DepthEncoding, DepthFormat, DepthFrame, DepthMap, DevicePosition, DeviceType,
    Dimensions, MediaType, SessionPreset, VideoEncoding,
};

use crate::error::CaptureError;

/// Trait for camera devices exposed by a platform capture framework
///
/// Devices are owned by the platform; callers hold them behind `Arc`.
pub trait CaptureDevice: Send + Sync {
    fn unique_id(&self) -> &str;

    fn localized_name(&self) -> &str;

    fn device_type(&self) -> DeviceType;

    fn position(&self) -> DevicePosition;

    fn has_media_type(&self, media_type: MediaType) -> bool;

    /// All capture formats the device supports
    fn formats(&self) -> Vec<CaptureFormat>;

    fn active_format(&self) -> Option<CaptureFormat>;

    fn active_depth_format(&self) -> Option<DepthFormat>;

    fn supports_session_preset(&self, preset: SessionPreset) -> bool;

    /// Acquire exclusive configuration access
    ///
    /// Prefer [`ConfigurationGuard::acquire`], which releases the lock on drop.
    fn lock_for_configuration(&self) -> Result<(), CaptureError>;

    fn unlock_for_configuration(&self);

    /// Set the active video and depth format together
    ///
    /// Requires the configuration lock. Either both formats are applied or
    /// neither is.
    fn set_active_formats(
        &self,
        format: &CaptureFormat,
        depth_format: &DepthFormat,
    ) -> Result<(), CaptureError>;

    /// Open the stream of depth frames for the active depth format
    fn open_depth_stream(&self) -> Result<Box<dyn DepthStream>, CaptureError>;
}

/// Source of depth frames from a configured device
pub trait DepthStream: Send {
    /// Block until the next frame is available
    ///
    /// Returns `None` once the stream has ended.
    fn next_frame(&mut self) -> Option<DepthFrame>;
}
