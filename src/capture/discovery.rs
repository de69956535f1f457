use std::sync::Arc;

use super::types::{DevicePosition, DeviceType, MediaType};
use super::CaptureDevice;
use crate::error::CaptureError;

/// Criteria for picking a device out of the platform's device list
#[derive(Debug, Clone)]
pub struct DiscoveryQuery {
    pub device_types: Vec<DeviceType>,
    pub media_type: MediaType,
    pub position: DevicePosition,
}

impl DiscoveryQuery {
    /// Back-facing dual camera producing video
    pub fn back_dual_camera() -> Self {
        Self {
            device_types: vec![DeviceType::BuiltInDualCamera],
            media_type: MediaType::Video,
            position: DevicePosition::Back,
        }
    }

    pub fn matches(&self, device: &dyn CaptureDevice) -> bool {
        let position_matches = self.position == DevicePosition::Unspecified
            || device.position() == self.position;

        self.device_types.contains(&device.device_type())
            && position_matches
            && device.has_media_type(self.media_type)
    }

    /// Every matching device, in enumeration order
    pub fn devices(&self, available: &[Arc<dyn CaptureDevice>]) -> Vec<Arc<dyn CaptureDevice>> {
        available
            .iter()
            .filter(|d| self.matches(d.as_ref()))
            .cloned()
            .collect()
    }

    /// First matching device
    pub fn discover(
        &self,
        available: &[Arc<dyn CaptureDevice>],
    ) -> Result<Arc<dyn CaptureDevice>, CaptureError> {
        let device = self
            .devices(available)
            .into_iter()
            .next()
            .ok_or(CaptureError::NoDeviceFound)?;

        tracing::info!(
            "Discovered {} ({})",
            device.localized_name(),
            device.unique_id()
        );
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SimulatedDualCamera;

    fn create_test_device(
        id: &str,
        device_type: DeviceType,
        position: DevicePosition,
    ) -> Arc<dyn CaptureDevice> {
        Arc::new(
            SimulatedDualCamera::new(id)
                .with_device_type(device_type)
                .with_position(position),
        )
    }

    #[test]
    fn test_discover_picks_first_back_dual_camera() {
        let devices = vec![
            create_test_device("front-dual", DeviceType::BuiltInDualCamera, DevicePosition::Front),
            create_test_device("back-wide", DeviceType::BuiltInWideAngleCamera, DevicePosition::Back),
            create_test_device("back-dual-1", DeviceType::BuiltInDualCamera, DevicePosition::Back),
            create_test_device("back-dual-2", DeviceType::BuiltInDualCamera, DevicePosition::Back),
        ];

        let device = DiscoveryQuery::back_dual_camera().discover(&devices).unwrap();
        assert_eq!(device.unique_id(), "back-dual-1");
    }

    #[test]
    fn test_unspecified_position_matches_any() {
        let devices = vec![create_test_device(
            "front-dual",
            DeviceType::BuiltInDualCamera,
            DevicePosition::Front,
        )];

        let query = DiscoveryQuery {
            position: DevicePosition::Unspecified,
            ..DiscoveryQuery::back_dual_camera()
        };
        assert_eq!(query.devices(&devices).len(), 1);
    }

    #[test]
    fn test_discover_without_match_is_an_error() {
        let devices = vec![create_test_device(
            "back-wide",
            DeviceType::BuiltInWideAngleCamera,
            DevicePosition::Back,
        )];

        let result = DiscoveryQuery::back_dual_camera().discover(&devices);
        assert!(matches!(result, Err(CaptureError::NoDeviceFound)));
    }
}
