use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capture::{CaptureDevice, DepthFrame, MediaType};

/// Receiver of depth frames from a running session
///
/// Called on the output's delivery queue, one frame at a time, in arrival
/// order.
pub trait DepthDataDelegate: Send + 'static {
    fn depth_data_output(&mut self, frame: DepthFrame);
}

impl<F> DepthDataDelegate for F
where
    F: FnMut(DepthFrame) + Send + 'static,
{
    fn depth_data_output(&mut self, frame: DepthFrame) {
        self(frame)
    }
}

/// Link between a device input and an output for one media type
#[derive(Debug, Clone)]
pub struct Connection {
    media_type: MediaType,
    enabled: Arc<AtomicBool>,
}

impl Connection {
    fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Takes effect immediately, including on a running session
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub(super) fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }
}

pub(super) struct DelegateRegistration {
    pub delegate: Box<dyn DepthDataDelegate>,
    pub queue_label: String,
}

/// Session output that delivers depth frames to a delegate
pub struct DepthDataOutput {
    delegate: Option<DelegateRegistration>,
    filtering_enabled: bool,
    discards_late_depth_data: bool,
    connections: Vec<Connection>,
}

impl DepthDataOutput {
    pub fn new() -> Self {
        Self {
            delegate: None,
            filtering_enabled: true,
            discards_late_depth_data: true,
            connections: Vec::new(),
        }
    }

    /// Register the delegate and the label of the serial queue it runs on
    pub fn set_delegate<D: DepthDataDelegate>(&mut self, delegate: D, queue_label: &str) {
        self.delegate = Some(DelegateRegistration {
            delegate: Box::new(delegate),
            queue_label: queue_label.to_string(),
        });
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.is_some()
    }

    /// Smooth over samples without depth before delivery
    pub fn set_filtering_enabled(&mut self, enabled: bool) {
        self.filtering_enabled = enabled;
    }

    pub fn is_filtering_enabled(&self) -> bool {
        self.filtering_enabled
    }

    /// Drop a frame instead of waiting when the delegate is still busy
    ///
    /// On by default. Turning it off makes the capture thread wait for the
    /// delegate, which keeps every frame but lets the preview fall behind.
    pub fn set_discards_late_depth_data(&mut self, discards: bool) {
        self.discards_late_depth_data = discards;
    }

    pub fn discards_late_depth_data(&self) -> bool {
        self.discards_late_depth_data
    }

    pub fn connection(&self, media_type: MediaType) -> Option<&Connection> {
        self.connections.iter().find(|c| c.media_type == media_type)
    }

    /// Form a depth connection when the device has an active depth format
    pub(super) fn attach(&mut self, device: &dyn CaptureDevice) {
        if device.active_depth_format().is_some() && self.connection(MediaType::DepthData).is_none()
        {
            tracing::debug!("Depth connection formed for {}", device.unique_id());
            self.connections.push(Connection::new(MediaType::DepthData));
        }
    }

    pub(super) fn take_delegate(&mut self) -> Option<DelegateRegistration> {
        self.delegate.take()
    }
}

impl Default for DepthDataOutput {
    fn default() -> Self {
        Self::new()
    }
}
