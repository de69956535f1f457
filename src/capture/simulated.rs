use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::types::{
    CaptureFormat, DepthEncoding, DepthFormat, DepthFrame, DepthMap, DevicePosition, DeviceType,
    Dimensions, MediaType, SessionPreset, VideoEncoding,
};
use super::{CaptureDevice, DepthStream};
use crate::error::CaptureError;

const OCCLUSION_COLUMNS: u32 = 2;

/// Frame pacing and length of the synthetic stream
#[derive(Debug, Clone, Copy)]
pub struct SimulatedScene {
    /// Deliver frames in real time at the active format's frame rate
    pub paced: bool,
    /// End the stream after this many frames
    pub frame_limit: Option<u64>,
}

impl Default for SimulatedScene {
    fn default() -> Self {
        Self {
            paced: true,
            frame_limit: None,
        }
    }
}

#[derive(Default)]
struct ActiveFormats {
    format: Option<CaptureFormat>,
    depth_format: Option<DepthFormat>,
}

pub struct SimulatedDualCamera {
    unique_id: String,
    name: String,
    device_type: DeviceType,
    position: DevicePosition,
    formats: Vec<CaptureFormat>,
    unsupported_presets: Vec<SessionPreset>,
    scene: SimulatedScene,
    locked: AtomicBool,
    active: Mutex<ActiveFormats>,
}

impl SimulatedDualCamera {
    pub fn new(unique_id: &str) -> Self {
        Self {
            unique_id: unique_id.to_string(),
            name: "Simulated Back Dual Camera".to_string(),
            device_type: DeviceType::BuiltInDualCamera,
            position: DevicePosition::Back,
            formats: Vec::new(),
            unsupported_presets: Vec::new(),
            scene: SimulatedScene::default(),
            locked: AtomicBool::new(false),
            active: Mutex::new(ActiveFormats::default()),
        }
        .with_formats(default_formats())
    }

    /// Replace the supported formats; the first becomes the active format
    pub fn with_formats(mut self, formats: Vec<CaptureFormat>) -> Self {
        *self.active.get_mut().unwrap_or_else(PoisonError::into_inner) = ActiveFormats {
            format: formats.first().cloned(),
            depth_format: None,
        };
        self.formats = formats;
        self
    }

    pub fn with_device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn with_position(mut self, position: DevicePosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_scene(mut self, scene: SimulatedScene) -> Self {
        self.scene = scene;
        self
    }

    pub fn without_preset(mut self, preset: SessionPreset) -> Self {
        self.unsupported_presets.push(preset);
        self
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    fn active(&self) -> MutexGuard<'_, ActiveFormats> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CaptureDevice for SimulatedDualCamera {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn localized_name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn position(&self) -> DevicePosition {
        self.position
    }

    fn has_media_type(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Video => true,
            MediaType::DepthData => self
                .formats
                .iter()
                .any(|f| !f.supported_depth_formats.is_empty()),
        }
    }

    fn formats(&self) -> Vec<CaptureFormat> {
        self.formats.clone()
    }

    fn active_format(&self) -> Option<CaptureFormat> {
        self.active().format.clone()
    }

    fn active_depth_format(&self) -> Option<DepthFormat> {
        self.active().depth_format
    }

    fn supports_session_preset(&self, preset: SessionPreset) -> bool {
        !self.unsupported_presets.contains(&preset)
    }

    fn lock_for_configuration(&self) -> Result<(), CaptureError> {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| CaptureError::DeviceLocked(self.unique_id.clone()))
    }

    fn unlock_for_configuration(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn set_active_formats(
        &self,
        format: &CaptureFormat,
        depth_format: &DepthFormat,
    ) -> Result<(), CaptureError> {
        if !self.is_locked() {
            return Err(CaptureError::NotLocked(self.unique_id.clone()));
        }
        if !self.formats.contains(format) {
            return Err(CaptureError::UnsupportedFormat(format.to_string()));
        }
        if !format.supports_depth(depth_format) {
            return Err(CaptureError::UnsupportedFormat(depth_format.to_string()));
        }

        let mut active = self.active();
        active.format = Some(format.clone());
        active.depth_format = Some(*depth_format);
        Ok(())
    }

    fn open_depth_stream(&self) -> Result<Box<dyn DepthStream>, CaptureError> {
        let active = self.active();
        let depth_format = active
            .depth_format
            .ok_or_else(|| CaptureError::Stream("no active depth format".to_string()))?;
        let frame_rate = active
            .format
            .as_ref()
            .map(|f| f.max_frame_rate)
            .filter(|rate| *rate > 0.0)
            .unwrap_or(30.0);

        tracing::debug!(
            "Opening simulated depth stream {} at {:.0}fps",
            depth_format,
            frame_rate
        );

        Ok(Box::new(SimulatedDepthStream {
            depth_format,
            frame_duration: Duration::from_secs_f64(1.0 / frame_rate),
            scene: self.scene,
            sequence: 0,
            started: Instant::now(),
        }))
    }
}

struct SimulatedDepthStream {
    depth_format: DepthFormat,
    frame_duration: Duration,
    scene: SimulatedScene,
    sequence: u64,
    started: Instant,
}

impl DepthStream for SimulatedDepthStream {
    fn next_frame(&mut self) -> Option<DepthFrame> {
        if self.scene.frame_limit.is_some_and(|limit| self.sequence >= limit) {
            return None;
        }

        let timestamp =
            Duration::from_secs_f64(self.frame_duration.as_secs_f64() * self.sequence as f64);
        if self.scene.paced {
            let due = self.started + timestamp;
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }

        let depth_map = render_scene(&self.depth_format, timestamp);
        let frame = DepthFrame {
            depth_map,
            timestamp,
            sequence: self.sequence,
        };
        self.sequence += 1;
        Some(frame)
    }
}

/// Render the scene in meters, or 1/meters for disparity encodings
fn render_scene(depth_format: &DepthFormat, timestamp: Duration) -> DepthMap {
    let Dimensions { width, height } = depth_format.dimensions;
    let disparity = depth_format.encoding.is_disparity();

    let phase = timestamp.as_secs_f32() * PI / 2.0;
    let center_x = width as f32 * (0.5 + 0.3 * phase.sin());
    let center_y = height as f32 * 0.55;
    let radius = height as f32 * 0.25;

    let mut data = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            if x < OCCLUSION_COLUMNS {
                data.push(f32::NAN);
                continue;
            }

            // Floor recedes from 1.0m at the bottom to 4.0m at the top
            let mut depth = 1.0 + 3.0 * (1.0 - y as f32 / height as f32);

            let dx = (x as f32 - center_x) / radius;
            let dy = (y as f32 - center_y) / radius;
            let d2 = dx * dx + dy * dy;
            if d2 < 1.0 {
                depth = depth.min(0.8 - 0.3 * (1.0 - d2).sqrt());
            }

            data.push(if disparity { 1.0 / depth } else { depth });
        }
    }

    DepthMap::new(width, height, depth_format.encoding, data)
}

fn depth_formats(width: u32, height: u32) -> Vec<DepthFormat> {
    [
        DepthEncoding::DisparityFloat16,
        DepthEncoding::DisparityFloat32,
        DepthEncoding::DepthFloat16,
        DepthEncoding::DepthFloat32,
    ]
    .into_iter()
    .map(|encoding| DepthFormat::new(width, height, encoding))
    .collect()
}

fn video_format(width: u32, height: u32, fps: f64, depth: Vec<DepthFormat>) -> CaptureFormat {
    CaptureFormat {
        dimensions: Dimensions::new(width, height),
        encoding: VideoEncoding::YCbCr420BiPlanarFullRange,
        max_frame_rate: fps,
        supported_depth_formats: depth,
    }
}

/// Format list modeled on a phone's rear dual camera
fn default_formats() -> Vec<CaptureFormat> {
    let mut hd_depth = depth_formats(160, 90);
    hd_depth.extend(depth_formats(320, 180));
    let mut full_hd_depth = depth_formats(320, 180);
    full_hd_depth.extend(depth_formats(640, 360));

    vec![
        video_format(640, 480, 30.0, Vec::new()),
        video_format(1280, 720, 30.0, hd_depth),
        video_format(1920, 1080, 30.0, full_hd_depth),
        video_format(3840, 2160, 30.0, Vec::new()),
        video_format(4032, 3024, 30.0, depth_formats(768, 576)),
    ]
}
