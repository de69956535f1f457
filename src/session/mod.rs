mod output;
mod pipeline;

pub use output::{Connection, DepthDataDelegate, DepthDataOutput};

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::capture::{CaptureDevice, CaptureFormat, DepthFormat, MediaType, SessionPreset};
use crate::error::CaptureError;
use pipeline::{DepthPipeline, PipelineSettings, Stats};

/// Lifecycle of a capture session; sessions are single use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Configuring,
    Configured,
    Running,
    Stopped,
}

/// A configured device wrapped as a session input
#[derive(Clone)]
pub struct DeviceInput {
    device: Arc<dyn CaptureDevice>,
}

impl DeviceInput {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &dyn CaptureDevice {
        self.device.as_ref()
    }
}

/// Settings applied by [`build_session`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub preset: SessionPreset,
    /// Name of the serial queue the delegate runs on
    pub queue_label: String,
    pub filtering_enabled: bool,
    pub discards_late_depth_data: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            preset: SessionPreset::Photo,
            queue_label: "depth queue".to_string(),
            filtering_enabled: false,
            discards_late_depth_data: true,
        }
    }
}

/// Coordinates one device input and one depth data output
pub struct CaptureSession {
    state: SessionState,
    preset: SessionPreset,
    input: Option<DeviceInput>,
    depth_output: Option<DepthDataOutput>,
    pipeline: Option<DepthPipeline>,
    stats: Arc<Stats>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Unconfigured,
            preset: SessionPreset::High,
            input: None,
            depth_output: None,
            pipeline: None,
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn preset(&self) -> SessionPreset {
        self.preset
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Frames handed to the delegate and frames discarded as late
    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.delivered.load(Ordering::Relaxed),
            self.stats.dropped.load(Ordering::Relaxed),
        )
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<(), CaptureError> {
        if self.state != from {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!("Session {:?} -> {:?}", from, to);
        self.state = to;
        Ok(())
    }

    fn ensure_configuring(&self) -> Result<(), CaptureError> {
        if self.state != SessionState::Configuring {
            return Err(CaptureError::NotConfiguring(self.state));
        }
        Ok(())
    }

    /// Start a configuration transaction
    pub fn begin_configuration(&mut self) -> Result<(), CaptureError> {
        self.transition(SessionState::Unconfigured, SessionState::Configuring)
    }

    /// Apply all changes made since `begin_configuration` together
    pub fn commit_configuration(&mut self) -> Result<(), CaptureError> {
        self.transition(SessionState::Configuring, SessionState::Configured)
    }

    pub fn set_preset(&mut self, preset: SessionPreset) -> Result<(), CaptureError> {
        self.ensure_configuring()?;
        self.preset = preset;
        Ok(())
    }

    /// A session takes one input, whose device must support the preset
    pub fn can_add_input(&self, input: &DeviceInput) -> bool {
        self.input.is_none() && input.device().supports_session_preset(self.preset)
    }

    pub fn add_input(&mut self, input: DeviceInput) -> Result<(), CaptureError> {
        self.ensure_configuring()?;
        if !self.can_add_input(&input) {
            return Err(CaptureError::InputRejected);
        }
        if let Some(output) = self.depth_output.as_mut() {
            output.attach(input.device());
        }
        self.input = Some(input);
        Ok(())
    }

    /// A session takes one depth data output
    pub fn can_add_output(&self, _output: &DepthDataOutput) -> bool {
        self.depth_output.is_none()
    }

    /// Add the output and return it for further setup
    pub fn add_output(
        &mut self,
        mut output: DepthDataOutput,
    ) -> Result<&mut DepthDataOutput, CaptureError> {
        self.ensure_configuring()?;
        if !self.can_add_output(&output) {
            return Err(CaptureError::OutputRejected);
        }
        if let Some(input) = self.input.as_ref() {
            output.attach(input.device());
        }
        Ok(self.depth_output.insert(output))
    }

    pub fn depth_output(&self) -> Option<&DepthDataOutput> {
        self.depth_output.as_ref()
    }

    /// Open the input's depth stream and start delivering frames
    pub fn start_running(&mut self) -> Result<(), CaptureError> {
        if self.state != SessionState::Configured {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                to: SessionState::Running,
            });
        }
        let input = self.input.as_ref().ok_or(CaptureError::NoInput)?;

        let delivery = self.depth_output.as_mut().and_then(|output| {
            let connection = output.connection(MediaType::DepthData)?.enabled_flag();
            let settings = PipelineSettings {
                filtering_enabled: output.is_filtering_enabled(),
                discards_late_depth_data: output.discards_late_depth_data(),
                connection_enabled: connection,
            };
            output.take_delegate().map(|registration| (registration, settings))
        });

        match delivery {
            Some((registration, settings)) => {
                let stream = input.device().open_depth_stream()?;
                self.pipeline = Some(DepthPipeline::start(
                    stream,
                    registration,
                    settings,
                    Arc::clone(&self.stats),
                )?);
            }
            None => tracing::warn!("Session has no depth connection or delegate, nothing will be delivered"),
        }

        self.transition(SessionState::Configured, SessionState::Running)?;
        tracing::info!("Capture session running");
        Ok(())
    }

    /// Stop delivery and join the session's threads
    pub fn stop_running(&mut self) -> Result<(), CaptureError> {
        self.transition(SessionState::Running, SessionState::Stopped)?;
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
        }

        let (delivered, dropped) = self.stats();
        tracing::info!(
            "Capture session stopped: {} frames delivered, {} dropped",
            delivered,
            dropped
        );
        Ok(())
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop_running();
        }
    }
}

/// Build a session delivering depth for a device already configured with
/// `format` and `depth_format`
///
/// The returned session is configured but not started.
pub fn build_session<D: DepthDataDelegate>(
    device: Arc<dyn CaptureDevice>,
    format: &CaptureFormat,
    depth_format: &DepthFormat,
    delegate: D,
    options: &SessionOptions,
) -> Result<CaptureSession, CaptureError> {
    if device.active_format().as_ref() != Some(format)
        || device.active_depth_format().as_ref() != Some(depth_format)
    {
        return Err(CaptureError::FormatMismatch);
    }

    let mut session = CaptureSession::new();
    session.begin_configuration()?;
    session.set_preset(options.preset)?;

    let input = DeviceInput::new(device);
    if !session.can_add_input(&input) {
        return Err(CaptureError::InputRejected);
    }
    session.add_input(input)?;

    let output = session.add_output(DepthDataOutput::new())?;
    output.set_delegate(delegate, &options.queue_label);
    output.set_filtering_enabled(options.filtering_enabled);
    output.set_discards_late_depth_data(options.discards_late_depth_data);
    output
        .connection(MediaType::DepthData)
        .ok_or(CaptureError::NoDepthConnection)?
        .set_enabled(true);

    session.commit_configuration()?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{
        configure_device, select_format, DepthEncoding, DepthFrame, Dimensions,
        SimulatedDualCamera, SimulatedScene, VideoEncoding,
    };
    use std::time::Duration;

    fn create_test_device(frame_limit: u64) -> (Arc<dyn CaptureDevice>, CaptureFormat, DepthFormat) {
        let camera = SimulatedDualCamera::new("sim").with_scene(SimulatedScene {
            paced: false,
            frame_limit: Some(frame_limit),
        });
        let (format, depth) = select_format(&camera).unwrap();
        configure_device(&camera, &format, &depth).unwrap();
        (Arc::new(camera), format, depth)
    }

    fn create_small_test_device(frame_limit: u64) -> (Arc<dyn CaptureDevice>, CaptureFormat, DepthFormat) {
        let small = CaptureFormat {
            dimensions: Dimensions::new(640, 480),
            encoding: VideoEncoding::YCbCr420BiPlanarFullRange,
            max_frame_rate: 30.0,
            supported_depth_formats: vec![DepthFormat::new(64, 48, DepthEncoding::DepthFloat32)],
        };
        let camera = SimulatedDualCamera::new("small")
            .with_formats(vec![small])
            .with_scene(SimulatedScene {
                paced: false,
                frame_limit: Some(frame_limit),
            });
        let (format, depth) = select_format(&camera).unwrap();
        configure_device(&camera, &format, &depth).unwrap();
        (Arc::new(camera), format, depth)
    }

    fn create_lossless_options() -> SessionOptions {
        SessionOptions {
            discards_late_depth_data: false,
            ..SessionOptions::default()
        }
    }

    fn collect_frames(limit: u64) -> (CaptureSession, flume::Receiver<DepthFrame>) {
        let (device, format, depth) = create_test_device(limit);
        let (tx, rx) = flume::unbounded();
        let session = build_session(
            device,
            &format,
            &depth,
            move |frame: DepthFrame| {
                let _ = tx.send(frame);
            },
            &create_lossless_options(),
        )
        .unwrap();
        (session, rx)
    }

    #[test]
    fn test_build_session_is_configured_with_photo_preset() {
        let (session, _rx) = collect_frames(1);
        assert_eq!(session.state(), SessionState::Configured);
        assert_eq!(session.preset(), SessionPreset::Photo);

        let output = session.depth_output().unwrap();
        assert!(!output.is_filtering_enabled());
        assert!(output.has_delegate());
        assert!(output.connection(MediaType::DepthData).unwrap().is_enabled());
    }

    #[test]
    fn test_running_session_delivers_frames_in_order() {
        let (mut session, rx) = collect_frames(10);
        session.start_running().unwrap();

        let sequences: Vec<u64> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().sequence)
            .collect();
        session.stop_running().unwrap();

        assert_eq!(sequences, (0..10).collect::<Vec<_>>());
        assert_eq!(session.stats(), (10, 0));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_disabled_connection_delivers_nothing() {
        let (mut session, rx) = collect_frames(5);
        session
            .depth_output()
            .unwrap()
            .connection(MediaType::DepthData)
            .unwrap()
            .set_enabled(false);

        session.start_running().unwrap();
        session.stop_running().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_build_session_rejects_unconfigured_device() {
        let camera = SimulatedDualCamera::new("sim");
        let (format, depth) = select_format(&camera).unwrap();

        let result = build_session(
            Arc::new(camera),
            &format,
            &depth,
            |_: DepthFrame| {},
            &SessionOptions::default(),
        );
        assert!(matches!(result, Err(CaptureError::FormatMismatch)));
    }

    #[test]
    fn test_build_session_rejects_input_without_preset() {
        let camera = SimulatedDualCamera::new("sim").without_preset(SessionPreset::Photo);
        let (format, depth) = select_format(&camera).unwrap();
        configure_device(&camera, &format, &depth).unwrap();

        let result = build_session(
            Arc::new(camera),
            &format,
            &depth,
            |_: DepthFrame| {},
            &SessionOptions::default(),
        );
        assert!(matches!(result, Err(CaptureError::InputRejected)));
    }

    #[test]
    fn test_output_without_depth_format_has_no_connection() {
        let camera: Arc<dyn CaptureDevice> = Arc::new(SimulatedDualCamera::new("sim"));
        let mut session = CaptureSession::new();
        session.begin_configuration().unwrap();
        session.add_input(DeviceInput::new(camera)).unwrap();

        let output = session.add_output(DepthDataOutput::new()).unwrap();
        assert!(output.connection(MediaType::DepthData).is_none());
    }

    #[test]
    fn test_second_input_and_output_are_rejected() {
        let (device, _, _) = create_test_device(1);
        let mut session = CaptureSession::new();
        session.begin_configuration().unwrap();
        session.add_input(DeviceInput::new(Arc::clone(&device))).unwrap();
        session.add_output(DepthDataOutput::new()).unwrap();

        assert!(matches!(
            session.add_input(DeviceInput::new(device)),
            Err(CaptureError::InputRejected)
        ));
        assert!(matches!(
            session.add_output(DepthDataOutput::new()),
            Err(CaptureError::OutputRejected)
        ));
    }

    #[test]
    fn test_connection_forms_when_input_added_after_output() {
        let (device, _, _) = create_test_device(1);
        let mut session = CaptureSession::new();
        session.begin_configuration().unwrap();
        session.add_output(DepthDataOutput::new()).unwrap();
        session.add_input(DeviceInput::new(device)).unwrap();

        let output = session.depth_output().unwrap();
        assert!(output.connection(MediaType::DepthData).is_some());
    }

    #[test]
    fn test_state_machine_rejects_invalid_transitions() {
        let mut session = CaptureSession::new();
        assert!(session.commit_configuration().is_err());
        assert!(session.start_running().is_err());
        assert!(matches!(
            session.set_preset(SessionPreset::Photo),
            Err(CaptureError::NotConfiguring(SessionState::Unconfigured))
        ));

        session.begin_configuration().unwrap();
        assert!(session.begin_configuration().is_err());
        assert!(session.stop_running().is_err());
        session.commit_configuration().unwrap();

        assert!(matches!(
            session.add_output(DepthDataOutput::new()),
            Err(CaptureError::NotConfiguring(SessionState::Configured))
        ));
        assert!(matches!(session.start_running(), Err(CaptureError::NoInput)));
    }

    #[test]
    fn test_stopped_session_cannot_restart() {
        let (mut session, _rx) = collect_frames(1);
        session.start_running().unwrap();
        session.stop_running().unwrap();

        assert!(matches!(
            session.start_running(),
            Err(CaptureError::InvalidTransition {
                from: SessionState::Stopped,
                to: SessionState::Running
            })
        ));
        assert!(session.begin_configuration().is_err());
    }

    #[test]
    fn test_filtering_fills_occlusion_band() {
        let (device, format, depth) = create_test_device(1);
        let (tx, rx) = flume::unbounded();
        let options = SessionOptions {
            filtering_enabled: true,
            ..SessionOptions::default()
        };
        let mut session = build_session(
            device,
            &format,
            &depth,
            move |frame: DepthFrame| {
                let _ = tx.send(frame);
            },
            &options,
        )
        .unwrap();
        session.start_running().unwrap();

        let frame = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // Column 1 borders finite column 2; column 0 only borders holes
        assert!(frame.depth_map.get(1, 10).unwrap().is_finite());
        assert!(frame.depth_map.get(0, 10).unwrap().is_nan());
    }

    #[test]
    fn test_unfiltered_frames_keep_holes() {
        let (mut session, rx) = collect_frames(1);
        session.start_running().unwrap();

        let frame = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(frame.depth_map.get(1, 10).unwrap().is_nan());
    }

    #[test]
    fn test_default_session_discards_late_frames() {
        let (device, format, depth) = create_small_test_device(10);
        let mut session = build_session(
            device,
            &format,
            &depth,
            |_: DepthFrame| std::thread::sleep(Duration::from_millis(50)),
            &SessionOptions::default(),
        )
        .unwrap();
        assert!(session.depth_output().unwrap().discards_late_depth_data());

        session.start_running().unwrap();
        // Let the stream run out before stopping
        std::thread::sleep(Duration::from_millis(400));
        session.stop_running().unwrap();

        let (delivered, dropped) = session.stats();
        assert_eq!(delivered + dropped, 10);
        assert!(dropped > 0);
    }

    #[test]
    fn test_keeping_late_frames_delivers_every_frame() {
        let (device, format, depth) = create_small_test_device(10);
        let (tx, rx) = flume::unbounded();
        let mut session = build_session(
            device,
            &format,
            &depth,
            move |frame: DepthFrame| {
                std::thread::sleep(Duration::from_millis(20));
                let _ = tx.send(frame.sequence);
            },
            &create_lossless_options(),
        )
        .unwrap();

        session.start_running().unwrap();
        let sequences: Vec<u64> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        session.stop_running().unwrap();

        assert_eq!(sequences, (0..10).collect::<Vec<_>>());
        assert_eq!(session.stats(), (10, 0));
    }

    #[test]
    fn test_delegate_runs_serially_on_depth_queue() {
        use std::sync::atomic::{AtomicBool, AtomicU64};

        let (device, format, depth) = create_small_test_device(20);
        let in_flight = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicU64::new(0));
        let (tx, rx) = flume::unbounded();

        let delegate_in_flight = Arc::clone(&in_flight);
        let delegate_overlaps = Arc::clone(&overlaps);
        let delegate = move |frame: DepthFrame| {
            if delegate_in_flight.swap(true, Ordering::AcqRel) {
                delegate_overlaps.fetch_add(1, Ordering::Relaxed);
            }
            std::thread::sleep(Duration::from_millis(2));
            let thread = std::thread::current();
            let _ = tx.send((frame.sequence, thread.id(), thread.name().map(str::to_string)));
            delegate_in_flight.store(false, Ordering::Release);
        };

        let mut session =
            build_session(device, &format, &depth, delegate, &create_lossless_options()).unwrap();
        session.start_running().unwrap();
        let calls: Vec<_> = (0..20)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        session.stop_running().unwrap();

        assert_eq!(overlaps.load(Ordering::Relaxed), 0);
        let sequences: Vec<u64> = calls.iter().map(|call| call.0).collect();
        assert_eq!(sequences, (0..20).collect::<Vec<_>>());
        assert!(calls.iter().all(|call| call.1 == calls[0].1));
        assert!(calls
            .iter()
            .all(|call| call.2.as_deref() == Some("depth queue")));
    }

    #[test]
    fn test_stop_returns_while_delegate_is_behind() {
        let (device, format, depth) = create_small_test_device(1_000);
        let mut session = build_session(
            device,
            &format,
            &depth,
            |_: DepthFrame| std::thread::sleep(Duration::from_millis(30)),
            &create_lossless_options(),
        )
        .unwrap();
        session.start_running().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let (done_tx, done_rx) = flume::bounded(1);
        std::thread::spawn(move || {
            session.stop_running().unwrap();
            let _ = done_tx.send(session.stats());
        });

        let (delivered, dropped) = done_rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert!(delivered < 1_000);
        assert_eq!(dropped, 0);
    }
}
