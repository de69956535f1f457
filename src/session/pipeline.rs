use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{SendTimeoutError, Sender, TrySendError};

use super::output::DelegateRegistration;
use crate::capture::{DepthFrame, DepthStream};
use crate::error::CaptureError;

// How long a blocked hand-off waits before checking for stop again
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Default)]
pub(super) struct Stats {
    pub delivered: AtomicU64,
    pub dropped: AtomicU64,
}

pub(super) struct PipelineSettings {
    pub filtering_enabled: bool,
    pub discards_late_depth_data: bool,
    pub connection_enabled: Arc<AtomicBool>,
}

/// Capture thread feeding a serial delivery queue
///
/// The capture thread pulls frames from the device stream. At most one frame
/// is in flight between the two threads.
pub(super) struct DepthPipeline {
    stop_signal: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
    delivery_thread: Option<JoinHandle<()>>,
    queue_label: String,
}

impl DepthPipeline {
    pub fn start(
        mut stream: Box<dyn DepthStream>,
        registration: DelegateRegistration,
        settings: PipelineSettings,
        stats: Arc<Stats>,
    ) -> Result<Self, CaptureError> {
        let DelegateRegistration {
            mut delegate,
            queue_label,
        } = registration;
        let (tx, rx) = flume::bounded(1);
        let stop_signal = Arc::new(AtomicBool::new(false));

        let delivery_stats = Arc::clone(&stats);
        let delivery_thread = thread::Builder::new()
            .name(queue_label.clone())
            .spawn(move || {
                for frame in rx.iter() {
                    delegate.depth_data_output(frame);
                    delivery_stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
            })
            .map_err(|source| CaptureError::Spawn {
                name: queue_label.clone(),
                source,
            })?;

        let capture_stop = Arc::clone(&stop_signal);
        let capture_label = queue_label.clone();
        let capture_thread = thread::Builder::new()
            .name("depth capture".to_string())
            .spawn(move || {
                tracing::debug!("Depth capture thread started for {}", capture_label);

                while !capture_stop.load(Ordering::Acquire) {
                    let Some(mut frame) = stream.next_frame() else {
                        tracing::info!("Depth stream ended");
                        break;
                    };

                    if !settings.connection_enabled.load(Ordering::Acquire) {
                        continue;
                    }
                    if settings.filtering_enabled {
                        frame.depth_map.fill_holes();
                    }

                    if settings.discards_late_depth_data {
                        match tx.try_send(frame) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                stats.dropped.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(TrySendError::Disconnected(_)) => break,
                        }
                    } else if !forward(&tx, frame, &capture_stop) {
                        break;
                    }
                }

                tracing::debug!("Depth capture thread exiting");
            });

        let capture_thread = match capture_thread {
            Ok(handle) => handle,
            Err(source) => {
                // The sender went down with the closure, so the queue drains and exits
                let _ = delivery_thread.join();
                return Err(CaptureError::Spawn {
                    name: "depth capture".to_string(),
                    source,
                });
            }
        };

        tracing::info!("Depth delivery started on \"{}\"", queue_label);

        Ok(Self {
            stop_signal,
            capture_thread: Some(capture_thread),
            delivery_thread: Some(delivery_thread),
            queue_label,
        })
    }

    /// Signal both threads and wait for them to finish
    ///
    /// Frames already handed to the queue are still delivered.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Release);

        if let Some(handle) = self.capture_thread.take() {
            if handle.join().is_err() {
                tracing::warn!("Depth capture thread panicked");
            }
        }
        if let Some(handle) = self.delivery_thread.take() {
            if handle.join().is_err() {
                tracing::warn!("Delegate on \"{}\" panicked", self.queue_label);
            }
        }

        tracing::debug!("Depth delivery on \"{}\" stopped", self.queue_label);
    }
}

/// Wait for the queue to take `frame`, giving up once stop is signalled
///
/// Returns false when the frame was not handed over.
fn forward(tx: &Sender<DepthFrame>, mut frame: DepthFrame, stop_signal: &AtomicBool) -> bool {
    loop {
        match tx.send_timeout(frame, STOP_POLL_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(pending)) => {
                if stop_signal.load(Ordering::Acquire) {
                    return false;
                }
                frame = pending;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

impl Drop for DepthPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
