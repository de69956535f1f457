use thiserror::Error;

use crate::session::SessionState;

/// Configuration-time capability mismatches and session misuse
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no capture device matches the discovery query")]
    NoDeviceFound,

    #[error("no capture format offers 32-bit float depth")]
    NoDepthCapableFormat,

    #[error("capture format {0} has no 32-bit float depth format")]
    NoFloat32DepthFormat(String),

    #[error("device {0} could not be locked for configuration")]
    DeviceLocked(String),

    #[error("device {0} is not locked for configuration")]
    NotLocked(String),

    #[error("device does not support {0}")]
    UnsupportedFormat(String),

    #[error("device active formats do not match the selected pair")]
    FormatMismatch,

    #[error("session rejected the device input")]
    InputRejected,

    #[error("session rejected the depth data output")]
    OutputRejected,

    #[error("depth data output has no depth connection")]
    NoDepthConnection,

    #[error("session cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("session is not being configured (state {0:?})")]
    NotConfiguring(SessionState),

    #[error("session has no device input")]
    NoInput,

    #[error("depth stream failed: {0}")]
    Stream(String),

    #[error("failed to spawn {name} thread")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures converting a single depth map; the frame is dropped
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("cannot convert depth data to {0:?}")]
    Unsupported(crate::capture::DepthEncoding),

    #[error("depth map holds {actual} samples, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}
