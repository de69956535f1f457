pub mod capture;
pub mod depth;
pub mod error;
pub mod output;
pub mod presenter;
pub mod session;

pub use error::{CaptureError, ConversionError};
