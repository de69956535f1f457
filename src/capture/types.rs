use std::fmt;
use std::time::Duration;

/// Kind of physical camera a device represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    BuiltInDualCamera,
    BuiltInWideAngleCamera,
}

/// Which side of the host the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePosition {
    Back,
    Front,
    /// Matches any position when used in a discovery query
    Unspecified,
}

/// Media a device can produce or a connection carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Video,
    DepthData,
}

/// Session quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPreset {
    /// Full sensor resolution, suitable for stills
    Photo,
    High,
}

/// Pixel encoding of the video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEncoding {
    YCbCr420BiPlanarFullRange,
}

/// Per-pixel encoding of a depth map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthEncoding {
    /// Distance from the camera in meters
    DepthFloat32,
    /// Inverse distance in 1/meters
    DisparityFloat32,
    DepthFloat16,
    DisparityFloat16,
}

impl DepthEncoding {
    pub fn is_disparity(self) -> bool {
        matches!(self, Self::DisparityFloat32 | Self::DisparityFloat16)
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A depth encoding at a given resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthFormat {
    pub dimensions: Dimensions,
    pub encoding: DepthEncoding,
}

impl DepthFormat {
    pub const fn new(width: u32, height: u32, encoding: DepthEncoding) -> Self {
        Self {
            dimensions: Dimensions::new(width, height),
            encoding,
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }
}

impl fmt::Display for DepthFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.dimensions, self.encoding)
    }
}

/// A video resolution/encoding pair and the depth formats it can run alongside
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFormat {
    pub dimensions: Dimensions,
    pub encoding: VideoEncoding,
    pub max_frame_rate: f64,
    pub supported_depth_formats: Vec<DepthFormat>,
}

impl CaptureFormat {
    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    /// Depth formats of this capture format with the given encoding
    pub fn depth_formats_with(&self, encoding: DepthEncoding) -> impl Iterator<Item = &DepthFormat> {
        self.supported_depth_formats
            .iter()
            .filter(move |d| d.encoding == encoding)
    }

    pub fn supports_depth(&self, depth_format: &DepthFormat) -> bool {
        self.supported_depth_formats.contains(depth_format)
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} @{:.0}fps ({} depth formats)",
            self.dimensions,
            self.encoding,
            self.max_frame_rate,
            self.supported_depth_formats.len()
        )
    }
}

/// Row-major depth or disparity samples
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    pub width: u32,
    pub height: u32,
    pub encoding: DepthEncoding,
    pub data: Vec<f32>,
}

impl DepthMap {
    pub fn new(width: u32, height: u32, encoding: DepthEncoding, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            encoding,
            data,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sample at column `x`, row `y`; `None` outside the map
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// One depth sample delivered by a running session
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub depth_map: DepthMap,
    /// Presentation time relative to the start of the stream
    pub timestamp: Duration,
    pub sequence: u64,
}
