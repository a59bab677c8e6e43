//! Camera/microphone capture
//!
//! A `CaptureDevice` is the platform bridge (browser media devices, a native
//! camera plugin, or the synthetic camera). `MediaCaptureSession` owns one
//! device, the live stream, and the chunk buffer of the current recording.

mod session;
mod synthetic;

pub use session::{FinalizeTicket, MediaCaptureSession, RecorderHandle, RecorderState};
pub use synthetic::SyntheticCamera;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Which camera to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    User,
    Environment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub facing: FacingMode,
    pub audio: bool,
}

impl Default for CaptureConstraints {
    /// Front-facing camera with audio: the reader looks at the screen.
    fn default() -> Self {
        Self {
            facing: FacingMode::User,
            audio: true,
        }
    }
}

/// Opaque handle to a live audio+video input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub id: Uuid,
    pub label: String,
}

/// Container the device encodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerFormat {
    #[default]
    WebM,
    Mp4,
}

impl ContainerFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::WebM => "video/webm",
            ContainerFormat::Mp4 => "video/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::WebM => "webm",
            ContainerFormat::Mp4 => "mp4",
        }
    }
}

/// Finalized recording: every chunk concatenated in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub bytes: Vec<u8>,
    pub container: ContainerFormat,
}

impl MediaBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Output of a running encoder. `Stopped` is the finalize signal and must
/// come after the last `Data` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    Data(Vec<u8>),
    Stopped,
    Failed(String),
}

pub type EncoderSender = mpsc::UnboundedSender<EncoderEvent>;

/// Errors that can occur while capturing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No compatible camera/microphone, or permission denied.
    DeviceUnavailable(String),
    NoActiveStream,
    RecorderBusy,
    NotRecording,
    EncoderFailed(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::DeviceUnavailable(e) => write!(f, "Camera unavailable: {}", e),
            CaptureError::NoActiveStream => write!(f, "No active camera stream"),
            CaptureError::RecorderBusy => write!(f, "Recorder is already running"),
            CaptureError::NotRecording => write!(f, "Recorder is not running"),
            CaptureError::EncoderFailed(e) => write!(f, "Encoder failed: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Platform bridge to a camera and its encoder.
///
/// Implementations must not block: encoding happens elsewhere and is
/// reported through the `EncoderSender`.
pub trait CaptureDevice: Send + 'static {
    fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<StreamHandle, CaptureError>;

    /// Begin encoding `stream`. Chunks and the final `Stopped` go to `events`.
    fn start_encoder(
        &mut self,
        stream: &StreamHandle,
        events: EncoderSender,
    ) -> Result<(), CaptureError>;

    /// Ask the encoder to flush and emit `Stopped`. Returns immediately.
    fn stop_encoder(&mut self);

    fn release(&mut self, stream: &StreamHandle);

    fn container(&self) -> ContainerFormat {
        ContainerFormat::WebM
    }
}
