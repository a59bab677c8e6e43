//! Teleprompter recording core.
//!
//! A `RecordingController` ties a camera capture session to a scroll clock
//! so the transcript moves only while the camera records, then stores the
//! finished video through the output sink chosen for the platform.

pub mod capture;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod output;
pub mod platform;
pub mod scroll;
pub mod settings;
pub mod state_machine;
pub mod store;

pub use capture::{
    CaptureConstraints, CaptureDevice, CaptureError, ContainerFormat, FacingMode, MediaBlob,
    MediaCaptureSession, SyntheticCamera,
};
pub use controller::{Notice, RecordingController, SessionOutcome, UiState};
pub use error::ControllerError;
pub use output::{OutputSink, OutputSinks, OutputTarget, PersistError};
pub use platform::{FixedPlatform, HostPlatform, Platform, PlatformProbe};
pub use scroll::ScrollClock;
pub use settings::AppSettings;
pub use store::{InMemoryMessageStore, JsonMessageStore, Message, MessageId, MessageStore, StoreError};

/// Install the process logger. Debug builds log at debug, release builds at
/// info; `RUST_LOG` overrides both. Safe to call more than once.
pub fn init_logging() {
    let default_level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
