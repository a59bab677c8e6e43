use crate::capture::CaptureError;
use crate::output::PersistError;
use crate::store::StoreError;

/// Errors reported by the recording controller.
///
/// Precondition errors are returned synchronously and have no side effects.
/// Finalize and persist errors arrive later through the controller's notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    NoMessageSelected,
    /// The camera was never opened for this view.
    NoActiveStream,
    AlreadyRecording,
    NotRecording,
    /// Camera or microphone acquisition failed. Not retried automatically.
    DeviceUnavailable(String),
    Capture(CaptureError),
    PersistFailed(String),
    FilesystemWriteError(String),
    NothingToRetry,
    Store(StoreError),
}

impl ControllerError {
    /// The recording exists in memory but could not be stored; `retry_persist` applies.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            ControllerError::PersistFailed(_) | ControllerError::FilesystemWriteError(_)
        )
    }
}

impl std::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerError::NoMessageSelected => write!(f, "No message selected"),
            ControllerError::NoActiveStream => write!(f, "Camera has not been opened"),
            ControllerError::AlreadyRecording => write!(f, "A recording is already in progress"),
            ControllerError::NotRecording => write!(f, "Not recording"),
            ControllerError::DeviceUnavailable(e) => write!(f, "Camera unavailable: {}", e),
            ControllerError::Capture(e) => write!(f, "{}", e),
            ControllerError::PersistFailed(e) => write!(f, "Failed to save recording: {}", e),
            ControllerError::FilesystemWriteError(e) => {
                write!(f, "Failed to write recording to the gallery: {}", e)
            }
            ControllerError::NothingToRetry => write!(f, "No unsaved recording to retry"),
            ControllerError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<CaptureError> for ControllerError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::DeviceUnavailable(reason) => ControllerError::DeviceUnavailable(reason),
            CaptureError::NoActiveStream => ControllerError::NoActiveStream,
            CaptureError::NotRecording => ControllerError::NotRecording,
            other => ControllerError::Capture(other),
        }
    }
}

impl From<PersistError> for ControllerError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::PersistFailed(e) => ControllerError::PersistFailed(e),
            PersistError::FilesystemWriteError(e) => ControllerError::FilesystemWriteError(e),
        }
    }
}

impl From<StoreError> for ControllerError {
    fn from(err: StoreError) -> Self {
        ControllerError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_errors_map_onto_the_controller_taxonomy() {
        assert_eq!(
            ControllerError::from(CaptureError::DeviceUnavailable("denied".into())),
            ControllerError::DeviceUnavailable("denied".into())
        );
        assert_eq!(
            ControllerError::from(CaptureError::NoActiveStream),
            ControllerError::NoActiveStream
        );
        assert_eq!(
            ControllerError::from(CaptureError::RecorderBusy),
            ControllerError::Capture(CaptureError::RecorderBusy)
        );
    }

    #[test]
    fn only_persist_errors_are_retryable() {
        assert!(ControllerError::from(PersistError::FilesystemWriteError("full".into())).is_persistence());
        assert!(ControllerError::PersistFailed("blocked".into()).is_persistence());
        assert!(!ControllerError::NotRecording.is_persistence());
    }
}
