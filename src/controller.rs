//! Recording controller
//!
//! Owns the capture session, the scroll clock and the output sinks, and
//! drives them through the reducer in `state_machine`. Effects that finish
//! later (finalize, persist) run as tasks and report back through a channel
//! drained by `settle()` or `pump()`.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::capture::{CaptureConstraints, CaptureDevice, MediaCaptureSession, StreamHandle};
use crate::error::ControllerError;
use crate::metrics::MetricsCollector;
use crate::output::{recording_file_name, unix_millis, OutputSinks, OutputTarget};
use crate::platform::{HostPlatform, PlatformProbe};
use crate::scroll::ScrollClock;
use crate::settings::AppSettings;
use crate::state_machine::{reduce, CameraStatus, Effect, Event, PendingArtifact, State};
use crate::store::{Message, MessageId, MessageStore};

/// UI-facing state. Tagged union: { "status": "idle" } or
/// { "status": "recording", "elapsedSecs": 5, "title": "Intro" }
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UiState {
    Idle,
    Recording {
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: u64,
        title: String,
    },
    Finalizing {
        title: String,
    },
}

fn state_to_ui(state: &State) -> UiState {
    match state {
        State::Idle => UiState::Idle,
        State::Recording {
            message,
            started_at,
            ..
        } => UiState::Recording {
            elapsed_secs: started_at.elapsed().as_secs(),
            title: message.title.clone(),
        },
        State::Finalizing { message, .. } => UiState::Finalizing {
            title: message.title.clone(),
        },
    }
}

/// Everything observable about a session, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    StateChanged(UiState),
    RecorderStarted { session_id: Uuid },
    ScrollStarted { session_id: Uuid, speed: f64 },
    ScrollStopped { session_id: Uuid, position: f64 },
    RecorderStopRequested { session_id: Uuid },
    Finalized { session_id: Uuid, bytes: usize },
    Saved { session_id: Uuid, location: PathBuf },
    /// The recording exists but could not be stored; see `retry_persist`.
    SaveFailed { session_id: Uuid, error: ControllerError },
    SessionFailed { session_id: Uuid, error: ControllerError },
}

/// How a finished session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Saved { session_id: Uuid, location: PathBuf },
    Failed { session_id: Uuid, error: ControllerError },
}

pub struct RecordingController {
    state: State,
    capture: MediaCaptureSession,
    constraints: CaptureConstraints,
    camera: CameraStatus,
    clock: ScrollClock,
    speed: f64,
    selected: Option<Message>,
    sinks: OutputSinks,
    platform: Arc<dyn PlatformProbe>,
    tx: mpsc::Sender<Event>,
    rx: mpsc::Receiver<Event>,
    /// Spawned finalize/persist tasks that have not reported back yet
    in_flight: usize,
    retry: Option<PendingArtifact>,
    subscribers: Vec<mpsc::UnboundedSender<Notice>>,
    outcomes: Vec<SessionOutcome>,
    metrics: MetricsCollector,
}

impl RecordingController {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        sinks: OutputSinks,
        platform: Arc<dyn PlatformProbe>,
        settings: &AppSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<Event>(32);
        let tick_interval = Duration::from_millis(settings.tick_interval_ms.max(1));
        // An invalid configured speed falls back to the clock's default.
        let clock = ScrollClock::new(tick_interval, settings.scroll_speed);
        let speed = clock.speed();

        Self {
            state: State::default(),
            capture: MediaCaptureSession::new(device),
            constraints: CaptureConstraints::default(),
            camera: CameraStatus::Closed,
            clock,
            speed,
            selected: None,
            sinks,
            platform,
            tx,
            rx,
            in_flight: 0,
            retry: None,
            subscribers: Vec::new(),
            outcomes: Vec::new(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Controller wired from settings: host platform detection and the
    /// configured download/gallery locations.
    pub fn from_settings(device: Box<dyn CaptureDevice>, settings: &AppSettings) -> Self {
        Self::new(
            device,
            OutputSinks::from_settings(settings),
            Arc::new(HostPlatform::new(settings.platform_override)),
            settings,
        )
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn ui_state(&self) -> UiState {
        state_to_ui(&self.state)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    pub fn capture(&self) -> &MediaCaptureSession {
        &self.capture
    }

    pub fn camera_status(&self) -> &CameraStatus {
        &self.camera
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn pending_retry(&self) -> Option<&PendingArtifact> {
        self.retry.as_ref()
    }

    /// Receive every notice from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Notice> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    // ------------------------------------------------------------------
    // Camera
    // ------------------------------------------------------------------

    /// Acquire the camera for this view. Failure is reported, not retried.
    pub fn open_camera(&mut self) -> Result<StreamHandle, ControllerError> {
        match self.capture.open(&self.constraints) {
            Ok(stream) => {
                self.camera = CameraStatus::Open;
                Ok(stream)
            }
            Err(e) => {
                log::error!("Camera acquisition failed: {}", e);
                self.camera = CameraStatus::Failed(e.to_string());
                self.metrics.record_error(e.to_string(), None);
                Err(e.into())
            }
        }
    }

    /// Release the camera. Refused while a session is active.
    pub fn close_camera(&mut self) -> Result<(), ControllerError> {
        if !self.is_idle() {
            return Err(ControllerError::AlreadyRecording);
        }
        self.capture.close();
        self.camera = CameraStatus::Closed;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Selection and speed
    // ------------------------------------------------------------------

    /// Choose the script for the next recording. A running session keeps
    /// the message it started with.
    pub fn select(&mut self, message: Option<Message>) {
        self.selected = message;
    }

    pub fn select_by_id(
        &mut self,
        store: &dyn MessageStore,
        id: MessageId,
    ) -> Result<&Message, ControllerError> {
        let found = store.get_by_id(id)?;
        self.selected = found;
        self.selected
            .as_ref()
            .ok_or(ControllerError::Store(crate::store::StoreError::NotFound(id)))
    }

    pub fn selected(&self) -> Option<&Message> {
        self.selected.as_ref()
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Applies to the running clock immediately. Ignored unless positive.
    pub fn set_speed(&mut self, speed: f64) -> bool {
        if !self.clock.set_speed(speed) {
            return false;
        }
        self.speed = speed;
        true
    }

    pub fn scroll_position(&self) -> f64 {
        self.clock.position()
    }

    /// Scroll positions for the transcript viewport. One stream serves every
    /// session of this controller; it drops back to 0 when a session starts.
    pub fn scroll_positions(&self) -> watch::Receiver<f64> {
        self.clock.subscribe()
    }

    pub fn scroll_clock(&self) -> &ScrollClock {
        &self.clock
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Start recording the selected message. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<Uuid, ControllerError> {
        // Resolved once per session; never re-queried mid-session.
        let target = OutputTarget::for_platform(self.platform.platform());

        self.dispatch(Event::Start {
            message: self.selected.clone(),
            camera: self.camera.clone(),
            target,
            speed: self.speed,
        })?;

        self.state
            .session_id()
            .ok_or(ControllerError::NotRecording)
    }

    /// Stop recording. The session stays in Finalizing until the encoder
    /// flushes; `settle()` waits for that and for the file to be stored.
    pub fn stop(&mut self) -> Result<(), ControllerError> {
        self.dispatch(Event::Stop)
    }

    /// Process completion events until no finalize or persist work is left.
    pub async fn settle(&mut self) -> Vec<SessionOutcome> {
        while self.in_flight > 0 {
            let Some(event) = self.rx.recv().await else {
                break;
            };
            self.in_flight -= 1;
            if let Err(e) = self.dispatch(event) {
                log::warn!("Completion event rejected: {}", e);
            }
        }
        std::mem::take(&mut self.outcomes)
    }

    /// Process whatever completion events are ready, without waiting.
    pub fn pump(&mut self) -> Vec<SessionOutcome> {
        while let Ok(event) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            if let Err(e) = self.dispatch(event) {
                log::warn!("Completion event rejected: {}", e);
            }
        }
        std::mem::take(&mut self.outcomes)
    }

    /// Store the last recording whose persistence failed, without re-recording.
    pub async fn retry_persist(&mut self) -> Result<PathBuf, ControllerError> {
        let artifact = self.retry.take().ok_or(ControllerError::NothingToRetry)?;
        let sink = self.sinks.select(artifact.target);

        log::info!(
            "Retrying save of session {} as {}",
            artifact.session_id,
            artifact.file_name
        );

        match sink.persist(&artifact.blob, &artifact.file_name).await {
            Ok(location) => {
                self.metrics.retry_succeeded(artifact.session_id);
                self.notify(Notice::Saved {
                    session_id: artifact.session_id,
                    location: location.clone(),
                });
                Ok(location)
            }
            Err(e) => {
                let error = ControllerError::from(e);
                log::error!("Retry of session {} failed: {}", artifact.session_id, error);
                self.metrics
                    .record_error(error.to_string(), Some(artifact.session_id.to_string()));
                self.notify(Notice::SaveFailed {
                    session_id: artifact.session_id,
                    error: error.clone(),
                });
                self.retry = Some(artifact);
                Err(error)
            }
        }
    }

    /// View teardown: finish an active session, then release the camera.
    pub async fn shutdown(&mut self) -> Vec<SessionOutcome> {
        if matches!(self.state, State::Recording { .. }) {
            if let Err(e) = self.stop() {
                log::warn!("Shutdown: stop failed: {}", e);
            }
        }
        let outcomes = self.settle().await;
        self.clock.stop();
        self.capture.close();
        self.camera = CameraStatus::Closed;
        log::info!("Recording controller shut down");
        outcomes
    }

    // ------------------------------------------------------------------
    // Reducer plumbing
    // ------------------------------------------------------------------

    fn dispatch(&mut self, event: Event) -> Result<(), ControllerError> {
        let (next, effects) = reduce(&self.state, event).map_err(|e| {
            log::warn!("Rejected in {:?}: {}", std::mem::discriminant(&self.state), e);
            e
        })?;

        if std::mem::discriminant(&self.state) != std::mem::discriminant(&next) {
            log::info!("State transition: {:?} -> {:?}", self.state, next);
        }
        self.state = next;

        // Effects run strictly in order; a failing effect cancels the rest.
        for effect in effects {
            self.execute(effect)?;
        }
        Ok(())
    }

    fn execute(&mut self, effect: Effect) -> Result<(), ControllerError> {
        match effect {
            Effect::StartRecorder { id } => {
                self.metrics.session_started(id);
                match self.capture.start_recording() {
                    Ok(handle) => {
                        log::info!("Session {} recording (recorder {})", id, handle.id);
                        self.notify(Notice::RecorderStarted { session_id: id });
                        Ok(())
                    }
                    Err(err) => {
                        log::error!("Session {}: recorder failed to start: {}", id, err);
                        let error = ControllerError::from(err.clone());
                        self.dispatch(Event::RecorderStartFail { id, err })?;
                        Err(error)
                    }
                }
            }

            Effect::StartScroll { id, speed } => {
                // Each session scrolls its transcript from the top.
                self.clock.reset();
                self.clock.start(speed);
                self.notify(Notice::ScrollStarted {
                    session_id: id,
                    speed,
                });
                Ok(())
            }

            Effect::StopScroll { id } => {
                self.clock.stop();
                let position = self.clock.position();
                self.metrics.recording_stopped(id, position);
                self.notify(Notice::ScrollStopped {
                    session_id: id,
                    position,
                });
                Ok(())
            }

            Effect::StopRecorder { id } => match self.capture.request_stop() {
                Ok(ticket) => {
                    self.notify(Notice::RecorderStopRequested { session_id: id });
                    let tx = self.tx.clone();
                    self.in_flight += 1;
                    tokio::spawn(async move {
                        let event = match ticket.finalized().await {
                            Ok(blob) => Event::Finalized { id, blob },
                            Err(err) => Event::FinalizeFail { id, err },
                        };
                        let _ = tx.send(event).await;
                    });
                    Ok(())
                }
                Err(err) => {
                    log::error!("Session {}: recorder stop failed: {}", id, err);
                    let error = ControllerError::from(err.clone());
                    self.dispatch(Event::FinalizeFail { id, err })?;
                    Err(error)
                }
            },

            Effect::Persist {
                id,
                blob,
                target,
                title,
            } => {
                self.metrics.finalized(id, blob.len() as u64);
                self.notify(Notice::Finalized {
                    session_id: id,
                    bytes: blob.len(),
                });

                let artifact = PendingArtifact {
                    session_id: id,
                    file_name: recording_file_name(&title, unix_millis(), blob.container),
                    blob,
                    target,
                };
                let sink = self.sinks.select(target);
                let tx = self.tx.clone();
                self.in_flight += 1;
                tokio::spawn(async move {
                    let event = match sink.persist(&artifact.blob, &artifact.file_name).await {
                        Ok(location) => Event::Persisted { id, location },
                        Err(err) => {
                            log::error!("Session {}: {}", id, err);
                            Event::PersistFail { artifact, err }
                        }
                    };
                    let _ = tx.send(event).await;
                });
                Ok(())
            }

            Effect::Saved { id, location } => {
                self.metrics.session_saved(id);
                self.notify(Notice::Saved {
                    session_id: id,
                    location: location.clone(),
                });
                self.outcomes.push(SessionOutcome::Saved {
                    session_id: id,
                    location,
                });
                Ok(())
            }

            Effect::Failed { id, error } => {
                self.metrics.session_failed(id, error.to_string());
                let notice = if error.is_persistence() {
                    Notice::SaveFailed {
                        session_id: id,
                        error: error.clone(),
                    }
                } else {
                    Notice::SessionFailed {
                        session_id: id,
                        error: error.clone(),
                    }
                };
                self.notify(notice);
                self.outcomes.push(SessionOutcome::Failed {
                    session_id: id,
                    error,
                });
                Ok(())
            }

            Effect::RetainForRetry(artifact) => {
                if let Some(previous) = self.retry.replace(artifact) {
                    log::warn!(
                        "Dropping unsaved recording of session {} for a newer one",
                        previous.session_id
                    );
                }
                Ok(())
            }

            Effect::EmitUi => {
                let ui = self.ui_state();
                log::debug!("Emitting UI state: {:?}", serde_json::to_string(&ui));
                self.notify(Notice::StateChanged(ui));
                Ok(())
            }
        }
    }

    fn notify(&mut self, notice: Notice) {
        self.subscribers.retain(|tx| tx.send(notice.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticCamera;
    use crate::platform::{FixedPlatform, Platform};

    fn controller(dir: &tempfile::TempDir, camera: SyntheticCamera, platform: Platform) -> RecordingController {
        let settings = AppSettings {
            downloads_dir: Some(dir.path().join("Downloads")),
            gallery_root: Some(dir.path().join("sdcard")),
            ..AppSettings::default()
        };
        RecordingController::new(
            Box::new(camera),
            OutputSinks::from_settings(&settings),
            Arc::new(FixedPlatform(platform)),
            &settings,
        )
    }

    fn camera() -> SyntheticCamera {
        SyntheticCamera::new(Duration::from_millis(100), 8)
    }

    #[tokio::test(start_paused = true)]
    async fn start_without_selection_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir, camera(), Platform::Web);
        c.open_camera().unwrap();
        let mut notices = c.subscribe();

        assert_eq!(c.start(), Err(ControllerError::NoMessageSelected));
        assert!(c.is_idle());
        assert!(!c.scroll_clock().is_running());
        assert_eq!(c.capture().buffered_chunk_count(), 0);
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn start_before_opening_the_camera_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir, camera(), Platform::Web);
        c.select(Some(Message::new("Intro", "Hello")));
        assert_eq!(c.start(), Err(ControllerError::NoActiveStream));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_idle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir, camera(), Platform::Web);
        c.open_camera().unwrap();
        let mut notices = c.subscribe();

        assert_eq!(c.stop(), Err(ControllerError::NotRecording));
        assert!(c.is_idle());
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_keeps_a_single_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir, camera(), Platform::Web);
        c.open_camera().unwrap();
        c.select(Some(Message::new("Intro", "Hello")));

        let id = c.start().unwrap();
        assert_eq!(c.start(), Err(ControllerError::AlreadyRecording));
        assert_eq!(c.state().session_id(), Some(id));

        c.stop().unwrap();
        assert!(matches!(c.state(), State::Finalizing { .. }));
        assert_eq!(c.start(), Err(ControllerError::AlreadyRecording));

        let outcomes = c.settle().await;
        assert_eq!(outcomes.len(), 1);
        assert!(c.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn reselecting_during_a_session_only_affects_the_next_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir, camera(), Platform::Android);
        c.open_camera().unwrap();
        c.select(Some(Message::new("First", "one")));
        c.start().unwrap();

        c.select(Some(Message::new("Second", "two")));
        assert_eq!(
            c.ui_state(),
            UiState::Recording {
                elapsed_secs: 0,
                title: "First".to_string()
            }
        );

        c.stop().unwrap();
        let outcomes = c.settle().await;
        let SessionOutcome::Saved { location, .. } = &outcomes[0] else {
            panic!("expected a saved session, got {:?}", outcomes);
        };
        let name = location.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("First-"), "{}", name);
    }

    #[tokio::test(start_paused = true)]
    async fn speed_changes_apply_to_the_running_clock() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir, camera(), Platform::Web);
        c.open_camera().unwrap();
        c.select(Some(Message::new("Intro", "Hello")));
        assert!(!c.set_speed(-1.0));
        assert_eq!(c.speed(), 20.0);

        c.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(c.set_speed(40.0));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let position = c.scroll_position();
        assert!((position - 60.0).abs() <= 2.0, "position {}", position);
        c.stop().unwrap();
        c.settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_can_be_retried_without_recording_again() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the gallery root should be makes every write fail.
        std::fs::write(dir.path().join("sdcard"), b"").unwrap();
        let mut c = controller(&dir, camera(), Platform::Android);
        c.open_camera().unwrap();
        c.select(Some(Message::new("Intro", "Hello")));

        c.start().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        c.stop().unwrap();
        let outcomes = c.settle().await;

        assert!(matches!(
            outcomes.as_slice(),
            [SessionOutcome::Failed { error: ControllerError::FilesystemWriteError(_), .. }]
        ));
        assert!(c.is_idle());
        let pending = c.pending_retry().unwrap();
        assert!(!pending.blob.is_empty());
        assert!(pending.file_name.starts_with("Intro-"));

        // Still failing: the artifact is kept.
        assert!(c.retry_persist().await.is_err());
        assert!(c.pending_retry().is_some());

        std::fs::remove_file(dir.path().join("sdcard")).unwrap();
        let location = c.retry_persist().await.unwrap();
        assert!(location.starts_with(dir.path().join("sdcard/DCIM/Teleprompt")));
        assert!(c.pending_retry().is_none());
        assert_eq!(c.retry_persist().await, Err(ControllerError::NothingToRetry));

        let summary = c.metrics().get_summary();
        assert_eq!(summary.successful_sessions, 1);
        assert_eq!(summary.failed_sessions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn viewport_subscribed_on_view_entry_follows_every_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir, camera(), Platform::Web);
        c.open_camera().unwrap();
        let mut viewport = c.scroll_positions();
        c.select(Some(Message::new("Intro", "Hello")));

        for _ in 0..2 {
            c.start().unwrap();
            assert_eq!(*viewport.borrow_and_update(), 0.0);
            tokio::time::sleep(Duration::from_millis(500)).await;

            assert!(viewport.has_changed().unwrap());
            let seen = *viewport.borrow_and_update();
            assert!(seen > 0.0);
            assert_eq!(seen, c.scroll_position());

            c.stop().unwrap();
            c.settle().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_finishes_the_active_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir, camera(), Platform::Web);
        c.open_camera().unwrap();
        c.select(Some(Message::new("Intro", "Hello")));
        c.start().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        let outcomes = c.shutdown().await;
        assert!(matches!(outcomes.as_slice(), [SessionOutcome::Saved { .. }]));
        assert!(!c.capture().has_stream());
        assert_eq!(c.camera_status(), &CameraStatus::Closed);
        assert_eq!(c.metrics().get_summary().successful_sessions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn camera_cannot_be_closed_mid_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir, camera(), Platform::Web);
        c.open_camera().unwrap();
        c.select(Some(Message::new("Intro", "Hello")));
        c.start().unwrap();

        assert_eq!(c.close_camera(), Err(ControllerError::AlreadyRecording));
        c.stop().unwrap();
        c.settle().await;
        assert!(c.close_camera().is_ok());
    }

    #[test]
    fn ui_state_serializes_as_tagged_union() {
        let json = serde_json::to_value(UiState::Recording {
            elapsed_secs: 3,
            title: "Intro".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "recording");
        assert_eq!(json["elapsedSecs"], 3);
        assert_eq!(serde_json::to_value(UiState::Idle).unwrap()["status"], "idle");
    }
}
