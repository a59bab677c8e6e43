//! State machine for a teleprompter recording session
//!
//! Single-writer pattern: every transition goes through `reduce()`, which
//! returns the next state and the effects to run, in order. Rejected events
//! return an error and produce no effects at all.

use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

use crate::capture::{CaptureError, MediaBlob};
use crate::error::ControllerError;
use crate::output::{OutputTarget, PersistError};
use crate::store::Message;

/// Whether the view's camera stream is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraStatus {
    Closed,
    Open,
    Failed(String),
}

/// A finalized recording waiting to be (re)stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingArtifact {
    pub session_id: Uuid,
    pub blob: MediaBlob,
    pub file_name: String,
    pub target: OutputTarget,
}

/// Authoritative controller state.
#[derive(Debug, Clone)]
pub enum State {
    Idle,
    Recording {
        session_id: Uuid,
        message: Message,
        target: OutputTarget,
        started_at: Instant,
    },
    Finalizing {
        session_id: Uuid,
        message: Message,
        target: OutputTarget,
    },
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

impl State {
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            State::Idle => None,
            State::Recording { session_id, .. } | State::Finalizing { session_id, .. } => {
                Some(*session_id)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// User pressed record. Carries everything the decision needs, captured
    /// at the moment of the press.
    Start {
        message: Option<Message>,
        camera: CameraStatus,
        target: OutputTarget,
        speed: f64,
    },
    /// User pressed stop
    Stop,

    // Capture events
    RecorderStartFail {
        id: Uuid,
        err: CaptureError,
    },
    Finalized {
        id: Uuid,
        blob: MediaBlob,
    },
    FinalizeFail {
        id: Uuid,
        err: CaptureError,
    },

    // Output events
    Persisted {
        id: Uuid,
        location: PathBuf,
    },
    PersistFail {
        artifact: PendingArtifact,
        err: PersistError,
    },
}

#[derive(Debug, Clone)]
pub enum Effect {
    StartRecorder {
        id: Uuid,
    },
    StartScroll {
        id: Uuid,
        speed: f64,
    },
    StopScroll {
        id: Uuid,
    },
    /// Request the encoder stop and wait for finalize in the background
    StopRecorder {
        id: Uuid,
    },
    Persist {
        id: Uuid,
        blob: MediaBlob,
        target: OutputTarget,
        title: String,
    },
    Saved {
        id: Uuid,
        location: PathBuf,
    },
    Failed {
        id: Uuid,
        error: ControllerError,
    },
    RetainForRetry(PendingArtifact),
    /// Signal to publish the UI state
    EmitUi,
}

/// Reducer: (state, event) -> (next_state, effects) or a rejection
///
/// Key rules:
/// - Recording starts before scrolling; scrolling stops before recording
/// - Completion events with a stale session id are ignored
/// - Every failure lands in Idle
pub fn reduce(state: &State, event: Event) -> Result<(State, Vec<Effect>), ControllerError> {
    use Effect::*;
    use Event::*;
    use State::*;

    let current_id = state.session_id();
    let is_current = |eid: Uuid| current_id == Some(eid);

    match (state, event) {
        // -----------------
        // Idle
        // -----------------
        (
            Idle,
            Start {
                message,
                camera,
                target,
                speed,
            },
        ) => {
            let message = message.ok_or(ControllerError::NoMessageSelected)?;
            match camera {
                CameraStatus::Open => {}
                CameraStatus::Failed(reason) => {
                    return Err(ControllerError::DeviceUnavailable(reason))
                }
                CameraStatus::Closed => return Err(ControllerError::NoActiveStream),
            }

            let id = Uuid::new_v4();
            Ok((
                Recording {
                    session_id: id,
                    message,
                    target,
                    started_at: Instant::now(),
                },
                vec![StartRecorder { id }, StartScroll { id, speed }, EmitUi],
            ))
        }
        (Recording { .. } | Finalizing { .. }, Start { .. }) => {
            Err(ControllerError::AlreadyRecording)
        }

        // -----------------
        // Recording
        // -----------------
        (
            Recording {
                session_id,
                message,
                target,
                ..
            },
            Stop,
        ) => Ok((
            Finalizing {
                session_id: *session_id,
                message: message.clone(),
                target: *target,
            },
            vec![
                StopScroll { id: *session_id },
                StopRecorder { id: *session_id },
                EmitUi,
            ],
        )),
        (_, Stop) => Err(ControllerError::NotRecording),

        (Recording { session_id, .. }, RecorderStartFail { id, err }) if *session_id == id => Ok((
            Idle,
            vec![
                Failed {
                    id,
                    error: err.into(),
                },
                EmitUi,
            ],
        )),

        // -----------------
        // Finalizing
        // -----------------
        (
            Finalizing {
                session_id,
                message,
                target,
            },
            Finalized { id, blob },
        ) if *session_id == id => Ok((
            Idle,
            vec![
                Persist {
                    id,
                    blob,
                    target: *target,
                    title: message.title.clone(),
                },
                EmitUi,
            ],
        )),
        (Finalizing { session_id, .. }, FinalizeFail { id, err }) if *session_id == id => Ok((
            Idle,
            vec![
                Failed {
                    id,
                    error: err.into(),
                },
                EmitUi,
            ],
        )),

        // -----------------
        // Persistence outcomes: they belong to a session that is already
        // over, so they never change the state.
        // -----------------
        (_, Persisted { id, location }) => Ok((state.clone(), vec![Saved { id, location }])),
        (_, PersistFail { artifact, err }) => {
            let id = artifact.session_id;
            Ok((
                state.clone(),
                vec![
                    RetainForRetry(artifact),
                    Failed {
                        id,
                        error: err.into(),
                    },
                ],
            ))
        }

        // -----------------
        // Stale capture events (drop silently)
        // -----------------
        (_, RecorderStartFail { id, .. }) if !is_current(id) => Ok((state.clone(), vec![])),
        (_, Finalized { id, .. }) if !is_current(id) => Ok((state.clone(), vec![])),
        (_, FinalizeFail { id, .. }) if !is_current(id) => Ok((state.clone(), vec![])),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => Ok((state.clone(), vec![])),
    }
}
