//! Capture session: stream lifetime and recording buffer
//!
//! Stopping a recording is two ordered events. `request_stop()` tells the
//! encoder to flush; the recording is only complete once the encoder reports
//! `Stopped`, which `FinalizeTicket::finalized()` waits for.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::{
    CaptureConstraints, CaptureDevice, CaptureError, ContainerFormat, EncoderEvent, MediaBlob,
    StreamHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Finalizing,
}

#[derive(Debug)]
struct RecorderBuffer {
    state: RecorderState,
    /// Recorder allowed to append; output from any other pump is dropped.
    owner: Option<Uuid>,
    chunks: Vec<Vec<u8>>,
}

type FinalizeResult = Result<(), CaptureError>;

fn lock(buffer: &Mutex<RecorderBuffer>) -> std::sync::MutexGuard<'_, RecorderBuffer> {
    buffer.lock().unwrap_or_else(|e| e.into_inner())
}

/// Identifies one recording on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderHandle {
    pub id: Uuid,
}

/// Pending finalization of a stopped recording.
pub struct FinalizeTicket {
    recorder_id: Uuid,
    done: oneshot::Receiver<FinalizeResult>,
    buffer: Arc<Mutex<RecorderBuffer>>,
    container: ContainerFormat,
}

impl FinalizeTicket {
    pub fn recorder_id(&self) -> Uuid {
        self.recorder_id
    }

    /// Wait for the encoder's finalize event and assemble the blob.
    ///
    /// The buffer is cleared and the recorder returns to idle whether or not
    /// the encoder finished cleanly.
    pub async fn finalized(self) -> Result<MediaBlob, CaptureError> {
        let outcome = match self.done.await {
            Ok(result) => result,
            Err(_) => Err(CaptureError::EncoderFailed(
                "finalize signal dropped".to_string(),
            )),
        };

        let chunks = {
            let mut buffer = lock(&self.buffer);
            if buffer.owner != Some(self.recorder_id) {
                return Err(CaptureError::EncoderFailed(
                    "recording was discarded when the camera closed".to_string(),
                ));
            }
            buffer.owner = None;
            buffer.state = RecorderState::Idle;
            std::mem::take(&mut buffer.chunks)
        };

        outcome?;

        let total = chunks.iter().map(Vec::len).sum();
        let mut bytes = Vec::with_capacity(total);
        for chunk in &chunks {
            bytes.extend_from_slice(chunk);
        }

        log::info!(
            "Recording {} finalized: {} chunks, {} bytes",
            self.recorder_id,
            chunks.len(),
            bytes.len()
        );

        Ok(MediaBlob {
            bytes,
            container: self.container,
        })
    }
}

pub struct MediaCaptureSession {
    device: Box<dyn CaptureDevice>,
    stream: Option<StreamHandle>,
    buffer: Arc<Mutex<RecorderBuffer>>,
    active: Option<(Uuid, oneshot::Receiver<FinalizeResult>)>,
}

impl MediaCaptureSession {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            device,
            stream: None,
            buffer: Arc::new(Mutex::new(RecorderBuffer {
                state: RecorderState::Idle,
                owner: None,
                chunks: Vec::new(),
            })),
            active: None,
        }
    }

    /// Acquire the camera and microphone. An already open stream is reused.
    pub fn open(&mut self, constraints: &CaptureConstraints) -> Result<StreamHandle, CaptureError> {
        if let Some(stream) = &self.stream {
            return Ok(stream.clone());
        }

        let stream = self.device.acquire(constraints)?;
        log::info!("Camera stream opened: {} ({})", stream.label, stream.id);
        self.stream = Some(stream.clone());
        Ok(stream)
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream(&self) -> Option<&StreamHandle> {
        self.stream.as_ref()
    }

    pub fn recorder_state(&self) -> RecorderState {
        lock(&self.buffer).state
    }

    pub fn buffered_chunk_count(&self) -> usize {
        lock(&self.buffer).chunks.len()
    }

    pub fn container(&self) -> ContainerFormat {
        self.device.container()
    }

    /// Start encoding the open stream. Must be called inside a tokio runtime.
    pub fn start_recording(&mut self) -> Result<RecorderHandle, CaptureError> {
        let stream = self.stream.clone().ok_or(CaptureError::NoActiveStream)?;

        {
            let buffer = lock(&self.buffer);
            if buffer.state != RecorderState::Idle {
                return Err(CaptureError::RecorderBusy);
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.device.start_encoder(&stream, tx)?;

        let id = Uuid::new_v4();
        {
            let mut buffer = lock(&self.buffer);
            buffer.chunks.clear();
            buffer.owner = Some(id);
            buffer.state = RecorderState::Recording;
        }

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(pump_encoder(id, rx, self.buffer.clone(), done_tx));
        self.active = Some((id, done_rx));

        log::info!("Recorder {} started on stream {}", id, stream.id);
        Ok(RecorderHandle { id })
    }

    /// Signal the encoder to stop. The returned ticket resolves once the
    /// encoder has flushed.
    pub fn request_stop(&mut self) -> Result<FinalizeTicket, CaptureError> {
        let (recorder_id, done) = self.active.take().ok_or(CaptureError::NotRecording)?;

        lock(&self.buffer).state = RecorderState::Finalizing;
        self.device.stop_encoder();
        log::debug!("Recorder {} stop requested", recorder_id);

        Ok(FinalizeTicket {
            recorder_id,
            done,
            buffer: self.buffer.clone(),
            container: self.device.container(),
        })
    }

    pub async fn stop_recording(&mut self) -> Result<MediaBlob, CaptureError> {
        self.request_stop()?.finalized().await
    }

    /// Release the device. Safe to call repeatedly or without `open`.
    pub fn close(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };

        if self.active.take().is_some() {
            log::warn!("Closing camera stream {} while recording", stream.id);
            self.device.stop_encoder();
        }

        // Detach whatever pump is still running: its late output belongs to
        // a discarded recording.
        {
            let mut buffer = lock(&self.buffer);
            buffer.owner = None;
            buffer.chunks.clear();
            buffer.state = RecorderState::Idle;
        }

        self.device.release(&stream);
        log::info!("Camera stream closed: {}", stream.id);
    }
}

impl Drop for MediaCaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Append encoder output to the buffer in arrival order until the encoder
/// reports it has stopped.
async fn pump_encoder(
    recorder_id: Uuid,
    mut rx: mpsc::UnboundedReceiver<EncoderEvent>,
    buffer: Arc<Mutex<RecorderBuffer>>,
    done: oneshot::Sender<FinalizeResult>,
) {
    let result = loop {
        match rx.recv().await {
            Some(EncoderEvent::Data(bytes)) => {
                if bytes.is_empty() {
                    continue;
                }
                let mut buffer = lock(&buffer);
                if buffer.owner != Some(recorder_id) {
                    log::debug!("Dropping late chunk from discarded recorder {}", recorder_id);
                    continue;
                }
                buffer.chunks.push(bytes);
            }
            Some(EncoderEvent::Stopped) => break Ok(()),
            Some(EncoderEvent::Failed(err)) => {
                log::error!("Encoder failed: {}", err);
                break Err(CaptureError::EncoderFailed(err));
            }
            None => break Err(CaptureError::EncoderFailed(
                "encoder closed without stopping".to_string(),
            )),
        }
    };

    let _ = done.send(result);
}
