//! Synthetic camera for hosts without a camera bridge (previews, kiosks, CI)
//!
//! Emits a fixed-size chunk every `chunk_interval` and one trailing chunk on
//! stop, the way browser media recorders flush their last slice.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    CaptureConstraints, CaptureDevice, CaptureError, ContainerFormat, EncoderEvent, EncoderSender,
    StreamHandle,
};

pub struct SyntheticCamera {
    available: bool,
    chunk_interval: Duration,
    chunk_size: usize,
    encoder: Option<CancellationToken>,
}

impl SyntheticCamera {
    pub fn new(chunk_interval: Duration, chunk_size: usize) -> Self {
        Self {
            available: true,
            chunk_interval,
            chunk_size,
            encoder: None,
        }
    }

    /// A camera whose acquisition always fails, as if permission was denied.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), 1024)
    }
}

impl CaptureDevice for SyntheticCamera {
    fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<StreamHandle, CaptureError> {
        if !self.available {
            return Err(CaptureError::DeviceUnavailable(
                "synthetic camera disabled".to_string(),
            ));
        }
        Ok(StreamHandle {
            id: Uuid::new_v4(),
            label: format!(
                "synthetic ({:?}{})",
                constraints.facing,
                if constraints.audio { ", audio" } else { "" }
            ),
        })
    }

    fn start_encoder(
        &mut self,
        stream: &StreamHandle,
        events: EncoderSender,
    ) -> Result<(), CaptureError> {
        if self.encoder.is_some() {
            return Err(CaptureError::RecorderBusy);
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let interval = self.chunk_interval;
        let size = self.chunk_size;
        let stream_id = stream.id;

        tokio::spawn(async move {
            let mut sequence: u8 = 0;
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if events.send(EncoderEvent::Data(vec![sequence; size])).is_err() {
                            log::debug!("Synthetic encoder for {} lost its receiver", stream_id);
                            return;
                        }
                        sequence = sequence.wrapping_add(1);
                    }
                }
            }

            let _ = events.send(EncoderEvent::Data(vec![sequence; size]));
            let _ = events.send(EncoderEvent::Stopped);
        });

        self.encoder = Some(token);
        Ok(())
    }

    fn stop_encoder(&mut self) {
        if let Some(token) = self.encoder.take() {
            token.cancel();
        }
    }

    fn release(&mut self, _stream: &StreamHandle) {
        self.stop_encoder();
    }

    fn container(&self) -> ContainerFormat {
        ContainerFormat::WebM
    }
}
