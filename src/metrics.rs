//! Metrics collection for recording sessions
//!
//! Tracks timing, output sizes and error history per session. A session's
//! persistence can finish after the next session started, so in-progress
//! sessions are keyed by id.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Maximum number of completed sessions to retain in history
const MAX_SESSION_HISTORY: usize = 50;

/// Maximum number of errors to retain in history
const MAX_ERROR_HISTORY: usize = 20;

/// Metrics for a completed recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: String,
    /// Unix timestamp when the session started (seconds)
    pub started_at: u64,
    pub recording_duration_ms: u64,
    /// How far the transcript scrolled, in display units
    pub scroll_distance: f64,
    pub video_size_bytes: u64,
    /// Time from finalize to the file being stored
    pub persist_duration_ms: u64,
    pub total_session_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Summary statistics across all recorded sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_sessions: u64,
    pub successful_sessions: u64,
    pub failed_sessions: u64,
    pub avg_recording_duration_ms: u64,
    pub avg_persist_duration_ms: u64,
    pub avg_video_size_bytes: u64,
    pub last_error: Option<ErrorRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Unix timestamp when error occurred (seconds)
    pub timestamp: u64,
    pub message: String,
    pub session_id: Option<String>,
}

struct SessionInProgress {
    started_at: Instant,
    started_at_unix: u64,
    recording_duration: Option<Duration>,
    scroll_distance: f64,
    video_size: Option<u64>,
    persist_started: Option<Instant>,
}

impl SessionInProgress {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            started_at_unix: unix_secs(),
            recording_duration: None,
            scroll_distance: 0.0,
            video_size: None,
            persist_started: None,
        }
    }

    fn to_metrics(&self, session_id: Uuid, success: bool, error_message: Option<String>) -> SessionMetrics {
        SessionMetrics {
            session_id: session_id.to_string(),
            started_at: self.started_at_unix,
            recording_duration_ms: self
                .recording_duration
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            scroll_distance: self.scroll_distance,
            video_size_bytes: self.video_size.unwrap_or(0),
            persist_duration_ms: self
                .persist_started
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0),
            total_session_ms: self.started_at.elapsed().as_millis() as u64,
            success,
            error_message,
        }
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub struct MetricsCollector {
    /// Completed sessions, newest first
    history: VecDeque<SessionMetrics>,
    /// Errors, newest first
    errors: VecDeque<ErrorRecord>,
    in_progress: HashMap<Uuid, SessionInProgress>,
    total_sessions: u64,
    successful_sessions: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(MAX_SESSION_HISTORY),
            errors: VecDeque::with_capacity(MAX_ERROR_HISTORY),
            in_progress: HashMap::new(),
            total_sessions: 0,
            successful_sessions: 0,
        }
    }

    pub fn session_started(&mut self, session_id: Uuid) {
        log::debug!("Metrics: starting session {}", session_id);
        self.in_progress.insert(session_id, SessionInProgress::new());
        self.total_sessions += 1;
    }

    /// Recording stopped; `scroll_distance` is where the transcript froze.
    pub fn recording_stopped(&mut self, session_id: Uuid, scroll_distance: f64) {
        if let Some(session) = self.in_progress.get_mut(&session_id) {
            session.recording_duration = Some(session.started_at.elapsed());
            session.scroll_distance = scroll_distance;
            log::info!(
                "Metrics: recording stopped for session {} - duration {:?}, scrolled {:.1}",
                session_id,
                session.recording_duration,
                scroll_distance
            );
        }
    }

    pub fn finalized(&mut self, session_id: Uuid, video_size_bytes: u64) {
        if let Some(session) = self.in_progress.get_mut(&session_id) {
            session.video_size = Some(video_size_bytes);
            session.persist_started = Some(Instant::now());
        }
    }

    pub fn session_saved(&mut self, session_id: Uuid) {
        if let Some(session) = self.in_progress.remove(&session_id) {
            let metrics = session.to_metrics(session_id, true, None);
            log::info!(
                "Metrics: session {} saved - total {}ms (record {}ms + persist {}ms), {} bytes",
                metrics.session_id,
                metrics.total_session_ms,
                metrics.recording_duration_ms,
                metrics.persist_duration_ms,
                metrics.video_size_bytes
            );
            self.add_to_history(metrics);
            self.successful_sessions += 1;
        }
    }

    pub fn session_failed(&mut self, session_id: Uuid, error: String) {
        if let Some(session) = self.in_progress.remove(&session_id) {
            let metrics = session.to_metrics(session_id, false, Some(error.clone()));
            log::warn!(
                "Metrics: session {} failed after {}ms - {}",
                metrics.session_id,
                metrics.total_session_ms,
                error
            );
            self.add_to_history(metrics);
        }
        self.record_error(error, Some(session_id.to_string()));
    }

    /// A failed save was retried and the recording is now stored.
    pub fn retry_succeeded(&mut self, session_id: Uuid) {
        let id = session_id.to_string();
        match self.history.iter_mut().find(|s| s.session_id == id) {
            Some(entry) if !entry.success => {
                entry.success = true;
                entry.error_message = None;
                self.successful_sessions += 1;
                log::info!("Metrics: session {} saved on retry", id);
            }
            Some(_) => {}
            None => log::debug!("Metrics: retried session {} no longer in history", id),
        }
    }

    pub fn record_error(&mut self, message: String, session_id: Option<String>) {
        let error = ErrorRecord {
            timestamp: unix_secs(),
            message,
            session_id,
        };
        log::debug!("Metrics: recording error - {:?}", error);

        self.errors.push_front(error);
        while self.errors.len() > MAX_ERROR_HISTORY {
            self.errors.pop_back();
        }
    }

    pub fn get_summary(&self) -> MetricsSummary {
        let successful: Vec<_> = self.history.iter().filter(|s| s.success).collect();
        let count = successful.len() as u64;

        let (avg_recording, avg_persist, avg_size) = if count > 0 {
            let recording: u64 = successful.iter().map(|s| s.recording_duration_ms).sum();
            let persist: u64 = successful.iter().map(|s| s.persist_duration_ms).sum();
            let size: u64 = successful.iter().map(|s| s.video_size_bytes).sum();
            (recording / count, persist / count, size / count)
        } else {
            (0, 0, 0)
        };

        MetricsSummary {
            total_sessions: self.total_sessions,
            successful_sessions: self.successful_sessions,
            failed_sessions: self
                .history
                .iter()
                .filter(|s| !s.success)
                .count() as u64,
            avg_recording_duration_ms: avg_recording,
            avg_persist_duration_ms: avg_persist,
            avg_video_size_bytes: avg_size,
            last_error: self.errors.front().cloned(),
        }
    }

    pub fn get_history(&self) -> Vec<SessionMetrics> {
        self.history.iter().cloned().collect()
    }

    pub fn get_errors(&self) -> Vec<ErrorRecord> {
        self.errors.iter().cloned().collect()
    }

    pub fn is_active_session(&self, session_id: Uuid) -> bool {
        self.in_progress.contains_key(&session_id)
    }

    fn add_to_history(&mut self, metrics: SessionMetrics) {
        self.history.push_front(metrics);
        while self.history.len() > MAX_SESSION_HISTORY {
            self.history.pop_back();
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
