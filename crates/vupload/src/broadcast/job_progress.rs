//! Live progress events for upload jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::UploadError;
use crate::job::Phase;

/// Status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Progress event for an upload job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    /// Name of the file being uploaded.
    pub filename: String,
    pub phase: Phase,
    pub status: JobStatus,
    /// Human-readable message describing current activity.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Fraction of bytes sent, only during Upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Address of the video (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_uri: Option<String>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    fn base(job_id: &str, filename: &str, phase: Phase, status: JobStatus, message: String) -> Self {
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            phase,
            status,
            message,
            timestamp: Utc::now(),
            progress: None,
            video_uri: None,
            error: None,
        }
    }

    /// A job entered `phase`.
    pub fn phase(job_id: &str, filename: &str, phase: Phase) -> Self {
        Self::base(job_id, filename, phase, JobStatus::Running, phase.to_string())
    }

    /// Byte progress of a running upload.
    pub fn transfer(job_id: &str, filename: &str, fraction: f64) -> Self {
        let mut event = Self::base(
            job_id,
            filename,
            Phase::Upload,
            JobStatus::Running,
            format!("Uploading ({:.0}%)", fraction * 100.0),
        );
        event.progress = Some(fraction);
        event
    }

    pub fn completed(job_id: &str, filename: &str, phase: Phase, video_uri: &str) -> Self {
        let mut event = Self::base(
            job_id,
            filename,
            phase,
            JobStatus::Completed,
            "Upload completed successfully".to_string(),
        );
        event.video_uri = Some(video_uri.to_string());
        event
    }

    pub fn failed(job_id: &str, filename: &str, phase: Phase, error: &UploadError) -> Self {
        let mut event = Self::base(
            job_id,
            filename,
            phase,
            JobStatus::Failed,
            "Upload failed".to_string(),
        );
        event.error = Some(error.to_string());
        event
    }

    pub fn cancelled(job_id: &str, filename: &str, phase: Phase) -> Self {
        Self::base(
            job_id,
            filename,
            phase,
            JobStatus::Cancelled,
            "Upload cancelled".to_string(),
        )
    }
}

/// Fan-out of progress events to any number of listeners.
///
/// Slow listeners lag and lose the oldest events; senders never block.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobProgressEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("Progress event dropped, nobody is listening");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Tracker that stamps every event with `job_id` and `filename`.
    pub fn track(&self, job_id: &str, filename: &str) -> JobProgressTracker {
        JobProgressTracker {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            broadcaster: self.clone(),
        }
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Emits events for one job.
pub struct JobProgressTracker {
    job_id: String,
    filename: String,
    broadcaster: JobProgressBroadcaster,
}

impl JobProgressTracker {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn update_phase(&self, phase: Phase) {
        self.broadcaster
            .send(JobProgressEvent::phase(&self.job_id, &self.filename, phase));
    }

    pub fn transfer(&self, fraction: f64) {
        self.broadcaster
            .send(JobProgressEvent::transfer(&self.job_id, &self.filename, fraction));
    }

    pub fn completed(&self, phase: Phase, video_uri: &str) {
        self.broadcaster.send(JobProgressEvent::completed(
            &self.job_id,
            &self.filename,
            phase,
            video_uri,
        ));
    }

    pub fn failed(&self, phase: Phase, error: &UploadError) {
        self.broadcaster.send(JobProgressEvent::failed(
            &self.job_id,
            &self.filename,
            phase,
            error,
        ));
    }

    pub fn cancelled(&self, phase: Phase) {
        self.broadcaster
            .send(JobProgressEvent::cancelled(&self.job_id, &self.filename, phase));
    }
}
