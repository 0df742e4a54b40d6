use std::sync::Mutex;

use crate::broadcast::JobProgressBroadcaster;
use crate::error::UploadError;
use crate::job::{Phase, UploadJob};

/// Events emitted by the runner while it drives a job.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Phase {
        phase: Phase,
    },
    Transfer {
        fraction: f64,
    },
    Completed {
        phase: Phase,
        video_uri: String,
    },
    Failed {
        phase: Phase,
        error: UploadError,
    },
    Cancelled {
        phase: Phase,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, job: &UploadJob, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _job: &UploadJob, _event: ProgressEvent) {}
}

/// Bridges runner events to the progress broadcast channel.
pub struct BroadcastProgress {
    broadcaster: JobProgressBroadcaster,
}

impl BroadcastProgress {
    pub fn new(broadcaster: JobProgressBroadcaster) -> Self {
        Self { broadcaster }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, job: &UploadJob, event: ProgressEvent) {
        let tracker = self.broadcaster.track(job.id(), &job.filename());
        match event {
            ProgressEvent::Phase { phase } => tracker.update_phase(phase),
            ProgressEvent::Transfer { fraction } => tracker.transfer(fraction),
            ProgressEvent::Completed { phase, video_uri } => tracker.completed(phase, &video_uri),
            ProgressEvent::Failed { phase, error } => tracker.failed(phase, &error),
            ProgressEvent::Cancelled { phase } => tracker.cancelled(phase),
        }
    }
}

/// Keeps every event in memory, tagged with the job id.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<(String, ProgressEvent)>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, ProgressEvent)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, job: &UploadJob, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((job.id().to_string(), event));
        }
    }
}
