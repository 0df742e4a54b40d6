//! Test harness for isolated upload job execution.
//!
//! The `TestHarness` owns a temporary media directory, an `InMemoryTransport`
//! whose operations stay pending until a test completes them, and a
//! `JobStore` used to simulate process restarts.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use vupload::broadcast::JobStore;
use vupload::job::{Phase, Transition, UploadJob, VideoSettings};
use vupload::transport::{InMemoryTransport, OperationId, Outcome};

use super::builders;

pub struct TestHarness {
    temp_dir: TempDir,
    pub media_dir: PathBuf,
    pub transport: InMemoryTransport,
    pub store: JobStore,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let media_dir = temp_dir.path().join("media");
        std::fs::create_dir_all(&media_dir).expect("Failed to create media dir");

        Self {
            temp_dir,
            media_dir,
            transport: InMemoryTransport::new(),
            store: JobStore::open_in_memory().expect("Failed to open job store"),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a fake video file to the media directory.
    pub fn write_video(&self, filename: &str) -> PathBuf {
        let path = self.media_dir.join(filename);
        std::fs::write(&path, vec![7u8; 4096]).expect("Failed to write video file");
        path
    }

    /// Creates and starts a job for a fresh video file.
    pub fn start_job(&self, filename: &str, settings: Option<VideoSettings>) -> UploadJob {
        let mut job = UploadJob::new(self.write_video(filename), settings);
        job.start(&self.transport).expect("Create should start");
        job
    }

    pub fn pending(&self, job: &UploadJob) -> OperationId {
        job.pending_operation()
            .cloned()
            .expect("job should have a pending operation")
    }

    /// Completes the job's pending operation through the transport and feeds
    /// the outcome to the job.
    pub fn complete(&self, job: &mut UploadJob, outcome: Outcome) -> Transition {
        let id = self.pending(job);
        let (id, outcome) = self
            .transport
            .complete(&id, outcome)
            .expect("operation should still be pending");
        job.on_transport_complete(&self.transport, &id, outcome)
    }

    /// Drives a started job to the given phase with successful responses.
    pub fn advance_to(&self, job: &mut UploadJob, phase: Phase) {
        while job.phase() < phase {
            let outcome = match job.phase() {
                Phase::Create => builders::create_response(),
                Phase::Upload => builders::upload_ok(),
                Phase::Activate => builders::activate_response("/videos/1001"),
                Phase::Settings => break,
            };
            let transition = self.complete(job, outcome);
            assert!(
                matches!(transition, Transition::Advanced(_)),
                "expected the job to advance, got {:?}",
                transition
            );
        }
    }

    /// Persists the job and reads it back, as a host would after relaunch.
    pub fn restart(&self, job: &UploadJob) -> UploadJob {
        self.store.save(job).expect("Failed to save job");
        self.store
            .load(job.id())
            .expect("Failed to load job")
            .expect("job should be persisted")
    }

    /// Phases of every request started so far.
    pub fn started_phases(&self) -> Vec<Phase> {
        self.transport
            .started()
            .iter()
            .map(|(_, request)| request.phase())
            .collect()
    }
}
