use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::broadcast::JobStore;
use crate::job::{JobOutcome, Transition, UploadJob};
use crate::transport::{Completion, OperationId, Outcome, Transport};

use super::error::RunnerError;
use super::progress::{ProgressEvent, ProgressReporter};

const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Drives upload jobs by feeding transport completions into them.
///
/// Every transition is checkpointed to the store when one is attached:
/// running jobs are saved, completed jobs are removed.
pub struct UploadRunner<T: Transport + ?Sized> {
    transport: Arc<T>,
    store: Option<JobStore>,
    progress_interval: Duration,
}

impl<T: Transport + ?Sized> UploadRunner<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            store: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_store(mut self, store: JobStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Runs one job until it completes or `cancel` fires.
    pub async fn run(
        &self,
        job: &mut UploadJob,
        completions: &mut mpsc::UnboundedReceiver<Completion>,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<JobOutcome, RunnerError> {
        let mut outcomes = self
            .run_all(std::slice::from_mut(job), completions, cancel, progress)
            .await?;
        outcomes.pop().ok_or_else(|| RunnerError::Incomplete {
            job_id: job.id().to_string(),
        })
    }

    /// Runs several jobs sharing one completion stream. Each completion is
    /// routed to the job waiting on that operation.
    pub async fn run_all(
        &self,
        jobs: &mut [UploadJob],
        completions: &mut mpsc::UnboundedReceiver<Completion>,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<JobOutcome>, RunnerError> {
        let span = info_span!("upload_runner", jobs = jobs.len());
        self.drive(jobs, completions, cancel, progress)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        jobs: &mut [UploadJob],
        completions: &mut mpsc::UnboundedReceiver<Completion>,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<JobOutcome>, RunnerError> {
        for job in jobs.iter_mut() {
            self.begin(job, progress)?;
        }

        let mut ticker = tokio::time::interval(self.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while jobs.iter().any(|job| !job.is_completed()) {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Cancellation requested");
                    for job in jobs.iter_mut().filter(|job| !job.is_completed()) {
                        job.cancel(&*self.transport);
                        self.checkpoint(job)?;
                        progress.report(job, ProgressEvent::Cancelled { phase: job.phase() });
                    }
                }

                completion = completions.recv() => {
                    let Some((id, outcome)) = completion else {
                        warn!("Completion stream closed with jobs still running");
                        return Err(RunnerError::CompletionsClosed);
                    };
                    match jobs.iter_mut().find(|job| job.pending_operation() == Some(&id)) {
                        Some(job) => self.apply(job, &id, outcome, progress)?,
                        None => debug!(operation = %id, "No job is waiting on this operation"),
                    }
                }

                _ = ticker.tick() => {
                    for job in jobs.iter().filter(|job| !job.is_completed()) {
                        if let Some(fraction) = job.progress(&*self.transport) {
                            progress.report(job, ProgressEvent::Transfer { fraction });
                        }
                    }
                }
            }
        }

        jobs.iter()
            .map(|job| {
                job.outcome().ok_or_else(|| RunnerError::Incomplete {
                    job_id: job.id().to_string(),
                })
            })
            .collect()
    }

    /// Starts a fresh job or reattaches a restored one. Start and reattach
    /// failures are recorded on the job itself.
    fn begin(&self, job: &mut UploadJob, progress: &dyn ProgressReporter) -> Result<(), RunnerError> {
        if !job.is_started() {
            let result = if job.is_restored() {
                job.reattach(&*self.transport)
            } else {
                job.start(&*self.transport)
            };
            if let Err(e) = result {
                debug!(job_id = job.id(), error = %e, "Job could not begin");
            }
        }

        self.checkpoint(job)?;
        if job.is_completed() {
            self.report_outcome(job, progress);
        } else {
            progress.report(job, ProgressEvent::Phase { phase: job.phase() });
        }
        Ok(())
    }

    fn apply(
        &self,
        job: &mut UploadJob,
        id: &OperationId,
        outcome: Outcome,
        progress: &dyn ProgressReporter,
    ) -> Result<(), RunnerError> {
        match job.on_transport_complete(&*self.transport, id, outcome) {
            Transition::Ignored => {}
            Transition::Advanced(phase) => {
                self.checkpoint(job)?;
                progress.report(job, ProgressEvent::Phase { phase });
            }
            Transition::Succeeded | Transition::Failed => {
                self.checkpoint(job)?;
                self.report_outcome(job, progress);
            }
        }
        Ok(())
    }

    fn checkpoint(&self, job: &UploadJob) -> Result<(), RunnerError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if job.is_completed() {
            store.remove(job.id())?;
        } else {
            store.save(job)?;
        }
        Ok(())
    }

    fn report_outcome(&self, job: &UploadJob, progress: &dyn ProgressReporter) {
        let phase = job.phase();
        let event = match job.outcome() {
            Some(JobOutcome::Succeeded { video_uri, .. }) => {
                ProgressEvent::Completed { phase, video_uri }
            }
            Some(JobOutcome::Failed(error)) => ProgressEvent::Failed { phase, error },
            Some(JobOutcome::Cancelled) => ProgressEvent::Cancelled { phase },
            None => return,
        };
        progress.report(job, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::job::Phase;
    use crate::pipeline::progress::{NoopProgress, RecordingProgress};
    use crate::transport::{InMemoryTransport, RequestDescriptor};
    use serde_json::json;

    fn happy(request: &RequestDescriptor) -> Outcome {
        match request {
            RequestDescriptor::Create { .. } => Outcome::new(201).with_json(&json!({
                "upload_link_secure": "https://upload.example.com/u/1",
                "complete_uri": "/users/1/uploads/1"
            })),
            RequestDescriptor::Upload { .. } => Outcome::new(200),
            RequestDescriptor::Activate { .. } => Outcome::new(201).with_location("/videos/5"),
            RequestDescriptor::Settings { .. } => {
                Outcome::new(200).with_json(&json!({"uri": "/videos/5"}))
            }
        }
    }

    #[tokio::test]
    async fn test_run_to_success() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"bytes").unwrap();

        let (transport, mut rx) = InMemoryTransport::scripted(happy);
        let runner = UploadRunner::new(Arc::new(transport));
        let mut job = UploadJob::new(&file, None);

        let outcome = runner
            .run(&mut job, &mut rx, &CancellationToken::new(), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            JobOutcome::Succeeded {
                video_uri: "/videos/5".to_string(),
                video: None
            }
        );
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_run_reports_phases() {
        let (transport, mut rx) = InMemoryTransport::scripted(happy);
        let runner = UploadRunner::new(Arc::new(transport));
        let recorder = RecordingProgress::new();
        let mut job = UploadJob::new("/tmp/does-not-matter.mp4", None);

        runner
            .run(&mut job, &mut rx, &CancellationToken::new(), &recorder)
            .await
            .unwrap();

        let phases: Vec<Phase> = recorder
            .events()
            .into_iter()
            .filter_map(|(_, event)| match event {
                ProgressEvent::Phase { phase } => Some(phase),
                _ => None,
            })
            .collect();
        assert_eq!(phases, vec![Phase::Create, Phase::Upload, Phase::Activate]);
        assert!(matches!(
            recorder.events().last(),
            Some((_, ProgressEvent::Completed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_failure() {
        let (transport, mut rx) = InMemoryTransport::scripted(|_| Outcome::new(503));
        let runner = UploadRunner::new(Arc::new(transport));
        let mut job = UploadJob::new("/tmp/x.mp4", None);

        let outcome = runner
            .run(&mut job, &mut rx, &CancellationToken::new(), &NoopProgress)
            .await
            .unwrap();

        match outcome {
            JobOutcome::Failed(err) => assert_eq!(err.kind, ErrorKind::BadStatus { status: 503 }),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_before_completion() {
        let transport = Arc::new(InMemoryTransport::new());
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let runner = UploadRunner::new(Arc::clone(&transport));
        let mut job = UploadJob::new("/tmp/x.mp4", None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = runner
            .run(&mut job, &mut rx, &cancel, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(outcome, JobOutcome::Cancelled);
        assert_eq!(transport.cancelled().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_stream_is_an_error() {
        let transport = Arc::new(InMemoryTransport::new());
        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
        drop(tx);
        let runner = UploadRunner::new(transport);
        let mut job = UploadJob::new("/tmp/x.mp4", None);

        let result = runner
            .run(&mut job, &mut rx, &CancellationToken::new(), &NoopProgress)
            .await;
        assert!(matches!(result, Err(RunnerError::CompletionsClosed)));
    }

    #[tokio::test]
    async fn test_checkpoints_remove_completed_job() {
        let store = JobStore::open_in_memory().unwrap();
        let (transport, mut rx) = InMemoryTransport::scripted(happy);
        let runner = UploadRunner::new(Arc::new(transport)).with_store(store.clone());
        let mut job = UploadJob::new("/tmp/x.mp4", None);

        runner
            .run(&mut job, &mut rx, &CancellationToken::new(), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(store.count().unwrap(), 0);
    }
}
