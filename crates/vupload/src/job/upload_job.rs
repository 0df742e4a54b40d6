//! The upload job state machine.
//!
//! A job walks `Create -> Upload -> Activate -> Settings` with exactly one
//! transport operation outstanding at a time. Any failure is terminal; the
//! host decides whether to start over with a new job.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::UploadError;
use crate::response::{self, PhaseValue};
use crate::transport::{OperationId, Outcome, RequestDescriptor, Transport};

use super::phase::Phase;
use super::types::{ActivateResult, CreateResult, Video, VideoSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Fresh,
    Restored,
}

/// Effect of a transport completion on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Stale or duplicate completion; nothing changed.
    Ignored,
    /// The job moved to this phase and started its request.
    Advanced(Phase),
    Succeeded,
    Failed,
}

/// How a completed job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded {
        video_uri: String,
        /// Present only when settings were requested.
        video: Option<Video>,
    },
    Failed(UploadError),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct UploadJob {
    pub(crate) id: String,
    pub(crate) file: PathBuf,
    pub(crate) settings: Option<VideoSettings>,
    pub(crate) phase: Phase,
    pub(crate) pending_operation: Option<OperationId>,
    pub(crate) create_result: Option<CreateResult>,
    pub(crate) activate_result: Option<ActivateResult>,
    pub(crate) settings_result: Option<Video>,
    pub(crate) terminal_error: Option<UploadError>,
    pub(crate) completed: bool,
    pub(crate) cancelled: bool,
    pub(crate) file_deleted: bool,
    pub(crate) origin: Origin,
    /// Set once `start` or `reattach` has run.
    pub(crate) started: bool,
}

impl UploadJob {
    /// Creates a fresh job for `file`. Settings are applied after activation
    /// when given; otherwise the job finishes right after Activate.
    pub fn new(file: impl Into<PathBuf>, settings: Option<VideoSettings>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file: file.into(),
            settings,
            phase: Phase::Create,
            pending_operation: None,
            create_result: None,
            activate_result: None,
            settings_result: None,
            terminal_error: None,
            completed: false,
            cancelled: false,
            file_deleted: false,
            origin: Origin::Fresh,
            started: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn settings(&self) -> Option<&VideoSettings> {
        self.settings.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending_operation(&self) -> Option<&OperationId> {
        self.pending_operation.as_ref()
    }

    pub fn create_result(&self) -> Option<&CreateResult> {
        self.create_result.as_ref()
    }

    pub fn activate_result(&self) -> Option<&ActivateResult> {
        self.activate_result.as_ref()
    }

    pub fn settings_result(&self) -> Option<&Video> {
        self.settings_result.as_ref()
    }

    pub fn terminal_error(&self) -> Option<&UploadError> {
        self.terminal_error.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// True for jobs rebuilt from a persisted record.
    pub fn is_restored(&self) -> bool {
        self.origin == Origin::Restored
    }

    /// True once `start` or `reattach` has run.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Display name of the source file.
    pub fn filename(&self) -> String {
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Final result, or `None` while the job is still running.
    pub fn outcome(&self) -> Option<JobOutcome> {
        if !self.completed {
            return None;
        }
        if self.cancelled {
            return Some(JobOutcome::Cancelled);
        }
        if let Some(err) = &self.terminal_error {
            return Some(JobOutcome::Failed(err.clone()));
        }
        self.activate_result
            .as_ref()
            .map(|activated| JobOutcome::Succeeded {
                video_uri: activated.video_uri.clone(),
                video: self.settings_result.clone(),
            })
    }

    /// Byte progress of the upload request, when one is in flight.
    pub fn progress<T: Transport + ?Sized>(&self, transport: &T) -> Option<f64> {
        if self.phase != Phase::Upload {
            return None;
        }
        self.pending_operation
            .as_ref()
            .and_then(|id| transport.progress(id))
    }

    /// Issues the Create request. Only valid once, on a fresh job.
    ///
    /// If the request cannot be started the job completes with a `Start`
    /// error tagged `Create`, which is also returned.
    pub fn start<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<(), UploadError> {
        if self.origin == Origin::Restored || self.started || self.completed {
            warn!(
                "Upload job {} cannot be started (restored: {}, started: {}, completed: {})",
                self.id,
                self.is_restored(),
                self.started,
                self.completed
            );
            return Ok(());
        }

        self.started = true;
        info!("Starting upload job {} for {}", self.id, self.file.display());
        self.begin_phase(Phase::Create, transport)
    }

    /// Reconnects a restored job to its outstanding operation.
    ///
    /// When the transport no longer knows the operation the job completes
    /// with an `OrphanedState` error and the local file is deleted.
    pub fn reattach<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<(), UploadError> {
        if self.origin != Origin::Restored || self.started {
            warn!("Upload job {} cannot be reattached", self.id);
            return Ok(());
        }
        self.started = true;

        if self.completed {
            debug!("Restored upload job {} is already completed", self.id);
            return Ok(());
        }

        let attached = self
            .pending_operation
            .as_ref()
            .and_then(|id| transport.lookup(id));

        if let Some(handle) = attached {
            if handle.phase != self.phase {
                warn!(
                    "Upload job {} is in phase {} but operation {} belongs to {}",
                    self.id,
                    self.phase.as_str(),
                    handle.id,
                    handle.phase.as_str()
                );
            }
            info!(
                "Reattached upload job {} to operation {} ({})",
                self.id,
                handle.id,
                self.phase.as_str()
            );
            return Ok(());
        }

        self.pending_operation = None;
        self.delete_source_file();
        let err = UploadError::orphaned(self.phase);
        self.finish_with_error(err.clone());
        Err(err)
    }

    /// Feeds the outcome of operation `operation_id` into the job.
    ///
    /// Completions for anything but the pending operation are ignored, as
    /// are completions arriving after the job completed.
    pub fn on_transport_complete<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        operation_id: &OperationId,
        outcome: Outcome,
    ) -> Transition {
        if self.completed || self.pending_operation.as_ref() != Some(operation_id) {
            debug!(
                "Ignoring stale completion {} for upload job {}",
                operation_id, self.id
            );
            return Transition::Ignored;
        }

        self.pending_operation = None;
        let phase = self.phase;

        // The source bytes are never needed again once an upload attempt ends.
        if phase == Phase::Upload {
            self.delete_source_file();
        }

        match response::interpret(phase, &outcome) {
            Ok(PhaseValue::Created(created)) => self.create_result = Some(created),
            Ok(PhaseValue::Uploaded) => {}
            Ok(PhaseValue::Activated(activated)) => self.activate_result = Some(activated),
            Ok(PhaseValue::Configured(video)) => self.settings_result = Some(video),
            Err(err) => {
                self.finish_with_error(err);
                return Transition::Failed;
            }
        }

        let next = match phase.next() {
            Some(Phase::Settings) if self.settings.is_none() => None,
            next => next,
        };

        match next {
            None => {
                self.finish_success();
                Transition::Succeeded
            }
            Some(next) => match self.begin_phase(next, transport) {
                Ok(()) => Transition::Advanced(next),
                Err(_) => Transition::Failed,
            },
        }
    }

    /// Cancels the job. Cancellation is not a failure: no terminal error is
    /// recorded and `is_cancelled` reports it instead.
    pub fn cancel<T: Transport + ?Sized>(&mut self, transport: &T) {
        if self.completed {
            debug!("Upload job {} already completed, nothing to cancel", self.id);
            return;
        }

        if let Some(id) = self.pending_operation.take() {
            transport.cancel(&id);
        }
        self.delete_source_file();
        self.completed = true;
        self.cancelled = true;
        info!("Cancelled upload job {} during {}", self.id, self.phase.as_str());
    }

    fn begin_phase<T: Transport + ?Sized>(
        &mut self,
        phase: Phase,
        transport: &T,
    ) -> Result<(), UploadError> {
        debug_assert!(phase >= self.phase, "phases never regress");
        self.phase = phase;

        let started = self.describe(phase).and_then(|request| {
            transport
                .start(request)
                .map_err(|e| UploadError::start(phase, e.to_string()))
        });

        match started {
            Ok(id) => {
                info!(
                    "Upload job {}: {} (operation {})",
                    self.id, phase, id
                );
                self.pending_operation = Some(id);
                Ok(())
            }
            Err(err) => {
                self.finish_with_error(err.clone());
                Err(err)
            }
        }
    }

    /// Request descriptor for `phase`; missing prerequisites are start errors
    /// of the phase being started.
    fn describe(&self, phase: Phase) -> Result<RequestDescriptor, UploadError> {
        match phase {
            Phase::Create => Ok(RequestDescriptor::Create {
                file: self.file.clone(),
            }),
            Phase::Upload => {
                let destination = self
                    .create_result
                    .as_ref()
                    .map(|r| r.upload_uri.as_str())
                    .filter(|uri| !uri.is_empty())
                    .ok_or_else(|| {
                        UploadError::start(
                            Phase::Upload,
                            "Attempt to initiate upload but the upload URI is missing",
                        )
                    })?;
                Ok(RequestDescriptor::Upload {
                    file: self.file.clone(),
                    destination: destination.to_string(),
                })
            }
            Phase::Activate => {
                let activation_uri = self
                    .create_result
                    .as_ref()
                    .map(|r| r.activation_uri.as_str())
                    .filter(|uri| !uri.is_empty())
                    .ok_or_else(|| {
                        UploadError::start(
                            Phase::Activate,
                            "Attempt to activate but the activation URI is missing",
                        )
                    })?;
                Ok(RequestDescriptor::Activate {
                    activation_uri: activation_uri.to_string(),
                })
            }
            Phase::Settings => {
                let video_uri = self
                    .activate_result
                    .as_ref()
                    .map(|r| r.video_uri.as_str())
                    .filter(|uri| !uri.is_empty());
                match (video_uri, &self.settings) {
                    (Some(video_uri), Some(settings)) => Ok(RequestDescriptor::Settings {
                        video_uri: video_uri.to_string(),
                        settings: settings.clone(),
                    }),
                    _ => Err(UploadError::start(
                        Phase::Settings,
                        "Attempt to apply settings without a video URI or settings",
                    )),
                }
            }
        }
    }

    fn finish_with_error(&mut self, err: UploadError) {
        warn!("Upload job {} failed: {}", self.id, err);
        // Leaving Upload in any way ends the need for the source file.
        if self.phase == Phase::Upload {
            self.delete_source_file();
        }
        self.pending_operation = None;
        self.terminal_error = Some(err);
        self.completed = true;
    }

    fn finish_success(&mut self) {
        self.completed = true;
        info!(
            "Upload job {} finished: {}",
            self.id,
            self.activate_result
                .as_ref()
                .map(|r| r.video_uri.as_str())
                .unwrap_or("")
        );
    }

    fn delete_source_file(&mut self) {
        if self.file_deleted {
            return;
        }
        self.file_deleted = true;

        match std::fs::remove_file(&self.file) {
            Ok(()) => debug!("Deleted local file {}", self.file.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Local file {} already gone", self.file.display())
            }
            Err(e) => warn!(
                "Failed to delete local file {}: {}",
                self.file.display(),
                e
            ),
        }
    }
}
