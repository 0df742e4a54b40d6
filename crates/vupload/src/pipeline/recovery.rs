//! Reconnects persisted jobs after the host restarts.

use log::{info, warn};

use crate::broadcast::{JobStore, StoreError};
use crate::error::UploadError;
use crate::job::UploadJob;
use crate::transport::Transport;

#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Jobs whose operation is still alive. Hand these to the runner.
    pub resumed: Vec<UploadJob>,
    /// Jobs whose operation disappeared. Already completed with an
    /// orphaned-state error.
    pub orphaned: Vec<UploadJob>,
    /// Jobs that had already completed before the restart.
    pub finished: Vec<UploadJob>,
    /// Records that could not be decoded, by job id.
    pub corrupt: Vec<(String, UploadError)>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.resumed.is_empty()
            && self.orphaned.is_empty()
            && self.finished.is_empty()
            && self.corrupt.is_empty()
    }
}

/// Loads every persisted job and reattaches it to `transport`.
///
/// Records that end up completed (orphaned, finished or corrupt) are removed
/// from the store; resumed jobs stay persisted.
pub fn recover_jobs<T: Transport + ?Sized>(
    store: &JobStore,
    transport: &T,
) -> Result<RecoveryReport, StoreError> {
    let loaded = store.load_all()?;
    let mut report = RecoveryReport::default();

    for (id, err) in loaded.corrupt {
        let error = UploadError::corrupt_record(&err);
        warn!("Discarding persisted job {}: {}", id, error);
        store.remove(&id)?;
        report.corrupt.push((id, error));
    }

    for mut job in loaded.jobs {
        if job.is_completed() {
            store.remove(job.id())?;
            report.finished.push(job);
            continue;
        }

        match job.reattach(transport) {
            Ok(()) => {
                info!("Resuming job {} in phase {}", job.id(), job.phase().as_str());
                report.resumed.push(job);
            }
            Err(e) => {
                warn!("Job {} cannot resume: {}", job.id(), e);
                store.remove(job.id())?;
                report.orphaned.push(job);
            }
        }
    }

    info!(
        "Recovered {} job(s): {} resumed, {} orphaned, {} corrupt",
        report.resumed.len() + report.orphaned.len() + report.finished.len(),
        report.resumed.len(),
        report.orphaned.len(),
        report.corrupt.len()
    );

    Ok(report)
}
