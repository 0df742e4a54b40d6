//! Progress broadcasting and job persistence.
//!
//! Hosts subscribe to job progress events to display upload status, and the
//! job store keeps in-flight jobs across restarts.

pub mod job_progress;
pub mod job_store;

pub use job_progress::{JobProgressBroadcaster, JobProgressEvent, JobProgressTracker, JobStatus};
pub use job_store::{JobStore, LoadedJobs, StoreError, StoredJob};
