use thiserror::Error;

use crate::broadcast::StoreError;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Completion stream closed while jobs were still running")]
    CompletionsClosed,

    #[error("Checkpoint failed: {0}")]
    Store(#[from] StoreError),

    #[error("Job {job_id} stopped without an outcome")]
    Incomplete { job_id: String },
}
