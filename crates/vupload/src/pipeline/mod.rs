pub mod error;
pub mod progress;
pub mod recovery;
pub mod runner;

pub use error::RunnerError;
pub use progress::{
    BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter, RecordingProgress,
};
pub use recovery::{recover_jobs, RecoveryReport};
pub use runner::UploadRunner;
