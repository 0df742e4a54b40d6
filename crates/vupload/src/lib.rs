pub mod broadcast;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod response;
pub mod staging;
pub mod transport;

pub use broadcast::{JobProgressBroadcaster, JobProgressEvent, JobStore, StoreError};
pub use config::{load_config, Config};
pub use error::{
    CodecError, ConfigError, ErrorDomain, ErrorKind, Result, StagingError, UploadError,
    VuploadError,
};
pub use job::{JobOutcome, Phase, Privacy, Transition, UploadJob, VideoSettings};
pub use pipeline::{recover_jobs, RecoveryReport, UploadRunner};
pub use staging::StagingArea;
pub use transport::{
    HttpTransport, InMemoryTransport, OperationId, Outcome, RequestDescriptor, Transport,
};
