pub mod phase;
pub mod types;
pub mod upload_job;

pub use phase::Phase;
pub use types::{ActivateResult, CreateResult, Privacy, Video, VideoPrivacy, VideoSettings};
pub use upload_job::{JobOutcome, Transition, UploadJob};
