//! Versioned persistence format for upload jobs.
//!
//! A record captures everything needed to rebuild a job after the host
//! process was terminated. The settings result is not persisted; it only
//! exists on a job that already completed.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, UploadError};
use crate::job::upload_job::Origin;
use crate::job::{ActivateResult, CreateResult, Phase, UploadJob, VideoSettings};
use crate::transport::OperationId;

/// Current record layout. Any other version is rejected on decode.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct RecordRef<'a> {
    schema_version: u32,
    id: &'a str,
    file: &'a PathBuf,
    settings: Option<&'a VideoSettings>,
    phase: &'static str,
    pending_operation_id: Option<&'a OperationId>,
    create_result: Option<&'a CreateResult>,
    activate_result: Option<&'a ActivateResult>,
    terminal_error: Option<&'a UploadError>,
    completed: bool,
    cancelled: bool,
}

/// Lenient mirror of the record so missing fields can be reported by name.
#[derive(Deserialize)]
struct RawRecord {
    schema_version: Option<u32>,
    id: Option<String>,
    file: Option<PathBuf>,
    #[serde(default)]
    settings: Option<VideoSettings>,
    phase: Option<String>,
    #[serde(default)]
    pending_operation_id: Option<OperationId>,
    #[serde(default)]
    create_result: Option<CreateResult>,
    #[serde(default)]
    activate_result: Option<ActivateResult>,
    #[serde(default)]
    terminal_error: Option<UploadError>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    cancelled: bool,
}

/// Encodes `job` into JSON bytes.
pub fn encode(job: &UploadJob) -> Result<Vec<u8>, CodecError> {
    let record = RecordRef {
        schema_version: SCHEMA_VERSION,
        id: &job.id,
        file: &job.file,
        settings: job.settings.as_ref(),
        phase: job.phase.as_str(),
        pending_operation_id: job.pending_operation.as_ref(),
        create_result: job.create_result.as_ref(),
        activate_result: job.activate_result.as_ref(),
        terminal_error: job.terminal_error.as_ref(),
        completed: job.completed,
        cancelled: job.cancelled,
    };

    serde_json::to_vec(&record).map_err(CodecError::Encode)
}

/// Rebuilds a job from bytes produced by [`encode`].
///
/// The returned job is marked restored and must be reattached, not started.
pub fn decode(bytes: &[u8]) -> Result<UploadJob, CodecError> {
    let raw: RawRecord = serde_json::from_slice(bytes)?;

    match raw.schema_version {
        Some(SCHEMA_VERSION) => {}
        Some(other) => return Err(CodecError::UnsupportedVersion(other)),
        None => return Err(CodecError::MissingField("schema_version")),
    }

    let id = raw
        .id
        .filter(|id| !id.is_empty())
        .ok_or(CodecError::MissingField("id"))?;

    let file = raw
        .file
        .filter(|file| !file.as_os_str().is_empty())
        .ok_or(CodecError::MissingField("file"))?;

    let phase: Phase = raw
        .phase
        .ok_or(CodecError::MissingField("phase"))?
        .parse()?;

    // A successful finish leaves no error behind, so only the flag marks it.
    let completed = raw.completed || raw.terminal_error.is_some() || raw.cancelled;
    // A live job without an operation has nothing to reattach to; reattach
    // turns that into an orphaned error.
    let pending_operation = if completed {
        None
    } else {
        raw.pending_operation_id
    };

    Ok(UploadJob {
        id,
        file,
        settings: raw.settings,
        phase,
        pending_operation,
        create_result: raw.create_result,
        activate_result: raw.activate_result,
        settings_result: None,
        terminal_error: raw.terminal_error,
        completed,
        cancelled: raw.cancelled,
        // Past Upload the file was already removed.
        file_deleted: phase > Phase::Upload,
        origin: Origin::Restored,
        started: false,
    })
}
