use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::Phase;

#[derive(Error, Debug)]
pub enum VuploadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Persisted record error: {0}")]
    Codec(#[from] CodecError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job store error: {0}")]
    Store(#[from] crate::broadcast::StoreError),

    #[error("Runner error: {0}")]
    Runner(#[from] crate::pipeline::RunnerError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::StartError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Failed to create staging directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rejections produced while encoding or decoding a persisted job record.
///
/// Any decode failure means the record is unrecoverable; it never affects
/// other records.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Persisted job is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to encode job: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Persisted job is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Unsupported persisted job schema version {0}")]
    UnsupportedVersion(u32),

    #[error("Unrecognized phase '{0}'")]
    UnknownPhase(String),
}

/// Which step of the workflow produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    Create,
    Upload,
    Activate,
    VideoSettings,
    Persistence,
}

impl ErrorDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorDomain::Create => "create",
            ErrorDomain::Upload => "upload",
            ErrorDomain::Activate => "activate",
            ErrorDomain::VideoSettings => "video_settings",
            ErrorDomain::Persistence => "persistence",
        }
    }
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Phase> for ErrorDomain {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Create => ErrorDomain::Create,
            Phase::Upload => ErrorDomain::Upload,
            Phase::Activate => ErrorDomain::Activate,
            Phase::Settings => ErrorDomain::VideoSettings,
        }
    }
}

/// Classification of a terminal upload failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request for a phase could not be built or issued.
    Start,
    /// Connectivity, timeout or similar failure before any server response.
    ClientTransport,
    /// The server answered outside 200-299.
    BadStatus { status: u16 },
    /// The response lacked required fields or could not be decoded.
    MalformedResponse,
    /// A restored job's outstanding operation no longer exists.
    OrphanedState,
    /// A persisted record failed validation on reload.
    CorruptPersistedRecord,
}

/// A classified, domain-tagged error. Once set on a job it is final.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{domain} failed: {message}")]
pub struct UploadError {
    pub domain: ErrorDomain,
    pub kind: ErrorKind,
    pub message: String,
}

impl UploadError {
    pub fn new(domain: impl Into<ErrorDomain>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn start(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(phase, ErrorKind::Start, message)
    }

    pub fn client_transport(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(phase, ErrorKind::ClientTransport, message)
    }

    pub fn bad_status(phase: Phase, status: u16) -> Self {
        Self::new(
            phase,
            ErrorKind::BadStatus { status },
            format!("Invalid HTTP status code {}", status),
        )
    }

    pub fn malformed(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(phase, ErrorKind::MalformedResponse, message)
    }

    pub fn orphaned(phase: Phase) -> Self {
        Self::new(
            phase,
            ErrorKind::OrphanedState,
            "No operation associated with persisted job",
        )
    }

    pub fn corrupt_record(err: &CodecError) -> Self {
        Self::new(
            ErrorDomain::Persistence,
            ErrorKind::CorruptPersistedRecord,
            err.to_string(),
        )
    }

    /// The phase this error is tagged with, if it came from a phase.
    pub fn phase(&self) -> Option<Phase> {
        match self.domain {
            ErrorDomain::Create => Some(Phase::Create),
            ErrorDomain::Upload => Some(Phase::Upload),
            ErrorDomain::Activate => Some(Phase::Activate),
            ErrorDomain::VideoSettings => Some(Phase::Settings),
            ErrorDomain::Persistence => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, VuploadError>;
