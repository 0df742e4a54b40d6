//! Transport port: the boundary between the job state machine and whatever
//! actually performs network requests.
//!
//! A transport starts one operation per request descriptor, reports each
//! operation's outcome exactly once on a completion stream (unless it was
//! cancelled), and can be asked whether an operation still exists.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{Phase, VideoSettings};

pub mod http;
pub mod memory;
pub mod request;

pub use http::HttpTransport;
pub use memory::InMemoryTransport;
pub use request::{RequestBuilder, TransferProgress};

/// Identifier of an operation started by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A live operation known to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub id: OperationId,
    pub phase: Phase,
}

/// Failure raised by the transport before any bytes were exchanged with the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    pub message: String,
    pub timed_out: bool,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(f, "{} (timed out)", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Raw terminal result of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// HTTP status, 0 when no response was received.
    pub status: u16,
    /// Value of the `Location` header, if any.
    pub location: Option<String>,
    pub body: Option<Vec<u8>>,
    pub client_error: Option<ClientError>,
}

impl Outcome {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_json(self, body: &serde_json::Value) -> Self {
        self.with_body(body.to_string())
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Outcome for a request that never got a response.
    pub fn client_failure(error: ClientError) -> Self {
        Self {
            client_error: Some(error),
            ..Default::default()
        }
    }
}

/// Everything needed to build the request for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestDescriptor {
    Create {
        file: PathBuf,
    },
    Upload {
        file: PathBuf,
        destination: String,
    },
    Activate {
        activation_uri: String,
    },
    Settings {
        video_uri: String,
        settings: VideoSettings,
    },
}

impl RequestDescriptor {
    pub fn phase(&self) -> Phase {
        match self {
            RequestDescriptor::Create { .. } => Phase::Create,
            RequestDescriptor::Upload { .. } => Phase::Upload,
            RequestDescriptor::Activate { .. } => Phase::Activate,
            RequestDescriptor::Settings { .. } => Phase::Settings,
        }
    }
}

/// The transport could not build or issue a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("Local file '{path}' is unreadable: {reason}")]
    UnreadableFile { path: PathBuf, reason: String },

    #[error("Invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build request: {0}")]
    InvalidRequest(String),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// `(operation, outcome)` pair delivered on a transport's completion stream.
pub type Completion = (OperationId, Outcome);

pub trait Transport: Send + Sync {
    /// Starts the request and returns the identifier of the new operation.
    fn start(&self, request: RequestDescriptor) -> Result<OperationId, StartError>;

    /// Returns the operation if the transport still knows about it.
    fn lookup(&self, id: &OperationId) -> Option<OperationHandle>;

    /// Cancels the operation. No completion is delivered afterwards.
    fn cancel(&self, id: &OperationId);

    /// Best-effort fraction of bytes sent, in `0.0..=1.0`.
    fn progress(&self, id: &OperationId) -> Option<f64>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn start(&self, request: RequestDescriptor) -> Result<OperationId, StartError> {
        (**self).start(request)
    }

    fn lookup(&self, id: &OperationId) -> Option<OperationHandle> {
        (**self).lookup(id)
    }

    fn cancel(&self, id: &OperationId) {
        (**self).cancel(id)
    }

    fn progress(&self, id: &OperationId) -> Option<f64> {
        (**self).progress(id)
    }
}
