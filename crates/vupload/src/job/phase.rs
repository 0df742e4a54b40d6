use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Step of the publish workflow. Ordering follows the workflow, so phases
/// can be compared directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Create,
    Upload,
    Activate,
    Settings,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Create, Phase::Upload, Phase::Activate, Phase::Settings];

    /// The phase that follows this one, ignoring whether settings were requested.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Create => Some(Phase::Upload),
            Phase::Upload => Some(Phase::Activate),
            Phase::Activate => Some(Phase::Settings),
            Phase::Settings => None,
        }
    }

    /// Stable tag used in persisted records and the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Create => "create",
            Phase::Upload => "upload",
            Phase::Activate => "activate",
            Phase::Settings => "settings",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Create => write!(f, "Creating video"),
            Phase::Upload => write!(f, "Uploading"),
            Phase::Activate => write!(f, "Activating"),
            Phase::Settings => write!(f, "Applying settings"),
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Phase::Create),
            "upload" => Ok(Phase::Upload),
            "activate" => Ok(Phase::Activate),
            "settings" => Ok(Phase::Settings),
            other => Err(CodecError::UnknownPhase(other.to_string())),
        }
    }
}
