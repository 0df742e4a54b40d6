//! Classifies raw transport outcomes into typed phase results.
//!
//! Every function checks, in order: a client-side transport error, a body
//! that does not decode as a JSON object, a status outside 200-299, and
//! finally the phase-specific shape. The first failure wins and is tagged
//! with the phase's domain.

use serde_json::{Map, Value};

use crate::error::UploadError;
use crate::job::{ActivateResult, CreateResult, Phase, Video};
use crate::transport::Outcome;

/// Typed success value for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseValue {
    Created(CreateResult),
    Uploaded,
    Activated(ActivateResult),
    Configured(Video),
}

/// Interprets `outcome` as the response to `phase`.
pub fn interpret(phase: Phase, outcome: &Outcome) -> Result<PhaseValue, UploadError> {
    match phase {
        Phase::Create => interpret_create(outcome).map(PhaseValue::Created),
        Phase::Upload => interpret_upload(outcome).map(|()| PhaseValue::Uploaded),
        Phase::Activate => interpret_activate(outcome).map(PhaseValue::Activated),
        Phase::Settings => interpret_settings(outcome).map(PhaseValue::Configured),
    }
}

pub fn interpret_create(outcome: &Outcome) -> Result<CreateResult, UploadError> {
    let body = decode_checked(Phase::Create, outcome)?;

    match (
        string_field(&body, "upload_link_secure"),
        string_field(&body, "complete_uri"),
    ) {
        (Some(upload_uri), Some(activation_uri)) => Ok(CreateResult {
            upload_uri,
            activation_uri,
        }),
        _ => Err(UploadError::malformed(
            Phase::Create,
            "Create response did not contain the required values",
        )),
    }
}

/// Upload has no body to parse; only transport and status failures count.
pub fn interpret_upload(outcome: &Outcome) -> Result<(), UploadError> {
    check_client_error(Phase::Upload, outcome)?;
    check_status(Phase::Upload, outcome)
}

pub fn interpret_activate(outcome: &Outcome) -> Result<ActivateResult, UploadError> {
    decode_checked(Phase::Activate, outcome)?;

    match outcome.location.as_deref().map(str::trim) {
        Some(location) if !location.is_empty() => Ok(ActivateResult {
            video_uri: location.to_string(),
        }),
        _ => Err(UploadError::malformed(
            Phase::Activate,
            "Activate response did not contain the required value",
        )),
    }
}

pub fn interpret_settings(outcome: &Outcome) -> Result<Video, UploadError> {
    let body = decode_checked(Phase::Settings, outcome)?;
    if body.is_empty() {
        return Err(UploadError::malformed(
            Phase::Settings,
            "Video settings response body is empty",
        ));
    }

    serde_json::from_value(Value::Object(body)).map_err(|e| {
        UploadError::malformed(
            Phase::Settings,
            format!("Video settings response did not contain a video: {}", e),
        )
    })
}

/// Shared prefix of the body-carrying phases.
fn decode_checked(phase: Phase, outcome: &Outcome) -> Result<Map<String, Value>, UploadError> {
    check_client_error(phase, outcome)?;
    let body = decode_object(phase, outcome)?;
    check_status(phase, outcome)?;
    Ok(body)
}

fn check_client_error(phase: Phase, outcome: &Outcome) -> Result<(), UploadError> {
    match &outcome.client_error {
        Some(error) => Err(UploadError::client_transport(phase, error.to_string())),
        None => Ok(()),
    }
}

fn check_status(phase: Phase, outcome: &Outcome) -> Result<(), UploadError> {
    if (200..=299).contains(&outcome.status) {
        Ok(())
    } else {
        Err(UploadError::bad_status(phase, outcome.status))
    }
}

/// An absent or empty body decodes as an empty object.
fn decode_object(phase: Phase, outcome: &Outcome) -> Result<Map<String, Value>, UploadError> {
    let bytes = match outcome.body.as_deref() {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Ok(Map::new()),
    };

    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        UploadError::malformed(phase, format!("Response body is not valid JSON: {}", e))
    })?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(UploadError::malformed(
            phase,
            "Response body is not a JSON object",
        )),
    }
}

fn string_field(body: &Map<String, Value>, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}
