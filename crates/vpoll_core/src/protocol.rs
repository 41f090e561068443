//! Envelopes exchanged between the controller and its poller.
//!
//! Every message is `{ code, data? }`. Typed commands and reports convert to
//! and from envelopes at the boundary; only envelopes cross it.
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::StrategyKind;

const CODE_START: &str = "start";
const CODE_PAUSE: &str = "pause";
const CODE_RESUME: &str = "resume";
const CODE_CHECK: &str = "check";
const CODE_UPDATE: &str = "update";
const CODE_ERROR: &str = "error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            data: None,
        }
    }

    fn with_payload<T: Serialize>(code: &str, payload: &T) -> Result<Self, ProtocolError> {
        let data = serde_json::to_value(payload).map_err(|err| ProtocolError::Encode {
            code: code.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            code: code.to_string(),
            data: Some(data),
        })
    }

    fn payload<T: DeserializeOwned>(self) -> Result<T, ProtocolError> {
        let data = self.data.ok_or_else(|| ProtocolError::MissingPayload {
            code: self.code.clone(),
        })?;
        serde_json::from_value(data).map_err(|err| ProtocolError::MalformedPayload {
            code: self.code,
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown message code {0:?}")]
    UnknownCode(String),
    #[error("message {code:?} requires a payload")]
    MissingPayload { code: String },
    #[error("malformed {code:?} payload: {message}")]
    MalformedPayload { code: String, message: String },
    #[error("failed to encode {code:?} payload: {message}")]
    Encode { code: String, message: String },
}

/// Parameters the poller is started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub vc_type: StrategyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_file_url: Option<String>,
    pub chunk_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_file_url: Option<String>,
    /// Milliseconds.
    pub polling_interval: u64,
    #[serde(default)]
    pub silent_polling_interval: bool,
}

impl StartPayload {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval)
    }
}

/// Controller -> poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerCommand {
    Start(StartPayload),
    Pause,
    Resume,
    /// Run one check now. Any unrecognized code decodes to this.
    Check,
}

impl PollerCommand {
    pub fn into_envelope(self) -> Result<Envelope, ProtocolError> {
        match self {
            PollerCommand::Start(payload) => Envelope::with_payload(CODE_START, &payload),
            PollerCommand::Pause => Ok(Envelope::new(CODE_PAUSE)),
            PollerCommand::Resume => Ok(Envelope::new(CODE_RESUME)),
            PollerCommand::Check => Ok(Envelope::new(CODE_CHECK)),
        }
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        match envelope.code.as_str() {
            CODE_START => envelope.payload().map(PollerCommand::Start),
            CODE_PAUSE => Ok(PollerCommand::Pause),
            CODE_RESUME => Ok(PollerCommand::Resume),
            _ => Ok(PollerCommand::Check),
        }
    }
}

/// A detected fingerprint mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    #[serde(rename = "versionFlag")]
    pub fresh: String,
    #[serde(rename = "localVersionFlag")]
    pub baseline: String,
    #[serde(
        rename = "versionInfo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Config,
    MissingHeader,
    ChunkNotFound,
    MissingVersionField,
    InvalidManifest,
    Network,
    Protocol,
}

/// A failure inside the poller. `fatal` failures end the poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePayload {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default)]
    pub fatal: bool,
}

/// Poller -> controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PollerReport {
    Update(UpdatePayload),
    Failure(FailurePayload),
}

impl PollerReport {
    pub fn into_envelope(self) -> Result<Envelope, ProtocolError> {
        match self {
            PollerReport::Update(payload) => Envelope::with_payload(CODE_UPDATE, &payload),
            PollerReport::Failure(payload) => Envelope::with_payload(CODE_ERROR, &payload),
        }
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        match envelope.code.as_str() {
            CODE_UPDATE => envelope.payload().map(PollerReport::Update),
            CODE_ERROR => envelope.payload().map(PollerReport::Failure),
            other => Err(ProtocolError::UnknownCode(other.to_string())),
        }
    }
}
