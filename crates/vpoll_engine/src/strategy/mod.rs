//! Fingerprint strategies and the detector that compares against a baseline.
mod chunk_hash;
mod etag;
mod version_json;

use std::sync::Arc;

use serde_json::Value;
use vpoll_core::{FailureKind, FailurePayload, StartPayload, StrategyKind, UpdatePayload};

use crate::{DecodeError, FetchError, Fetcher};

pub use chunk_hash::ChunkHashStrategy;
pub use etag::EtagStrategy;
pub use version_json::VersionJsonStrategy;

/// "Which build is deployed", as seen by one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub flag: String,
    /// Full manifest for `versionJson`; `None` otherwise.
    pub metadata: Option<Value>,
}

impl Fingerprint {
    pub fn new(flag: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            metadata: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("{field} is required for the {kind} strategy")]
    Config {
        kind: StrategyKind,
        field: &'static str,
    },
    #[error("response from {url} has no etag header")]
    MissingHeader { url: String },
    #[error("no script matching {chunk_name:?} in {url}")]
    ChunkNotFound { url: String, chunk_name: String },
    #[error("manifest at {url} has no version field")]
    MissingVersionField { url: String },
    #[error("manifest at {url} is not valid json: {message}")]
    InvalidManifest { url: String, message: String },
    #[error("failed to decode {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: DecodeError,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl StrategyError {
    /// Configuration errors end the poller; everything else only fails one check.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StrategyError::Config { .. })
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            StrategyError::Config { .. } => FailureKind::Config,
            StrategyError::MissingHeader { .. } => FailureKind::MissingHeader,
            StrategyError::ChunkNotFound { .. } => FailureKind::ChunkNotFound,
            StrategyError::MissingVersionField { .. } => FailureKind::MissingVersionField,
            StrategyError::InvalidManifest { .. } | StrategyError::Decode { .. } => {
                FailureKind::InvalidManifest
            }
            StrategyError::Fetch(_) => FailureKind::Network,
        }
    }

    pub fn to_failure(&self) -> FailurePayload {
        FailurePayload {
            kind: self.kind(),
            message: self.to_string(),
            fatal: self.is_fatal(),
        }
    }
}

/// One way of fingerprinting the deployed application.
#[async_trait::async_trait]
pub trait FingerprintStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Fetches and derives the current fingerprint. `Ok(None)` means the
    /// server answered with a non-2xx status, which is treated as transient.
    async fn fingerprint(&self) -> Result<Option<Fingerprint>, StrategyError>;

    /// Whether `fresh` should be reported against `baseline`.
    fn is_change(&self, fresh: &Fingerprint, baseline: &Fingerprint) -> bool {
        fresh.flag != baseline.flag
    }
}

/// Selects the strategy named by `payload`.
pub fn build_strategy(
    payload: &StartPayload,
    fetcher: Arc<dyn Fetcher>,
) -> Result<Arc<dyn FingerprintStrategy>, StrategyError> {
    let kind = payload.vc_type;
    let strategy: Arc<dyn FingerprintStrategy> = match kind {
        StrategyKind::Etag => Arc::new(EtagStrategy::new(
            fetcher,
            required_url(kind, "htmlFileUrl", payload.html_file_url.as_deref())?,
        )),
        StrategyKind::ChunkHash => Arc::new(ChunkHashStrategy::new(
            fetcher,
            required_url(kind, "htmlFileUrl", payload.html_file_url.as_deref())?,
            payload.chunk_name.clone(),
        )),
        StrategyKind::VersionJson => Arc::new(VersionJsonStrategy::new(
            fetcher,
            required_url(kind, "versionFileUrl", payload.version_file_url.as_deref())?,
        )),
    };
    Ok(strategy)
}

fn required_url(
    kind: StrategyKind,
    field: &'static str,
    url: Option<&str>,
) -> Result<String, StrategyError> {
    match url.map(str::trim) {
        Some(url) if !url.is_empty() => Ok(url.to_string()),
        _ => Err(StrategyError::Config { kind, field }),
    }
}

/// A fingerprint mismatch worth reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub fresh: Fingerprint,
    pub baseline: Fingerprint,
}

impl From<Change> for UpdatePayload {
    fn from(change: Change) -> Self {
        UpdatePayload {
            fresh: change.fresh.flag,
            baseline: change.baseline.flag,
            metadata: change.fresh.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Unchanged,
    Changed(Change),
    /// Non-2xx response; nothing to compare.
    Skipped,
    /// There was no baseline yet; this fingerprint should become it.
    Baseline(Fingerprint),
}

/// Pairs a strategy with the baseline captured when the cycle started.
///
/// Checks never replace an existing baseline; only a new cycle does.
#[derive(Clone)]
pub struct Detector {
    strategy: Arc<dyn FingerprintStrategy>,
    baseline: Option<Fingerprint>,
}

impl Detector {
    pub fn new(strategy: Arc<dyn FingerprintStrategy>) -> Self {
        Self {
            strategy,
            baseline: None,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn baseline(&self) -> Option<&Fingerprint> {
        self.baseline.as_ref()
    }

    /// Fetches once and stores the result as the baseline.
    pub async fn establish_baseline(&mut self) -> Result<Option<&Fingerprint>, StrategyError> {
        self.baseline = self.strategy.fingerprint().await?;
        Ok(self.baseline.as_ref())
    }

    pub async fn check_for_change(&self) -> Result<CheckOutcome, StrategyError> {
        let Some(fresh) = self.strategy.fingerprint().await? else {
            return Ok(CheckOutcome::Skipped);
        };
        let outcome = match &self.baseline {
            None => CheckOutcome::Baseline(fresh),
            Some(baseline) if self.strategy.is_change(&fresh, baseline) => {
                CheckOutcome::Changed(Change {
                    fresh,
                    baseline: baseline.clone(),
                })
            }
            Some(_) => CheckOutcome::Unchanged,
        };
        Ok(outcome)
    }

    /// Fills a missing baseline. An existing baseline is kept.
    pub fn adopt_baseline(&mut self, fingerprint: Fingerprint) -> bool {
        if self.baseline.is_some() {
            return false;
        }
        self.baseline = Some(fingerprint);
        true
    }
}
