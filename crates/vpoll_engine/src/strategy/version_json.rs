use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use vpoll_core::{is_upgrade, StrategyKind};

use super::{Fingerprint, FingerprintStrategy, StrategyError};
use crate::{cache_busted_url, Fetcher};

/// Fingerprints a JSON manifest by its `version` field.
pub struct VersionJsonStrategy {
    fetcher: Arc<dyn Fetcher>,
    url: String,
}

impl VersionJsonStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl FingerprintStrategy for VersionJsonStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::VersionJson
    }

    async fn fingerprint(&self) -> Result<Option<Fingerprint>, StrategyError> {
        let url = cache_busted_url(&self.url, Utc::now().timestamp_millis())?;
        let response = self.fetcher.get(&url).await?;
        if !response.is_success() {
            return Ok(None);
        }

        let manifest: Value =
            serde_json::from_slice(&response.body).map_err(|err| StrategyError::InvalidManifest {
                url: self.url.clone(),
                message: err.to_string(),
            })?;
        let version = version_field(&manifest).ok_or_else(|| StrategyError::MissingVersionField {
            url: self.url.clone(),
        })?;

        Ok(Some(Fingerprint {
            flag: version,
            metadata: Some(manifest),
        }))
    }

    /// Rollbacks and equal redeploys are not updates.
    fn is_change(&self, fresh: &Fingerprint, baseline: &Fingerprint) -> bool {
        is_upgrade(&fresh.flag, &baseline.flag)
    }
}

fn version_field(manifest: &Value) -> Option<String> {
    match manifest.get("version")? {
        Value::String(version) if !version.trim().is_empty() => Some(version.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
