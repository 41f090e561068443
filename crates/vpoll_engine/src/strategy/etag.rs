use std::sync::Arc;

use vpoll_core::StrategyKind;

use super::{Fingerprint, FingerprintStrategy, StrategyError};
use crate::Fetcher;

/// Fingerprints the HTML document by its `ETag`.
pub struct EtagStrategy {
    fetcher: Arc<dyn Fetcher>,
    url: String,
}

impl EtagStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl FingerprintStrategy for EtagStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Etag
    }

    async fn fingerprint(&self) -> Result<Option<Fingerprint>, StrategyError> {
        let response = self.fetcher.head(&self.url).await?;
        if !response.is_success() {
            return Ok(None);
        }
        let etag = response
            .etag
            .filter(|etag| !etag.is_empty())
            .ok_or_else(|| StrategyError::MissingHeader {
                url: self.url.clone(),
            })?;
        Ok(Some(Fingerprint::new(etag)))
    }
}
