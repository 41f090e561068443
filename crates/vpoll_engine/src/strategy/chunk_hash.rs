use std::sync::Arc;

use chrono::Utc;
use vpoll_core::StrategyKind;

use super::{Fingerprint, FingerprintStrategy, StrategyError};
use crate::{cache_busted_url, decode_document, extract_chunk, Fetcher};

/// Fingerprints the HTML document by the hashed script chunk it references.
pub struct ChunkHashStrategy {
    fetcher: Arc<dyn Fetcher>,
    url: String,
    chunk_name: String,
}

impl ChunkHashStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>, url: impl Into<String>, chunk_name: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
            chunk_name: chunk_name.into(),
        }
    }
}

#[async_trait::async_trait]
impl FingerprintStrategy for ChunkHashStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ChunkHash
    }

    async fn fingerprint(&self) -> Result<Option<Fingerprint>, StrategyError> {
        let url = cache_busted_url(&self.url, Utc::now().timestamp_millis())?;
        let response = self.fetcher.get(&url).await?;
        if !response.is_success() {
            return Ok(None);
        }

        let html = decode_document(&response.body, response.content_type.as_deref()).map_err(
            |source| StrategyError::Decode {
                url: self.url.clone(),
                source,
            },
        )?;
        let chunk = extract_chunk(&html, &self.chunk_name).ok_or_else(|| {
            StrategyError::ChunkNotFound {
                url: self.url.clone(),
                chunk_name: self.chunk_name.clone(),
            }
        })?;
        Ok(Some(Fingerprint::new(chunk)))
    }
}
