use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, PRAGMA};
use url::Url;

use crate::{FetchError, FetchErrorKind, FetchResponse};

/// Query parameter appended to GET requests to defeat caches.
pub const CACHE_BUST_PARAM: &str = "t";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// `None` leaves requests without an overall deadline.
    pub request_timeout: Option<Duration>,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            max_bytes: 5 * 1024 * 1024,
            user_agent: concat!("vpoll/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Network access used by the fingerprint strategies.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// HEAD request that revalidates with the origin instead of using caches.
    async fn head(&self, url: &str) -> Result<FetchResponse, FetchError>;

    /// Plain GET. Callers add cache busting with [`cache_busted_url`].
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// Appends `t=<now_millis>` to `url`, keeping any existing query.
pub fn cache_busted_url(url: &str, now_millis: i64) -> Result<String, FetchError> {
    let mut parsed =
        Url::parse(url).map_err(|err| FetchError::new(FetchErrorKind::InvalidUrl, err.to_string()))?;
    parsed
        .query_pairs_mut()
        .append_pair(CACHE_BUST_PARAM, &now_millis.to_string());
    Ok(parsed.into())
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .user_agent(settings.user_agent);
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| FetchError::new(FetchErrorKind::Network, err.to_string()))?;

        Ok(Self {
            client,
            max_bytes: settings.max_bytes,
        })
    }

    async fn read(&self, response: reqwest::Response) -> Result<FetchResponse, FetchError> {
        let status = response.status();
        let etag = header_value(&response, ETAG);
        let content_type = header_value(&response, CONTENT_TYPE);

        if !status.is_success() {
            return Ok(FetchResponse {
                status: status.as_u16(),
                etag,
                content_type,
                body: Vec::new(),
            });
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.max_bytes {
                return Err(too_large(self.max_bytes, content_len));
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = body.len() as u64 + chunk.len() as u64;
            if next_len > self.max_bytes {
                return Err(too_large(self.max_bytes, next_len));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResponse {
            status: status.as_u16(),
            etag,
            content_type,
            body,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn head(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let parsed = parse_url(url)?;
        let response = self
            .client
            .head(parsed)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(map_reqwest_error)?;
        self.read(response).await
    }

    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let parsed = parse_url(url)?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        self.read(response).await
    }
}

fn parse_url(url: &str) -> Result<reqwest::Url, FetchError> {
    reqwest::Url::parse(url).map_err(|err| FetchError::new(FetchErrorKind::InvalidUrl, err.to_string()))
}

fn header_value(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::new(
        FetchErrorKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        "response too large",
    )
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FetchErrorKind::Timeout, err.to_string());
    }
    FetchError::new(FetchErrorKind::Network, err.to_string())
}
