use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::StartPayload;

pub const DEFAULT_CHUNK_NAME: &str = "index";
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Manifest file looked up next to the page when no version file URL is given.
pub const VERSION_FILE_NAME: &str = "version.json";

/// How the deployed build is fingerprinted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    /// ETag validator of the HTML document.
    #[default]
    Etag,
    /// Hashed script filename referenced by the HTML document.
    ChunkHash,
    /// `version` field of a JSON manifest.
    VersionJson,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Etag => "etag",
            StrategyKind::ChunkHash => "chunkHash",
            StrategyKind::VersionJson => "versionJson",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown strategy {0:?} (expected etag, chunkHash or versionJson)")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            StrategyKind::Etag,
            StrategyKind::ChunkHash,
            StrategyKind::VersionJson,
        ]
        .into_iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

/// Caller-supplied partial options. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchOptions {
    pub vc_type: Option<StrategyKind>,
    pub html_file_url: Option<String>,
    pub chunk_name: Option<String>,
    pub version_file_url: Option<String>,
    pub event_trigger_list: Option<Vec<String>>,
    /// Milliseconds between periodic checks.
    pub polling_interval: Option<u64>,
    pub silent: Option<bool>,
    pub silent_polling_interval: Option<bool>,
    pub silent_page_visibility: Option<bool>,
}

impl WatchOptions {
    /// Field-by-field merge where set fields of `overrides` win.
    pub fn merge(self, overrides: WatchOptions) -> WatchOptions {
        WatchOptions {
            vc_type: overrides.vc_type.or(self.vc_type),
            html_file_url: overrides.html_file_url.or(self.html_file_url),
            chunk_name: overrides.chunk_name.or(self.chunk_name),
            version_file_url: overrides.version_file_url.or(self.version_file_url),
            event_trigger_list: overrides.event_trigger_list.or(self.event_trigger_list),
            polling_interval: overrides.polling_interval.or(self.polling_interval),
            silent: overrides.silent.or(self.silent),
            silent_polling_interval: overrides
                .silent_polling_interval
                .or(self.silent_polling_interval),
            silent_page_visibility: overrides
                .silent_page_visibility
                .or(self.silent_page_visibility),
        }
    }

    /// Applies defaults. URL defaults are derived from `page_url` when given:
    /// the page's origin and path, and `version.json` resolved against it.
    pub fn resolve(self, page_url: Option<&Url>) -> WatchConfig {
        let page = page_url.map(|url| {
            let mut page = url.clone();
            page.set_query(None);
            page.set_fragment(None);
            page
        });
        let default_html = page.as_ref().map(Url::to_string);
        let default_version = page
            .as_ref()
            .and_then(|page| page.join(VERSION_FILE_NAME).ok())
            .map(|url| url.to_string());

        WatchConfig {
            vc_type: self.vc_type.unwrap_or_default(),
            html_file_url: self.html_file_url.or(default_html),
            chunk_name: self
                .chunk_name
                .unwrap_or_else(|| DEFAULT_CHUNK_NAME.to_string()),
            version_file_url: self.version_file_url.or(default_version),
            event_trigger_list: self.event_trigger_list.unwrap_or_default(),
            polling_interval: self
                .polling_interval
                .map_or(DEFAULT_POLLING_INTERVAL, Duration::from_millis),
            silent: self.silent.unwrap_or(false),
            silent_polling_interval: self.silent_polling_interval.unwrap_or(false),
            silent_page_visibility: self.silent_page_visibility.unwrap_or(false),
        }
    }
}

/// Fully resolved configuration, fixed for the lifetime of one controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub vc_type: StrategyKind,
    pub html_file_url: Option<String>,
    pub chunk_name: String,
    pub version_file_url: Option<String>,
    pub event_trigger_list: Vec<String>,
    pub polling_interval: Duration,
    /// Never start a poller.
    pub silent: bool,
    /// Establish a baseline but never schedule periodic checks.
    pub silent_polling_interval: bool,
    /// Ignore page visibility changes.
    pub silent_page_visibility: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchOptions::default().resolve(None)
    }
}

impl WatchConfig {
    /// Defaults for a page served at `page_url`.
    pub fn for_page(page_url: &Url) -> Self {
        WatchOptions::default().resolve(Some(page_url))
    }

    /// The fragment of this configuration the poller needs.
    pub fn start_payload(&self) -> StartPayload {
        StartPayload {
            vc_type: self.vc_type,
            html_file_url: self.html_file_url.clone(),
            chunk_name: self.chunk_name.clone(),
            version_file_url: self.version_file_url.clone(),
            polling_interval: u64::try_from(self.polling_interval.as_millis()).unwrap_or(u64::MAX),
            silent_polling_interval: self.silent_polling_interval,
        }
    }
}
