#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use serde_json::Value;
use vpoll_engine::{FetchError, FetchResponse, Fetcher, PageHost};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(vpoll_logging::initialize_for_tests);
}

pub fn etag(tag: &str) -> FetchResponse {
    FetchResponse {
        status: 200,
        etag: Some(tag.to_string()),
        ..FetchResponse::default()
    }
}

pub fn status(code: u16) -> FetchResponse {
    FetchResponse {
        status: code,
        ..FetchResponse::default()
    }
}

pub fn html(body: &str) -> FetchResponse {
    FetchResponse {
        status: 200,
        content_type: Some("text/html; charset=utf-8".to_string()),
        body: body.as_bytes().to_vec(),
        ..FetchResponse::default()
    }
}

pub fn json(value: Value) -> FetchResponse {
    FetchResponse {
        status: 200,
        content_type: Some("application/json".to_string()),
        body: value.to_string().into_bytes(),
        ..FetchResponse::default()
    }
}

/// Serves scripted responses in order and repeats the last one forever.
#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<FetchResponse>>,
    urls: Mutex<Vec<String>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<FetchResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    /// Every response resolves only after `delay`.
    pub fn delayed(script: Vec<FetchResponse>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    async fn respond(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        let response = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap_or_else(|| status(404))
            }
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn head(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.respond(url).await
    }

    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.respond(url).await
    }
}

#[derive(Default)]
pub struct RecordingPage {
    reloads: AtomicUsize,
}

impl RecordingPage {
    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl PageHost for RecordingPage {
    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}
