//! Version polling engine: network fetches, fingerprint strategies, the
//! background poller task and the controller that drives it.
mod chunk;
mod controller;
mod decode;
mod fetch;
mod host;
mod poller;
mod strategy;
mod types;

pub use chunk::extract_chunk;
pub use controller::{
    create_version_polling, ControllerError, HostEnvironment, UpdateCallback, VersionPolling,
};
pub use decode::{decode_document, DecodeError};
pub use fetch::{cache_busted_url, FetchSettings, Fetcher, ReqwestFetcher, CACHE_BUST_PARAM};
pub use host::{EventHub, EventKey, HostEvent, ListenerId, PageHost};
pub use poller::PollerHandle;
pub use strategy::{
    build_strategy, Change, CheckOutcome, ChunkHashStrategy, Detector, EtagStrategy,
    Fingerprint, FingerprintStrategy, StrategyError, VersionJsonStrategy,
};
pub use types::{FetchError, FetchErrorKind, FetchResponse};
