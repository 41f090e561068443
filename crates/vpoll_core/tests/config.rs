use std::time::Duration;

use pretty_assertions::assert_eq;
use url::Url;
use vpoll_core::{StrategyKind, WatchConfig, WatchOptions, DEFAULT_POLLING_INTERVAL};

#[test]
fn defaults_derive_urls_from_page() {
    let page = Url::parse("https://app.example.com/console/?tab=1#top").unwrap();
    let config = WatchConfig::for_page(&page);

    assert_eq!(config.vc_type, StrategyKind::Etag);
    assert_eq!(
        config.html_file_url.as_deref(),
        Some("https://app.example.com/console/")
    );
    assert_eq!(
        config.version_file_url.as_deref(),
        Some("https://app.example.com/console/version.json")
    );
    assert_eq!(config.chunk_name, "index");
    assert_eq!(config.polling_interval, DEFAULT_POLLING_INTERVAL);
    assert!(config.event_trigger_list.is_empty());
    assert!(!config.silent);
    assert!(!config.silent_polling_interval);
    assert!(!config.silent_page_visibility);
}

#[test]
fn defaults_without_page_leave_urls_unset() {
    let config = WatchConfig::default();
    assert_eq!(config.html_file_url, None);
    assert_eq!(config.version_file_url, None);
}

#[test]
fn merge_prefers_overrides_field_by_field() {
    let file = WatchOptions {
        vc_type: Some(StrategyKind::ChunkHash),
        chunk_name: Some("app".to_string()),
        polling_interval: Some(60_000),
        ..WatchOptions::default()
    };
    let flags = WatchOptions {
        polling_interval: Some(1_000),
        silent_page_visibility: Some(true),
        ..WatchOptions::default()
    };

    let config = file.merge(flags).resolve(None);
    assert_eq!(config.vc_type, StrategyKind::ChunkHash);
    assert_eq!(config.chunk_name, "app");
    assert_eq!(config.polling_interval, Duration::from_secs(1));
    assert!(config.silent_page_visibility);
}

#[test]
fn explicit_urls_beat_page_defaults() {
    let page = Url::parse("https://app.example.com/").unwrap();
    let options = WatchOptions {
        version_file_url: Some("https://cdn.example.com/meta.json".to_string()),
        ..WatchOptions::default()
    };
    let config = options.resolve(Some(&page));
    assert_eq!(
        config.version_file_url.as_deref(),
        Some("https://cdn.example.com/meta.json")
    );
    assert_eq!(
        config.html_file_url.as_deref(),
        Some("https://app.example.com/")
    );
}

#[test]
fn options_deserialize_from_camel_case_names() {
    let json = r#"{
        "vcType": "versionJson",
        "eventTriggerList": ["focus"],
        "pollingInterval": 30000,
        "silentPollingInterval": true
    }"#;
    let options: WatchOptions = serde_json::from_str(json).unwrap();
    assert_eq!(options.vc_type, Some(StrategyKind::VersionJson));
    assert_eq!(options.event_trigger_list, Some(vec!["focus".to_string()]));
    assert_eq!(options.polling_interval, Some(30_000));
    assert_eq!(options.silent_polling_interval, Some(true));
    assert_eq!(options.silent, None);
}

#[test]
fn strategy_names_parse_case_insensitively() {
    assert_eq!("chunkhash".parse::<StrategyKind>(), Ok(StrategyKind::ChunkHash));
    assert_eq!("versionJson".parse::<StrategyKind>(), Ok(StrategyKind::VersionJson));
    assert!("md5".parse::<StrategyKind>().is_err());
}
