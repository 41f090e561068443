mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{etag, init_logging, json, RecordingPage, ScriptedFetcher};
use serde_json::{json, Value};
use tokio::time::sleep;
use vpoll_core::{StrategyKind, Visibility, WatchConfig};
use vpoll_engine::{
    create_version_polling, EventHub, FetchSettings, Fetcher, HostEnvironment, ReqwestFetcher,
    VersionPolling,
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE: &str = "https://example.com/";

fn config(kind: StrategyKind) -> WatchConfig {
    WatchConfig {
        vc_type: kind,
        html_file_url: Some(PAGE.to_string()),
        version_file_url: Some(format!("{PAGE}version.json")),
        polling_interval: Duration::from_secs(1),
        ..WatchConfig::default()
    }
}

struct Harness {
    events: EventHub,
    page: Arc<RecordingPage>,
    updates: Arc<Mutex<Vec<Option<Value>>>>,
    polling: VersionPolling,
}

impl Harness {
    fn start(config: WatchConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        init_logging();
        let events = EventHub::new();
        let page = Arc::new(RecordingPage::default());
        let updates = Arc::new(Mutex::new(Vec::new()));
        let env = HostEnvironment::new(events.clone(), page.clone(), fetcher);

        let seen = updates.clone();
        let polling = create_version_polling(config, env, move |_, metadata| {
            seen.lock().unwrap().push(metadata.cloned());
        })
        .expect("inside a runtime");

        Self {
            events,
            page,
            updates,
            polling,
        }
    }

    fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

#[tokio::test]
async fn etag_change_invokes_callback_once() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"a\""))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"b\""))
        .mount(&server)
        .await;

    let fetcher = Arc::new(ReqwestFetcher::new(FetchSettings::default()).unwrap());
    let harness = Harness::start(
        WatchConfig {
            polling_interval: Duration::from_millis(50),
            event_trigger_list: vec!["focus".to_string()],
            ..WatchConfig::for_page(&format!("{}/", server.uri()).parse().unwrap())
        },
        fetcher,
    );
    assert!(harness.polling.is_watching());
    assert_eq!(harness.events.listener_count(), 2);

    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.update_count() == 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("update within timeout");
    sleep(Duration::from_millis(300)).await;

    assert_eq!(harness.update_count(), 1);
    assert_eq!(harness.updates.lock().unwrap()[0], None);
    assert!(!harness.polling.is_watching());
    assert_eq!(harness.events.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn silent_mode_spawns_nothing() {
    let fetcher = ScriptedFetcher::new(vec![etag("a")]);
    let harness = Harness::start(
        WatchConfig {
            silent: true,
            event_trigger_list: vec!["focus".to_string()],
            ..config(StrategyKind::Etag)
        },
        fetcher.clone(),
    );

    sleep(Duration::from_secs(10)).await;

    assert!(!harness.polling.is_watching());
    assert_eq!(harness.events.listener_count(), 0);
    assert_eq!(fetcher.calls(), 0);

    harness.polling.start();
    assert!(!harness.polling.is_watching());
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let fetcher = ScriptedFetcher::new(vec![etag("a")]);
    let harness = Harness::start(config(StrategyKind::Etag), fetcher.clone());
    sleep(Duration::from_millis(10)).await;
    assert_eq!(harness.events.listener_count(), 1);

    harness.polling.stop();
    harness.polling.stop();

    assert!(!harness.polling.is_watching());
    assert_eq!(harness.events.listener_count(), 0);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_the_running_poller() {
    let fetcher = ScriptedFetcher::new(vec![etag("a")]);
    let harness = Harness::start(config(StrategyKind::Etag), fetcher.clone());
    sleep(Duration::from_millis(10)).await;

    harness.polling.start();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(harness.events.listener_count(), 1);

    // One poller ticking, not two.
    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn hidden_page_pauses_and_visible_page_resumes() {
    let fetcher = ScriptedFetcher::new(vec![etag("a")]);
    let harness = Harness::start(config(StrategyKind::Etag), fetcher.clone());
    sleep(Duration::from_millis(10)).await;

    harness.events.set_visibility(Visibility::Hidden);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(fetcher.calls(), 1);

    harness.events.set_visibility(Visibility::Visible);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(fetcher.calls(), 2);

    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn silent_visibility_ignores_page_visibility() {
    let fetcher = ScriptedFetcher::new(vec![etag("a")]);
    let harness = Harness::start(
        WatchConfig {
            silent_page_visibility: true,
            ..config(StrategyKind::Etag)
        },
        fetcher.clone(),
    );
    assert_eq!(harness.events.listener_count(), 0);

    harness.events.set_visibility(Visibility::Hidden);
    sleep(Duration::from_millis(2_500)).await;

    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn trigger_event_forces_a_check() {
    let fetcher = ScriptedFetcher::new(vec![etag("a")]);
    let harness = Harness::start(
        WatchConfig {
            silent_polling_interval: true,
            event_trigger_list: vec!["focus".to_string(), "online".to_string()],
            ..config(StrategyKind::Etag)
        },
        fetcher.clone(),
    );
    sleep(Duration::from_millis(10)).await;
    assert_eq!(fetcher.calls(), 1);

    harness.events.dispatch("focus");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(fetcher.calls(), 2);

    harness.events.dispatch("online");
    harness.events.dispatch("resize");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn version_upgrade_passes_manifest_to_callback() {
    let fetcher = ScriptedFetcher::new(vec![
        json(json!({ "version": "1.1.0" })),
        json(json!({ "version": "1.2.0", "notes": "bug fixes" })),
    ]);
    let harness = Harness::start(config(StrategyKind::VersionJson), fetcher);

    sleep(Duration::from_secs(3)).await;

    assert_eq!(
        *harness.updates.lock().unwrap(),
        vec![Some(json!({ "version": "1.2.0", "notes": "bug fixes" }))]
    );
    assert!(!harness.polling.is_watching());
}

#[tokio::test(start_paused = true)]
async fn version_rollback_is_not_an_update() {
    let fetcher = ScriptedFetcher::new(vec![
        json(json!({ "version": "1.1.0" })),
        json(json!({ "version": "1.0.0" })),
    ]);
    let harness = Harness::start(config(StrategyKind::VersionJson), fetcher.clone());

    sleep(Duration::from_secs(5)).await;

    assert_eq!(harness.update_count(), 0);
    assert!(harness.polling.is_watching());
    assert!(fetcher.calls() >= 5);
}

#[tokio::test(start_paused = true)]
async fn cancel_rearms_against_current_deployment() {
    let fetcher = ScriptedFetcher::new(vec![etag("a"), etag("b")]);
    let harness = Harness::start(config(StrategyKind::Etag), fetcher.clone());

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(harness.update_count(), 1);
    assert!(!harness.polling.is_watching());
    let calls = fetcher.calls();

    harness.polling.on_cancel();
    assert!(!harness.polling.is_watching());
    sleep(Duration::from_millis(50)).await;
    assert!(harness.polling.is_watching());
    assert_eq!(fetcher.calls(), calls + 1);

    // New baseline is "b"; nothing further to report.
    sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.update_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_reloads_the_page() {
    let fetcher = ScriptedFetcher::new(vec![etag("a")]);
    let harness = Harness::start(config(StrategyKind::Etag), fetcher);

    harness.polling.on_refresh();

    assert_eq!(harness.page.reloads(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_url_tears_the_cycle_down() {
    let fetcher = ScriptedFetcher::new(vec![etag("a")]);
    let harness = Harness::start(
        WatchConfig {
            html_file_url: None,
            event_trigger_list: vec!["focus".to_string()],
            ..config(StrategyKind::Etag)
        },
        fetcher.clone(),
    );
    assert!(harness.polling.is_watching());

    sleep(Duration::from_millis(10)).await;

    assert!(!harness.polling.is_watching());
    assert_eq!(harness.events.listener_count(), 0);
    assert_eq!(harness.update_count(), 0);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn callback_can_cancel_from_inside() {
    let fetcher = ScriptedFetcher::new(vec![etag("a"), etag("b"), etag("c"), etag("d")]);
    let events = EventHub::new();
    let env = HostEnvironment::new(events.clone(), Arc::new(RecordingPage::default()), fetcher);
    let prompts = Arc::new(AtomicUsize::new(0));

    let seen = prompts.clone();
    let polling = create_version_polling(config(StrategyKind::Etag), env, move |polling, _| {
        seen.fetch_add(1, Ordering::SeqCst);
        polling.on_cancel();
    })
    .unwrap();

    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(prompts.load(Ordering::SeqCst), 1);

    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(prompts.load(Ordering::SeqCst), 2);
    assert!(polling.is_watching());
}

#[tokio::test(start_paused = true)]
async fn panicking_callback_leaves_controller_usable() {
    let fetcher = ScriptedFetcher::new(vec![etag("a"), etag("b")]);
    let events = EventHub::new();
    let env = HostEnvironment::new(events.clone(), Arc::new(RecordingPage::default()), fetcher);
    let polling = create_version_polling(config(StrategyKind::Etag), env, |_, _| {
        panic!("prompt failed");
    })
    .unwrap();

    sleep(Duration::from_millis(1_500)).await;
    assert!(!polling.is_watching());

    polling.start();
    assert!(polling.is_watching());
    assert_eq!(events.listener_count(), 1);

    polling.stop();
    assert!(!polling.is_watching());
    assert_eq!(events.listener_count(), 0);
}

#[test]
fn construction_needs_a_runtime() {
    let env = HostEnvironment::new(
        EventHub::new(),
        Arc::new(RecordingPage::default()),
        ScriptedFetcher::new(Vec::new()),
    );

    let result = create_version_polling(config(StrategyKind::Etag), env, |_, _| {});

    assert!(result.is_err());
}
