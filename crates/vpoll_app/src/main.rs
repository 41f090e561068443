//! `vpoll`: watches a deployed web application from the terminal.
mod cli;
mod config;
mod terminal;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use vpoll_core::{StrategyKind, WatchOptions};
use vpoll_engine::{
    create_version_polling, EventHub, FetchSettings, HostEnvironment, ReqwestFetcher,
    VersionPolling,
};
use vpoll_logging::vpoll_info;

use crate::cli::Cli;
use crate::terminal::{parse_input, Input, TerminalPage};

const LOG_FILENAME: &str = "vpoll.log";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    vpoll_logging::initialize(cli.log.into(), cli.log_level, Path::new(LOG_FILENAME));

    let file_options = match &cli.config {
        Some(path) => config::load_options(path)?,
        None => WatchOptions::default(),
    };
    let config = file_options.merge(cli.watch_options()).resolve(Some(&cli.url));
    if config.silent {
        println!("Silent mode: not watching {}", cli.url);
        return Ok(());
    }

    let fetcher = ReqwestFetcher::new(FetchSettings {
        request_timeout: cli.timeout_secs.map(Duration::from_secs),
        ..FetchSettings::default()
    })
    .context("failed to build http client")?;
    let events = EventHub::new();
    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel();
    let env = HostEnvironment::new(
        events.clone(),
        Arc::new(TerminalPage::new(reload_tx)),
        Arc::new(fetcher),
    );

    println!(
        "Watching {} with {} every {}s. Type hide, show, status, quit or an event name.",
        cli.url,
        config.vc_type,
        config.polling_interval.as_secs()
    );
    vpoll_info!("Watching {} with {:?}", cli.url, config);
    let polling = create_version_polling(config, env, prompt_update)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(()) = reload_rx.recv() => {
                println!("Reloading.");
                break;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else { break };
                match parse_input(&line) {
                    Some(Input::Visibility(visibility)) => events.set_visibility(visibility),
                    Some(Input::Reload) => polling.on_refresh(),
                    Some(Input::Dismiss) => polling.on_cancel(),
                    Some(Input::Status) => print_status(&polling),
                    Some(Input::Quit) => break,
                    Some(Input::Event(name)) => events.dispatch(&name),
                    None => {}
                }
            }
        }
    }

    polling.stop();
    vpoll_info!("Stopped watching {}", cli.url);
    Ok(())
}

fn prompt_update(_: &VersionPolling, metadata: Option<&Value>) {
    let now = Local::now().format("%H:%M:%S");
    println!("[{now}] {} Reload? (y/n)", update_prompt(metadata));
}

fn update_prompt(metadata: Option<&Value>) -> String {
    match metadata.and_then(|manifest| manifest.get("version")) {
        Some(Value::String(version)) => format!("Version {version} is available."),
        Some(version) => format!("Version {version} is available."),
        None => "A new version is available.".to_string(),
    }
}

fn print_status(polling: &VersionPolling) {
    let state = if polling.is_watching() { "watching" } else { "idle" };
    let config = polling.config();
    let target = match config.vc_type {
        StrategyKind::VersionJson => config.version_file_url.as_deref(),
        StrategyKind::Etag | StrategyKind::ChunkHash => config.html_file_url.as_deref(),
    };
    println!("{state}: {} via {}", target.unwrap_or("-"), config.vc_type);
}
