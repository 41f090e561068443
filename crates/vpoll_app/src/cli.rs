//! Command line for the `vpoll` terminal host.
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;
use url::Url;
use vpoll_core::{StrategyKind, WatchOptions};
use vpoll_logging::LogDestination;

/// Watches a deployed web application and prompts when a new build goes live.
#[derive(Debug, Parser)]
#[command(name = "vpoll", version, about = "Watch a deployed web app for new builds")]
pub struct Cli {
    /// Page URL of the deployed application
    pub url: Url,

    /// RON file with watch options; flags override it
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Fingerprint strategy: etag, chunkHash or versionJson
    #[arg(long, short = 's')]
    pub strategy: Option<StrategyKind>,

    /// Document to fingerprint (defaults to the page URL)
    #[arg(long)]
    pub html_file_url: Option<String>,

    /// Manifest for versionJson (defaults to version.json next to the page)
    #[arg(long)]
    pub version_file_url: Option<String>,

    /// Script name token for chunkHash
    #[arg(long)]
    pub chunk_name: Option<String>,

    /// Seconds between periodic checks
    #[arg(long, short = 'i')]
    pub interval_secs: Option<u64>,

    /// Input line that forces an immediate check (repeatable)
    #[arg(long = "trigger", short = 't')]
    pub triggers: Vec<String>,

    /// Do not watch at all
    #[arg(long)]
    pub silent: bool,

    /// Take a baseline but only check on triggers and visibility changes
    #[arg(long)]
    pub silent_interval: bool,

    /// Ignore hide/show input
    #[arg(long)]
    pub silent_visibility: bool,

    /// Overall request timeout in seconds (none by default)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(long, default_value = "info", value_parser = parse_level)]
    pub log_level: LevelFilter,

    /// Where logs go
    #[arg(long, value_enum, default_value = "file")]
    pub log: LogTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

fn parse_level(value: &str) -> Result<LevelFilter, String> {
    value
        .parse()
        .map_err(|_| format!("unknown log level {value:?}"))
}

impl Cli {
    /// Options set on the command line. Absent flags stay unset so a config
    /// file can supply them.
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            vc_type: self.strategy,
            html_file_url: self.html_file_url.clone(),
            chunk_name: self.chunk_name.clone(),
            version_file_url: self.version_file_url.clone(),
            event_trigger_list: (!self.triggers.is_empty()).then(|| self.triggers.clone()),
            polling_interval: self.interval_secs.map(|secs| secs.saturating_mul(1_000)),
            silent: self.silent.then_some(true),
            silent_polling_interval: self.silent_interval.then_some(true),
            silent_page_visibility: self.silent_visibility.then_some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_leave_options_empty() {
        let cli = Cli::parse_from(["vpoll", "https://example.com/"]);

        assert_eq!(cli.watch_options(), WatchOptions::default());
        assert_eq!(cli.log, LogTarget::File);
    }

    #[test]
    fn flags_map_to_options() {
        let cli = Cli::parse_from([
            "vpoll",
            "https://example.com/app/",
            "--strategy",
            "versionJson",
            "--interval-secs",
            "30",
            "-t",
            "focus",
            "-t",
            "online",
            "--silent-visibility",
        ]);

        let options = cli.watch_options();
        assert_eq!(options.vc_type, Some(StrategyKind::VersionJson));
        assert_eq!(options.polling_interval, Some(30_000));
        assert_eq!(
            options.event_trigger_list,
            Some(vec!["focus".to_string(), "online".to_string()])
        );
        assert_eq!(options.silent_page_visibility, Some(true));
        assert_eq!(options.silent, None);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let result = Cli::try_parse_from(["vpoll", "https://example.com/", "-s", "lastModified"]);
        assert!(result.is_err());
    }
}
