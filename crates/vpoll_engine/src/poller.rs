//! The background poller: a task that owns the active strategy, its baseline
//! and the repeat timer, and talks to the controller only through envelopes.
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use vpoll_core::{
    Envelope, FailureKind, FailurePayload, PollerCommand, PollerReport, StartPayload,
};
use vpoll_logging::{vpoll_debug, vpoll_info, vpoll_trace, vpoll_warn};

use crate::strategy::{build_strategy, CheckOutcome, Detector, Fingerprint, StrategyError};
use crate::Fetcher;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollerState {
    Idle,
    Running,
    Paused,
}

/// Controller-side handle of a spawned poller.
///
/// Dropping the handle terminates the poller.
pub struct PollerHandle {
    commands: mpsc::UnboundedSender<Envelope>,
    shutdown: CancellationToken,
}

impl PollerHandle {
    /// Spawns an idle poller on `runtime`. The receiver yields its reports.
    pub fn spawn(
        fetcher: Arc<dyn Fetcher>,
        runtime: &Handle,
    ) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let poller = Poller::new(fetcher, report_tx);
        runtime.spawn(poller.run(command_rx, shutdown.clone()));

        (
            Self {
                commands: command_tx,
                shutdown,
            },
            report_rx,
        )
    }

    /// Returns `false` once the poller has gone away.
    pub fn post(&self, command: PollerCommand) -> bool {
        match command.into_envelope() {
            Ok(envelope) => self.post_envelope(envelope),
            Err(err) => {
                vpoll_warn!("Dropping poller command: {}", err);
                false
            }
        }
    }

    pub fn post_envelope(&self, envelope: Envelope) -> bool {
        self.commands.send(envelope).is_ok()
    }

    /// Abandons all in-progress work, including in-flight checks.
    pub fn terminate(&self) {
        self.shutdown.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled() || self.commands.is_closed()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Work running beside the command loop.
enum Job {
    /// The first fetch of a cycle. Kept whatever the generation.
    Baseline(Result<Option<Fingerprint>, StrategyError>),
    Check {
        generation: u64,
        outcome: Result<CheckOutcome, StrategyError>,
    },
}

struct Poller {
    fetcher: Arc<dyn Fetcher>,
    reports: mpsc::UnboundedSender<Envelope>,
    state: PollerState,
    detector: Option<Detector>,
    period: Duration,
    periodic: bool,
    timer: Option<Interval>,
    // Bumped on pause; results of checks from older generations are dropped.
    generation: u64,
    jobs: JoinSet<Job>,
}

impl Poller {
    fn new(fetcher: Arc<dyn Fetcher>, reports: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            fetcher,
            reports,
            state: PollerState::Idle,
            detector: None,
            period: MIN_INTERVAL,
            periodic: false,
            timer: None,
            generation: 0,
            jobs: JoinSet::new(),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Envelope>,
        shutdown: CancellationToken,
    ) {
        vpoll_debug!("Poller spawned");
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                envelope = commands.recv() => {
                    let Some(envelope) = envelope else { break };
                    if self.handle(envelope).is_break() {
                        break;
                    }
                }
                Some(joined) = self.jobs.join_next() => self.finish_job(joined),
                () = next_tick(self.timer.as_mut()) => self.spawn_check(),
            }
        }
        vpoll_debug!("Poller stopped in state {:?}", self.state);
    }

    fn handle(&mut self, envelope: Envelope) -> ControlFlow<()> {
        let command = match PollerCommand::from_envelope(envelope) {
            Ok(command) => command,
            Err(err) => {
                self.report(PollerReport::Failure(FailurePayload {
                    kind: FailureKind::Protocol,
                    message: err.to_string(),
                    fatal: true,
                }));
                return ControlFlow::Break(());
            }
        };
        vpoll_trace!("Poller received {:?} while {:?}", command, self.state);

        match (self.state, command) {
            (PollerState::Idle, PollerCommand::Start(payload)) => self.start(payload),
            (PollerState::Idle, command) => {
                vpoll_debug!("Ignoring {:?} before start", command);
                ControlFlow::Continue(())
            }
            (_, PollerCommand::Start(_)) => {
                vpoll_warn!("Poller already started; ignoring start");
                ControlFlow::Continue(())
            }
            (PollerState::Running, PollerCommand::Pause) => {
                self.pause();
                ControlFlow::Continue(())
            }
            (PollerState::Paused, PollerCommand::Pause) => ControlFlow::Continue(()),
            (_, PollerCommand::Resume) => {
                self.resume();
                ControlFlow::Continue(())
            }
            (_, PollerCommand::Check) => {
                self.spawn_check();
                ControlFlow::Continue(())
            }
        }
    }

    /// Never waits on the network: the baseline fetch runs as a job and the
    /// timer is anchored at start.
    fn start(&mut self, payload: StartPayload) -> ControlFlow<()> {
        let strategy = match build_strategy(&payload, Arc::clone(&self.fetcher)) {
            Ok(strategy) => strategy,
            Err(err) => {
                self.report_error(&err);
                return ControlFlow::Break(());
            }
        };

        let detector = Detector::new(strategy);
        let mut baseline = detector.clone();
        self.jobs.spawn(async move {
            Job::Baseline(baseline.establish_baseline().await.map(|found| found.cloned()))
        });

        self.detector = Some(detector);
        self.period = payload.interval().max(MIN_INTERVAL);
        self.periodic = !payload.silent_polling_interval;
        self.state = PollerState::Running;
        if self.periodic {
            self.schedule();
        }
        ControlFlow::Continue(())
    }

    fn pause(&mut self) {
        self.timer = None;
        self.generation += 1;
        self.state = PollerState::Paused;
        vpoll_debug!("Poller paused");
    }

    fn resume(&mut self) {
        self.state = PollerState::Running;
        self.spawn_check();
        if self.periodic {
            self.schedule();
        }
        vpoll_debug!("Poller resumed");
    }

    fn schedule(&mut self) {
        let mut timer = time::interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
    }

    fn spawn_check(&mut self) {
        let Some(detector) = self.detector.clone() else {
            return;
        };
        let generation = self.generation;
        self.jobs.spawn(async move {
            Job::Check {
                generation,
                outcome: detector.check_for_change().await,
            }
        });
    }

    fn finish_job(&mut self, joined: Result<Job, JoinError>) {
        match joined {
            Ok(Job::Baseline(outcome)) => self.finish_baseline(outcome),
            Ok(Job::Check {
                generation,
                outcome,
            }) => self.finish_check(generation, outcome),
            Err(err) => vpoll_warn!("Poller job failed: {}", err),
        }
    }

    fn finish_baseline(&mut self, outcome: Result<Option<Fingerprint>, StrategyError>) {
        match outcome {
            Ok(Some(fingerprint)) => self.adopt(fingerprint),
            Ok(None) => vpoll_debug!("Baseline fetch skipped; adopting the next fingerprint"),
            Err(err) => self.report_error(&err),
        }
    }

    fn finish_check(&mut self, generation: u64, outcome: Result<CheckOutcome, StrategyError>) {
        if generation != self.generation {
            vpoll_debug!("Discarding check result that arrived after pause");
            return;
        }

        match outcome {
            Ok(CheckOutcome::Changed(change)) => {
                vpoll_info!(
                    "Fingerprint changed: {} -> {}",
                    change.baseline.flag,
                    change.fresh.flag
                );
                self.report(PollerReport::Update(change.into()));
            }
            Ok(CheckOutcome::Unchanged) => vpoll_debug!("Fingerprint unchanged"),
            Ok(CheckOutcome::Skipped) => vpoll_debug!("Check skipped on non-success status"),
            Ok(CheckOutcome::Baseline(fingerprint)) => self.adopt(fingerprint),
            Err(err) => self.report_error(&err),
        }
    }

    /// A check may beat a slow baseline fetch; the first fingerprint wins.
    fn adopt(&mut self, fingerprint: Fingerprint) {
        let Some(detector) = self.detector.as_mut() else {
            return;
        };
        let flag = fingerprint.flag.clone();
        if detector.adopt_baseline(fingerprint) {
            vpoll_info!("Baseline {} fingerprint: {}", detector.kind(), flag);
        } else {
            vpoll_debug!("Baseline already set; ignoring {}", flag);
        }
    }

    fn report_error(&self, err: &StrategyError) {
        vpoll_debug!("Strategy error: {}", err);
        self.report(PollerReport::Failure(err.to_failure()));
    }

    fn report(&self, report: PollerReport) {
        match report.into_envelope() {
            Ok(envelope) => {
                // The controller may already be gone; nothing to do then.
                let _ = self.reports.send(envelope);
            }
            Err(err) => vpoll_warn!("Failed to encode poller report: {}", err),
        }
    }
}

async fn next_tick(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
