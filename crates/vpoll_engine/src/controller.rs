//! `VersionPolling`: the host-facing controller. It feeds host events into the
//! core `update` function and executes the effects it returns.
use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use vpoll_core::{
    update, ControllerState, CycleId, Effect, Envelope, Msg, PollerCommand, PollerReport,
    WatchConfig,
};
use vpoll_logging::{vpoll_debug, vpoll_error, vpoll_info, vpoll_warn};

use crate::host::{EventHub, EventKey, HostEvent, ListenerId, PageHost};
use crate::poller::PollerHandle;
use crate::Fetcher;

/// Invoked once per accepted update with the controller and the manifest
/// metadata (`versionJson` only).
pub type UpdateCallback = Arc<dyn Fn(&VersionPolling, Option<&Value>) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("version polling needs a running tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// What the controller needs from the page it runs in.
#[derive(Clone)]
pub struct HostEnvironment {
    pub events: EventHub,
    pub page: Arc<dyn PageHost>,
    pub fetcher: Arc<dyn Fetcher>,
}

impl HostEnvironment {
    pub fn new(events: EventHub, page: Arc<dyn PageHost>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            events,
            page,
            fetcher,
        }
    }
}

/// Shortcut for [`VersionPolling::new`].
pub fn create_version_polling<F>(
    config: WatchConfig,
    env: HostEnvironment,
    on_update: F,
) -> Result<VersionPolling, ControllerError>
where
    F: Fn(&VersionPolling, Option<&Value>) + Send + Sync + 'static,
{
    VersionPolling::new(config, env, Arc::new(on_update))
}

/// Watches a deployment for a new build. Clones share the same controller.
#[derive(Clone)]
pub struct VersionPolling {
    inner: Arc<Inner>,
}

impl VersionPolling {
    /// Builds the controller and starts the first detection cycle.
    ///
    /// Must be called from within a tokio runtime; the poller and its timers
    /// run there.
    pub fn new(
        config: WatchConfig,
        env: HostEnvironment,
        on_update: UpdateCallback,
    ) -> Result<Self, ControllerError> {
        let runtime = Handle::try_current()?;
        let inner = Arc::new(Inner {
            runtime,
            env,
            on_update,
            dispatch: Mutex::new(DispatchState {
                model: ControllerState::new(config),
                inbox: VecDeque::new(),
                draining: false,
            }),
            session: Mutex::new(Session::default()),
        });
        let polling = Self { inner };
        polling.start();
        Ok(polling)
    }

    pub fn start(&self) {
        self.inner.dispatch(Msg::StartRequested);
    }

    /// Safe to call when nothing is running.
    pub fn stop(&self) {
        self.inner.dispatch(Msg::StopRequested);
    }

    /// Reloads the page.
    pub fn on_refresh(&self) {
        self.inner.dispatch(Msg::RefreshRequested);
    }

    /// Dismisses the update prompt and resumes watching shortly after.
    pub fn on_cancel(&self) {
        self.inner.dispatch(Msg::CancelRequested);
    }

    pub fn is_watching(&self) -> bool {
        self.inner.dispatch_state().model.is_watching()
    }

    pub fn config(&self) -> WatchConfig {
        self.inner.dispatch_state().model.config().clone()
    }
}

struct DispatchState {
    model: ControllerState,
    inbox: VecDeque<Msg>,
    draining: bool,
}

#[derive(Default)]
struct Session {
    poller: Option<(CycleId, PollerHandle)>,
    visibility_listener: Option<ListenerId>,
    trigger_listeners: Vec<(String, ListenerId)>,
}

struct Inner {
    runtime: Handle,
    env: HostEnvironment,
    on_update: UpdateCallback,
    dispatch: Mutex<DispatchState>,
    session: Mutex<Session>,
}

impl Inner {
    /// Queues `msg` and drains the inbox unless another call already is.
    /// Effects run unlocked, so callbacks and listeners may re-enter.
    fn dispatch(self: &Arc<Self>, msg: Msg) {
        {
            let mut state = self.dispatch_state();
            state.inbox.push_back(msg);
            if state.draining {
                return;
            }
            state.draining = true;
        }

        let _guard = DrainGuard(self);
        loop {
            let effects = {
                let mut state = self.dispatch_state();
                let Some(msg) = state.inbox.pop_front() else {
                    state.draining = false;
                    return;
                };
                let is_update = matches!(
                    msg,
                    Msg::PollerReported {
                        report: PollerReport::Update(_),
                        ..
                    }
                );
                let (model, effects) = update(mem::take(&mut state.model), msg);
                state.model = model;
                if is_update && effects.is_empty() {
                    vpoll_debug!("Update rejected");
                }
                effects
            };
            for effect in effects {
                self.run_effect(effect);
            }
        }
    }

    fn run_effect(self: &Arc<Self>, effect: Effect) {
        match effect {
            Effect::SpawnPoller { cycle, payload } => {
                let (handle, reports) =
                    PollerHandle::spawn(Arc::clone(&self.env.fetcher), &self.runtime);
                if !handle.post(PollerCommand::Start(payload)) {
                    vpoll_error!("Poller for cycle {} refused start", cycle);
                }
                self.spawn_forwarder(cycle, reports);
                vpoll_info!("Started detection cycle {}", cycle);
                let previous = self.session().poller.replace((cycle, handle));
                if let Some((old_cycle, _)) = previous {
                    vpoll_warn!("Replaced poller of cycle {} without teardown", old_cycle);
                }
            }
            Effect::SendToPoller { cycle, command } => {
                let session = self.session();
                match &session.poller {
                    Some((active, handle)) if *active == cycle => {
                        vpoll_debug!("Sending {:?} to cycle {}", command, cycle);
                        if !handle.post(command) {
                            vpoll_warn!("Poller of cycle {} is gone", cycle);
                        }
                    }
                    _ => vpoll_debug!("No poller for cycle {}", cycle),
                }
            }
            Effect::TerminatePoller { cycle } => {
                let handle = {
                    let mut session = self.session();
                    match session.poller.take() {
                        Some((active, handle)) if active == cycle => Some(handle),
                        other => {
                            session.poller = other;
                            None
                        }
                    }
                };
                if let Some(handle) = handle {
                    handle.terminate();
                    vpoll_info!("Stopped detection cycle {}", cycle);
                }
            }
            Effect::AttachVisibilityListener => {
                let weak = Arc::downgrade(self);
                let id = self
                    .env
                    .events
                    .add_listener(EventKey::VisibilityChange, move |event| {
                        if let HostEvent::VisibilityChange(visibility) = event {
                            with_inner(&weak, |inner| {
                                inner.dispatch(Msg::VisibilityChanged(*visibility))
                            });
                        }
                    });
                self.session().visibility_listener = Some(id);
            }
            Effect::DetachVisibilityListener => {
                let id = self.session().visibility_listener.take();
                if let Some(id) = id {
                    self.env.events.remove_listener(id);
                }
            }
            Effect::AttachTriggerListener { event } => {
                let weak = Arc::downgrade(self);
                let name = event.clone();
                let id = self
                    .env
                    .events
                    .add_listener(EventKey::Named(event.clone()), move |_| {
                        with_inner(&weak, |inner| {
                            inner.dispatch(Msg::TriggerFired(name.clone()))
                        });
                    });
                self.session().trigger_listeners.push((event, id));
            }
            Effect::DetachTriggerListener { event } => {
                let ids: Vec<ListenerId> = {
                    let mut session = self.session();
                    let (matching, rest) = mem::take(&mut session.trigger_listeners)
                        .into_iter()
                        .partition(|(name, _)| *name == event);
                    session.trigger_listeners = rest;
                    matching.into_iter().map(|(_, id)| id).collect()
                };
                for id in ids {
                    self.env.events.remove_listener(id);
                }
            }
            Effect::NotifyUpdate { metadata } => {
                vpoll_info!("New version available");
                let polling = VersionPolling {
                    inner: Arc::clone(self),
                };
                (self.on_update)(&polling, metadata.as_ref());
            }
            Effect::ReportFailure { cycle, failure } => {
                if failure.fatal {
                    vpoll_error!(
                        "Cycle {} failed ({:?}): {}",
                        cycle,
                        failure.kind,
                        failure.message
                    );
                } else {
                    vpoll_warn!(
                        "Check in cycle {} failed ({:?}): {}",
                        cycle,
                        failure.kind,
                        failure.message
                    );
                }
            }
            Effect::ScheduleRestart { delay } => {
                let weak = Arc::downgrade(self);
                self.runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    with_inner(&weak, |inner| inner.dispatch(Msg::StartRequested));
                });
            }
            Effect::Reload => {
                vpoll_info!("Reloading page");
                self.env.page.reload();
            }
        }
    }

    fn spawn_forwarder(self: &Arc<Self>, cycle: CycleId, mut reports: mpsc::UnboundedReceiver<Envelope>) {
        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            while let Some(envelope) = reports.recv().await {
                let report = match PollerReport::from_envelope(envelope) {
                    Ok(report) => report,
                    Err(err) => {
                        vpoll_warn!("Ignoring message from cycle {}: {}", cycle, err);
                        continue;
                    }
                };
                let Some(inner) = weak.upgrade() else { break };
                inner.dispatch(Msg::PollerReported { cycle, report });
            }
        });
    }

    fn dispatch_state(&self) -> MutexGuard<'_, DispatchState> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let listeners = session
            .visibility_listener
            .take()
            .into_iter()
            .chain(session.trigger_listeners.drain(..).map(|(_, id)| id));
        for id in listeners {
            self.env.events.remove_listener(id);
        }
    }
}

/// Clears the drain flag when an effect (usually the host callback) panics,
/// so later calls are not left queued behind a dead drain loop.
struct DrainGuard<'a>(&'a Inner);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.dispatch_state().draining = false;
        }
    }
}

fn with_inner(weak: &Weak<Inner>, f: impl FnOnce(&Arc<Inner>)) {
    if let Some(inner) = weak.upgrade() {
        f(&inner);
    }
}
