use crate::{Effect, WatchConfig};

/// Identifies one spawned poller. A new cycle starts on every `start()`.
pub type CycleId = u64;

/// Controller bookkeeping. All listener flags are owned by the instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControllerState {
    config: WatchConfig,
    active_cycle: Option<CycleId>,
    last_cycle: CycleId,
    visibility_attached: bool,
    attached_triggers: Vec<String>,
}

impl ControllerState {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn active_cycle(&self) -> Option<CycleId> {
        self.active_cycle
    }

    pub fn is_watching(&self) -> bool {
        self.active_cycle.is_some()
    }

    pub fn visibility_attached(&self) -> bool {
        self.visibility_attached
    }

    pub fn attached_triggers(&self) -> &[String] {
        &self.attached_triggers
    }

    pub(crate) fn begin_cycle(&mut self) -> CycleId {
        self.last_cycle += 1;
        self.active_cycle = Some(self.last_cycle);
        self.last_cycle
    }

    pub(crate) fn attach_visibility(&mut self) -> Option<Effect> {
        if self.visibility_attached {
            return None;
        }
        self.visibility_attached = true;
        Some(Effect::AttachVisibilityListener)
    }

    pub(crate) fn attach_trigger(&mut self, event: &str) -> Option<Effect> {
        if self.attached_triggers.iter().any(|name| name == event) {
            return None;
        }
        self.attached_triggers.push(event.to_string());
        Some(Effect::AttachTriggerListener {
            event: event.to_string(),
        })
    }

    /// Ends the active cycle. Empty when nothing is running.
    pub(crate) fn teardown(&mut self) -> Vec<Effect> {
        let Some(cycle) = self.active_cycle.take() else {
            return Vec::new();
        };
        let mut effects = Vec::with_capacity(2 + self.attached_triggers.len());
        effects.push(Effect::TerminatePoller { cycle });
        if std::mem::take(&mut self.visibility_attached) {
            effects.push(Effect::DetachVisibilityListener);
        }
        effects.extend(
            self.attached_triggers
                .drain(..)
                .map(|event| Effect::DetachTriggerListener { event }),
        );
        effects
    }
}
