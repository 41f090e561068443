use std::time::Duration;

use serde_json::Value;

use crate::{CycleId, FailurePayload, PollerCommand, StartPayload};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Spawn a fresh poller and send it `start` with `payload`.
    SpawnPoller { cycle: CycleId, payload: StartPayload },
    SendToPoller { cycle: CycleId, command: PollerCommand },
    TerminatePoller { cycle: CycleId },
    AttachVisibilityListener,
    DetachVisibilityListener,
    AttachTriggerListener { event: String },
    DetachTriggerListener { event: String },
    /// Invoke the host's update callback.
    NotifyUpdate { metadata: Option<Value> },
    ReportFailure { cycle: CycleId, failure: FailurePayload },
    /// Send `StartRequested` again after `delay`.
    ScheduleRestart { delay: Duration },
    Reload,
}
