use crate::{CycleId, PollerReport};

/// Page visibility as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Host asked to start (or restart) a detection cycle.
    StartRequested,
    /// Host asked to tear the current cycle down.
    StopRequested,
    /// A message arrived from the poller of `cycle`.
    PollerReported { cycle: CycleId, report: PollerReport },
    /// The page became visible or hidden.
    VisibilityChanged(Visibility),
    /// A configured trigger event fired.
    TriggerFired(String),
    /// Host accepted the update prompt.
    RefreshRequested,
    /// Host dismissed the update prompt.
    CancelRequested,
}
