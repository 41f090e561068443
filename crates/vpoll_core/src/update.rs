use std::time::Duration;

use crate::{
    is_upgrade, ControllerState, Effect, Msg, PollerCommand, PollerReport, StrategyKind,
    UpdatePayload, Visibility,
};

/// Delay between dismissing an update prompt and the next `start()`.
pub const RESTART_DELAY: Duration = Duration::from_millis(30);

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: ControllerState, msg: Msg) -> (ControllerState, Vec<Effect>) {
    let effects = match msg {
        Msg::StartRequested => start_cycle(&mut state),
        Msg::StopRequested => state.teardown(),
        Msg::PollerReported { cycle, report } => {
            // Reports from a poller that has since been torn down are stale.
            if state.active_cycle() != Some(cycle) {
                return (state, Vec::new());
            }
            match report {
                PollerReport::Update(payload) => {
                    if accepts_update(state.config().vc_type, &payload) {
                        let mut effects = state.teardown();
                        effects.push(Effect::NotifyUpdate {
                            metadata: payload.metadata,
                        });
                        effects
                    } else {
                        Vec::new()
                    }
                }
                PollerReport::Failure(failure) => {
                    let fatal = failure.fatal;
                    let mut effects = vec![Effect::ReportFailure { cycle, failure }];
                    if fatal {
                        effects.extend(state.teardown());
                    }
                    effects
                }
            }
        }
        Msg::VisibilityChanged(visibility) => match state.active_cycle() {
            Some(cycle) if state.visibility_attached() => {
                let command = match visibility {
                    Visibility::Visible => PollerCommand::Resume,
                    Visibility::Hidden => PollerCommand::Pause,
                };
                vec![Effect::SendToPoller { cycle, command }]
            }
            _ => Vec::new(),
        },
        Msg::TriggerFired(event) => match state.active_cycle() {
            Some(cycle) if state.attached_triggers().contains(&event) => {
                vec![Effect::SendToPoller {
                    cycle,
                    command: PollerCommand::Check,
                }]
            }
            _ => Vec::new(),
        },
        Msg::RefreshRequested => vec![Effect::Reload],
        Msg::CancelRequested => vec![Effect::ScheduleRestart {
            delay: RESTART_DELAY,
        }],
    };

    (state, effects)
}

fn start_cycle(state: &mut ControllerState) -> Vec<Effect> {
    if state.config().silent {
        return Vec::new();
    }

    // At most one poller per controller: the previous one goes first.
    let mut effects = state.teardown();
    let cycle = state.begin_cycle();
    effects.push(Effect::SpawnPoller {
        cycle,
        payload: state.config().start_payload(),
    });

    if !state.config().silent_page_visibility {
        effects.extend(state.attach_visibility());
    }
    let triggers = state.config().event_trigger_list.clone();
    for event in &triggers {
        effects.extend(state.attach_trigger(event));
    }
    effects
}

/// `versionJson` only surfaces upgrades; the other strategies surface any
/// mismatch the poller reports.
fn accepts_update(kind: StrategyKind, payload: &UpdatePayload) -> bool {
    match kind {
        StrategyKind::VersionJson => is_upgrade(&payload.fresh, &payload.baseline),
        StrategyKind::Etag | StrategyKind::ChunkHash => true,
    }
}
