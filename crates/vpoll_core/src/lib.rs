//! Version polling core: configuration, version comparison, the poller wire
//! protocol and the controller's pure state machine.
mod compare;
mod config;
mod effect;
mod msg;
mod protocol;
mod state;
mod update;

pub use compare::{compare_versions, is_upgrade};
pub use config::{
    StrategyKind, UnknownStrategy, WatchConfig, WatchOptions, DEFAULT_CHUNK_NAME,
    DEFAULT_POLLING_INTERVAL, VERSION_FILE_NAME,
};
pub use effect::Effect;
pub use msg::{Msg, Visibility};
pub use protocol::{
    Envelope, FailureKind, FailurePayload, PollerCommand, PollerReport, ProtocolError,
    StartPayload, UpdatePayload,
};
pub use state::{ControllerState, CycleId};
pub use update::{update, RESTART_DELAY};
