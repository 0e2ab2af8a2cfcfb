// timespeed_core: time-control authority and its multiplayer replication.
//
// This crate holds the whole time-speed subsystem except the transport: the
// freeze/tick-interval state machine, the tick-progress rescaling, the
// config-driven auto-freeze rules, host-authoritative replication over an
// abstract message channel, and the session controller that dispatches game
// callbacks into all of the above. It performs no I/O apart from reading the
// config file; messages go out through an outbox and come in as
// `SessionEvent::MessageReceived`.
//
// Module overview:
// - `types.rs`:         Season, Location, GameContext, AutoFreezeReason, HHMM time helpers.
// - `config.rs`:        TimeSpeedConfig: speeds, freeze rules, peer-control policy (JSON).
// - `freeze_policy.rs`: AutoFreezePolicy trait and the config-backed implementation.
// - `authority.rs`:     TimeAuthorityState: manual/auto freeze, suspensions, tick interval.
// - `scaler.rs`:        scale(), GameClock, ProgressTracker: per-update progress rescaling.
// - `notifier.rs`:      Notifier trait, Notification, HudNotifier.
// - `replication.rs`:   ReplicationProtocol, MirrorState, PeerDirectory: host/peer messaging.
// - `action.rs`:        PlayerAction: local input turned into state changes or requests.
// - `session.rs`:       TimeSpeedSession: per-update controller and event dispatch.
//
// The canonical state lives only on the host and is mutated only from its
// single update pass, so nothing here is `Sync` or locked.

pub mod action;
pub mod authority;
pub mod config;
pub mod freeze_policy;
pub mod notifier;
pub mod replication;
pub mod scaler;
pub mod session;
pub mod types;

pub use action::PlayerAction;
pub use authority::{FreezeStatus, FreezeTransition, TimeAuthorityState};
pub use config::{ConfigError, StepModifier, TimeSpeedConfig};
pub use freeze_policy::AutoFreezePolicy;
pub use notifier::{HudNotifier, Notification, Notifier, Requester};
pub use replication::{
    Envelope, MessageOutcome, MirrorState, Outgoing, PeerDirectory, ReplicationProtocol,
    RequestError,
};
pub use scaler::{GameClock, ProgressTracker, scale};
pub use session::{Role, SessionEvent, TimeSpeedSession};
pub use types::{AutoFreezeReason, GameContext, Location, LocationKind, Season};
