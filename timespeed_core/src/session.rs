// Per-update session controller.
//
// `TimeSpeedSession` is the one object the embedding layer talks to. It owns
// everything session-scoped: the config, the role-specific replica (the
// canonical `TimeAuthorityState` on the host, a `MirrorState` on a peer), the
// replication protocol and its outbox, the tick-progress tracker, and the
// notifier. A session is created when a multiplayer (or single-player)
// session starts and dropped when it ends; nothing is persisted.
//
// Every game callback is turned into a `SessionEvent` and passed to
// `handle()`, which dispatches with an exhaustive match:
//
//   DayStarted        host: should_scale, evaluate(clear), location update
//   LocationChanged   host: lift location suspension, evaluate, location update
//   TimeChanged       host: evaluate; newly frozen → notify + broadcast
//   UpdateTicked      host: rescale tick progress; status line once a second
//   Action            host: apply + notify + broadcast; peer: request
//   MessageReceived   host or peer message handling (see `replication.rs`)
//   ConfigReloaded    swap config, recompute, notify
//
// Host-only events are ignored on a peer: the host's clock is the one that
// counts, and a peer only ever writes its own mirror.
//
// After each update pass the embedding loop drains `drain_outbox()` and
// sends the messages; `handle()` itself never blocks.

use std::path::PathBuf;

use timespeed_protocol::PlayerId;
use tracing::{debug, info, warn};

use crate::action::PlayerAction;
use crate::authority::TimeAuthorityState;
use crate::config::TimeSpeedConfig;
use crate::notifier::Notifier;
use crate::replication::{Envelope, MirrorState, Outgoing, PeerDirectory, ReplicationProtocol};
use crate::scaler::{FALLBACK_TICK_INTERVAL_MS, GameClock, ProgressTracker};
use crate::types::{AutoFreezeReason, GameContext, MINUTES_PER_TICK, add_minutes, format_time_of_day};

/// Minimum real time between two status log lines.
const STATUS_INTERVAL_MS: u64 = 1000;

/// One game callback, as seen by the session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    DayStarted(GameContext),
    LocationChanged(GameContext),
    TimeChanged(GameContext),
    /// One game update. `now_ms` is a monotonic real-time clock reading.
    UpdateTicked { now_ms: u64 },
    Action(PlayerAction),
    MessageReceived(Envelope),
    ConfigReloaded(TimeSpeedConfig),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Host,
    Peer,
}

/// The role-specific state. A peer has no authority state at all.
#[derive(Clone, Debug)]
enum Replica {
    Host(TimeAuthorityState),
    Peer(MirrorState),
}

pub struct TimeSpeedSession<N: Notifier> {
    config: TimeSpeedConfig,
    config_path: Option<PathBuf>,
    replica: Replica,
    protocol: ReplicationProtocol,
    progress: ProgressTracker,
    notifier: N,
    /// Most recent game context, for recomputation on config reload.
    context: Option<GameContext>,
    last_status_ms: Option<u64>,
}

impl<N: Notifier> TimeSpeedSession<N> {
    /// Session for the process that owns the canonical state.
    pub fn host(local_id: PlayerId, config: TimeSpeedConfig, notifier: N) -> Self {
        let mut authority = TimeAuthorityState::new();
        authority.set_tick_interval(config.default_tick_interval());
        Self::with_replica(local_id, config, notifier, Replica::Host(authority))
    }

    /// Session for a non-authoritative process.
    pub fn peer(local_id: PlayerId, config: TimeSpeedConfig, notifier: N) -> Self {
        Self::with_replica(
            local_id,
            config,
            notifier,
            Replica::Peer(MirrorState::default()),
        )
    }

    fn with_replica(
        local_id: PlayerId,
        config: TimeSpeedConfig,
        notifier: N,
        replica: Replica,
    ) -> Self {
        Self {
            config,
            config_path: None,
            replica,
            protocol: ReplicationProtocol::new(local_id),
            progress: ProgressTracker::new(),
            notifier,
            context: None,
            last_status_ms: None,
        }
    }

    /// File that `PlayerAction::ReloadConfig` re-reads.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn role(&self) -> Role {
        match self.replica {
            Replica::Host(_) => Role::Host,
            Replica::Peer(_) => Role::Peer,
        }
    }

    pub fn local_id(&self) -> PlayerId {
        self.protocol.local_id()
    }

    pub fn config(&self) -> &TimeSpeedConfig {
        &self.config
    }

    /// The canonical state, on the host.
    pub fn authority(&self) -> Option<&TimeAuthorityState> {
        match &self.replica {
            Replica::Host(authority) => Some(authority),
            Replica::Peer(_) => None,
        }
    }

    /// The display mirror, on a peer.
    pub fn mirror(&self) -> Option<&MirrorState> {
        match &self.replica {
            Replica::Host(_) => None,
            Replica::Peer(mirror) => Some(mirror),
        }
    }

    /// Whether time is frozen, as far as this process knows. `None` on a
    /// peer that hasn't heard from the host yet.
    pub fn is_frozen(&self) -> Option<bool> {
        match &self.replica {
            Replica::Host(authority) => Some(authority.is_effectively_frozen()),
            Replica::Peer(mirror) => mirror.is_frozen,
        }
    }

    pub fn tick_interval_ms(&self) -> Option<u32> {
        match &self.replica {
            Replica::Host(authority) => Some(authority.tick_interval_ms()),
            Replica::Peer(mirror) => mirror.tick_interval_ms,
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    /// Take the messages queued during the last update pass.
    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        self.protocol.drain_outbox()
    }

    /// Dispatch one event.
    pub fn handle<C, D>(&mut self, event: SessionEvent, clock: &mut C, directory: &D)
    where
        C: GameClock + ?Sized,
        D: PeerDirectory + ?Sized,
    {
        match event {
            SessionEvent::DayStarted(ctx) => self.on_day_started(ctx),
            SessionEvent::LocationChanged(ctx) => self.on_location_changed(ctx),
            SessionEvent::TimeChanged(ctx) => self.on_time_changed(ctx),
            SessionEvent::UpdateTicked { now_ms } => self.on_update_ticked(now_ms, clock),
            SessionEvent::Action(action) => self.on_action(action, directory),
            SessionEvent::MessageReceived(envelope) => self.on_message(&envelope, directory),
            SessionEvent::ConfigReloaded(config) => self.apply_config(config),
        }
    }

    fn on_day_started(&mut self, ctx: GameContext) {
        let Replica::Host(authority) = &mut self.replica else {
            return;
        };
        authority.set_adjust_time_enabled(self.config.should_scale(ctx.season, ctx.day_of_month));
        authority.evaluate(&self.config, &ctx, true);
        self.update_for_location(&ctx);
        self.context = Some(ctx);
    }

    fn on_location_changed(&mut self, ctx: GameContext) {
        let Replica::Host(authority) = &mut self.replica else {
            return;
        };
        if ctx.location.is_none() {
            debug!("location change without a location, ignored");
            return;
        }
        authority.lift_suspension(AutoFreezeReason::FrozenForLocation);
        authority.evaluate(&self.config, &ctx, false);
        self.update_for_location(&ctx);
        self.context = Some(ctx);
    }

    /// Apply the location's tick interval and show it.
    fn update_for_location(&mut self, ctx: &GameContext) {
        let Replica::Host(authority) = &mut self.replica else {
            return;
        };
        let Some(location) = &ctx.location else {
            return;
        };
        authority.set_tick_interval(self.config.tick_interval_for(location));
        debug!(
            location = %location.name,
            interval_ms = authority.tick_interval_ms(),
            "applied location tick interval"
        );
        if self.config.notify_on_location_change {
            self.notifier.on_location_changed(
                authority.is_effectively_frozen(),
                authority.tick_interval_ms(),
                authority.auto_freeze_reason(),
            );
        }
    }

    fn on_time_changed(&mut self, ctx: GameContext) {
        let Replica::Host(authority) = &mut self.replica else {
            return;
        };
        let transition = authority.evaluate(&self.config, &ctx, false);
        if transition.newly_frozen() {
            let local_id = self.protocol.local_id();
            self.notifier
                .on_freeze_toggled(true, Some(transition.reason), None);
            self.protocol.broadcast_freeze(true, local_id);
        }
        self.context = Some(ctx);
    }

    fn on_update_ticked<C: GameClock + ?Sized>(&mut self, now_ms: u64, clock: &mut C) {
        let Replica::Host(authority) = &mut self.replica else {
            return;
        };
        if authority.tick_interval_ms() == 0
            && authority.adjust_time_enabled()
            && !authority.is_effectively_frozen()
        {
            warn!(
                fallback_ms = FALLBACK_TICK_INTERVAL_MS,
                "tick interval was zero, reset to fallback"
            );
            authority.set_tick_interval(FALLBACK_TICK_INTERVAL_MS);
        }
        self.progress.update(
            clock,
            authority.is_effectively_frozen(),
            authority.adjust_time_enabled(),
            authority.tick_interval_ms(),
        );
        if status_due(self.last_status_ms, now_ms) {
            self.last_status_ms = Some(now_ms);
            let time = clock.time_of_day();
            let interval_ms = authority.tick_interval_ms();
            debug!(
                time = %format_time_of_day(time),
                progress_pct = (self.progress.progress() * 100.0).round(),
                next_tick = %format_time_of_day(add_minutes(time, MINUTES_PER_TICK)),
                interval_ms,
                seconds_per_minute = f64::from(interval_ms) / 10_000.0,
                status = ?authority.status(),
                "time status"
            );
        }
    }

    fn on_action<D: PeerDirectory + ?Sized>(&mut self, action: PlayerAction, directory: &D) {
        let local_id = self.protocol.local_id();
        match &mut self.replica {
            Replica::Peer(mirror) => match action.to_request(&self.config) {
                Some(request) => match self.protocol.request(request.clone(), directory) {
                    Ok(()) => {
                        self.protocol
                            .apply_expected(&request, mirror, &mut self.notifier);
                    }
                    Err(e) => {
                        info!(error = %e, "request not sent");
                        self.notifier.on_access_denied(&e.to_string());
                    }
                },
                None => self.reload_from_disk(),
            },
            Replica::Host(authority) => match action {
                PlayerAction::ToggleFreeze => {
                    self.protocol
                        .apply_toggle_freeze(authority, &mut self.notifier, local_id, None);
                }
                PlayerAction::IncreaseTickInterval(modifier)
                | PlayerAction::DecreaseTickInterval(modifier) => {
                    let increase = matches!(action, PlayerAction::IncreaseTickInterval(_));
                    let change = self.config.interval_change(modifier);
                    self.protocol.apply_change_interval(
                        authority,
                        &mut self.notifier,
                        increase,
                        change,
                        local_id,
                        None,
                    );
                }
                PlayerAction::ReloadConfig => self.reload_from_disk(),
            },
        }
    }

    fn on_message<D: PeerDirectory + ?Sized>(&mut self, envelope: &Envelope, directory: &D) {
        let outcome = match &mut self.replica {
            Replica::Host(authority) => self.protocol.on_host_message(
                envelope,
                authority,
                self.config.allow_peer_control,
                &mut self.notifier,
                directory,
            ),
            Replica::Peer(mirror) => {
                self.protocol
                    .on_peer_message(envelope, mirror, &mut self.notifier, directory)
            }
        };
        debug!(kind = envelope.message.kind(), from = %envelope.from, ?outcome, "handled message");
    }

    fn reload_from_disk(&mut self) {
        let Some(path) = &self.config_path else {
            warn!("no config file to reload");
            return;
        };
        match TimeSpeedConfig::load(path) {
            Ok(config) => self.apply_config(config),
            Err(e) => warn!(error = %e, "config reload failed, keeping current config"),
        }
    }

    /// Swap the config and recompute everything derived from it.
    fn apply_config(&mut self, config: TimeSpeedConfig) {
        self.config = config;
        if let (Replica::Host(authority), Some(ctx)) = (&mut self.replica, &self.context) {
            authority.set_adjust_time_enabled(
                self.config.should_scale(ctx.season, ctx.day_of_month),
            );
            authority.evaluate(&self.config, ctx, false);
            if let Some(location) = &ctx.location {
                authority.set_tick_interval(self.config.tick_interval_for(location));
            }
        }
        info!("config reloaded");
        self.notifier.on_config_reloaded();
    }
}

fn status_due(last_ms: Option<u64>, now_ms: u64) -> bool {
    last_ms.is_none_or(|last| now_ms.saturating_sub(last) >= STATUS_INTERVAL_MS)
}
