// Host-authoritative replication of the time-authority state.
//
// One process per session is the host and owns the canonical
// `TimeAuthorityState`. Every other process is a peer holding a display-only
// `MirrorState`. Peers never change shared state: they send a request to the
// host, and the host either applies it and tells everyone else, or answers
// the requester alone with `RequestDenied`.
//
// Peer → host:
//   1. The peer checks the roster (`PeerDirectory`) for a host running a
//      compatible version of this add-on. If there is none, nothing is sent
//      and the caller shows a local notice (`RequestError`).
//   2. Otherwise the request goes into the outbox addressed to the host.
//
// Host, on a request:
//   - echoes of our own messages and other add-ons' messages are dropped;
//   - peer control disabled: `RequestDenied` to the requester, nothing else;
//   - peer control enabled: mutate the state, notify locally, and broadcast
//     the matching `Notify*` to every peer except the requester.
//
// Peer, on a `Notify*`: overwrite the mirror and notify. Never replies, so
// notifications cannot bounce. Applying the same value twice is a no-op.
//
// The host doesn't echo an accepted request back to its requester, so the
// requester shows the outcome itself as soon as the request is queued
// (`apply_expected`). That needs a known mirror value to start from. The last
// host-confirmed mirror is kept aside until the host answers, and a
// `RequestDenied` restores it.
//
// Messages are never sent directly. They queue in an outbox that the
// embedding loop drains after each update pass, so nothing here blocks, and
// the host handles one message at a time from its single update pass, which
// is what makes the unlocked state safe. Per-sender order is preserved by the
// channel; across senders the last applied change wins.

use timespeed_protocol::{
    MIN_COMPATIBLE_VERSION, ModVersion, PlayerId, Recipients, TIME_SPEED_MOD_ID, TimeMessage,
};
use tracing::{debug, info};

use crate::authority::TimeAuthorityState;
use crate::notifier::{Notifier, Requester};

/// Notice shown on a peer when the host refuses a request.
pub const HOST_DENIED_TEXT: &str = "The host has disabled time control for other players.";

/// Read-only view of the session roster.
pub trait PeerDirectory {
    /// The session host, if connected.
    fn host_id(&self) -> Option<PlayerId>;
    /// Version of an add-on a player runs, if installed.
    fn mod_version(&self, player: PlayerId, mod_id: &str) -> Option<ModVersion>;
    fn player_name(&self, player: PlayerId) -> Option<String>;
}

/// Why a peer could not send a request to the host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("The host isn't connected.")]
    HostMissing,
    #[error("The host doesn't have the time speed mod installed.")]
    HostMissingMod,
    #[error("The host's time speed mod ({version}) is too old to accept requests.")]
    HostIncompatible { version: ModVersion },
}

/// A received add-on message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub from: PlayerId,
    pub mod_id: String,
    pub message: TimeMessage,
}

/// A message waiting to be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outgoing {
    pub to: Recipients,
    pub message: TimeMessage,
}

/// A peer's display copy of the host state. `None` until the host first
/// reports a value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MirrorState {
    pub is_frozen: Option<bool>,
    pub tick_interval_ms: Option<u32>,
    pub last_changed_by: Option<PlayerId>,
}

/// What handling a received message did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Echo, foreign add-on, or a kind this role doesn't handle.
    Dropped,
    /// Host refused the request by policy.
    Denied,
    /// Host applied the request and broadcast the result.
    Applied,
    /// Peer updated its mirror.
    Mirrored,
    /// Peer showed the host's denial.
    DenialShown,
}

pub struct ReplicationProtocol {
    local_id: PlayerId,
    mod_id: String,
    outbox: Vec<Outgoing>,
    /// Peer: mirror as last reported by the host, while a locally applied
    /// request outcome is shown instead.
    confirmed: Option<MirrorState>,
}

impl ReplicationProtocol {
    pub fn new(local_id: PlayerId) -> Self {
        Self {
            local_id,
            mod_id: TIME_SPEED_MOD_ID.to_owned(),
            outbox: Vec::new(),
            confirmed: None,
        }
    }

    pub fn local_id(&self) -> PlayerId {
        self.local_id
    }

    pub fn mod_id(&self) -> &str {
        &self.mod_id
    }

    /// Take every message queued since the last drain, in send order.
    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Queue a request to the host after confirming the host can handle it.
    pub fn request<D: PeerDirectory + ?Sized>(
        &mut self,
        message: TimeMessage,
        directory: &D,
    ) -> Result<(), RequestError> {
        let host = directory.host_id().ok_or(RequestError::HostMissing)?;
        let version = directory
            .mod_version(host, &self.mod_id)
            .ok_or(RequestError::HostMissingMod)?;
        if version.is_older_than(MIN_COMPATIBLE_VERSION) {
            return Err(RequestError::HostIncompatible { version });
        }
        debug!(kind = message.kind(), %host, "sending request to host");
        self.outbox.push(Outgoing {
            to: Recipients::Host,
            message,
        });
        Ok(())
    }

    /// Peer: show the outcome of a request that was just queued, as the host
    /// will compute it. Returns false, showing nothing, while the mirror
    /// doesn't know the value the request changes.
    pub fn apply_expected<N: Notifier + ?Sized>(
        &mut self,
        request: &TimeMessage,
        mirror: &mut MirrorState,
        notifier: &mut N,
    ) -> bool {
        match *request {
            TimeMessage::ToggleFreezeRequest => {
                let Some(was_frozen) = mirror.is_frozen else {
                    return false;
                };
                self.hold_confirmed(mirror);
                mirror.is_frozen = Some(!was_frozen);
                mirror.last_changed_by = Some(self.local_id);
                notifier.on_freeze_toggled(!was_frozen, None, None);
            }
            TimeMessage::ChangeTickIntervalRequest { increase, change } => {
                let Some(interval) = mirror.tick_interval_ms else {
                    return false;
                };
                let expected = if increase {
                    interval.saturating_add(change)
                } else {
                    interval.saturating_sub(change)
                };
                self.hold_confirmed(mirror);
                mirror.tick_interval_ms = Some(expected);
                mirror.last_changed_by = Some(self.local_id);
                notifier.on_speed_changed(expected, None);
            }
            TimeMessage::NotifyFreezeChanged { .. }
            | TimeMessage::NotifyTickIntervalChanged { .. }
            | TimeMessage::RequestDenied => return false,
        }
        true
    }

    fn hold_confirmed(&mut self, mirror: &MirrorState) {
        if self.confirmed.is_none() {
            self.confirmed = Some(mirror.clone());
        }
    }

    /// Tell every peer except `origin` that the freeze state changed.
    pub fn broadcast_freeze(&mut self, is_frozen: bool, origin: PlayerId) {
        self.outbox.push(Outgoing {
            to: Recipients::AllExcept(origin),
            message: TimeMessage::NotifyFreezeChanged {
                is_frozen,
                from_peer_id: origin,
            },
        });
    }

    /// Tell every peer except `origin` that the tick interval changed.
    pub fn broadcast_interval(&mut self, new_interval: u32, origin: PlayerId) {
        self.outbox.push(Outgoing {
            to: Recipients::AllExcept(origin),
            message: TimeMessage::NotifyTickIntervalChanged {
                new_interval,
                from_peer_id: origin,
            },
        });
    }

    /// Host: flip the freeze, notify locally, broadcast to everyone but
    /// `origin`. `requester` is `None` for the host's own actions.
    pub fn apply_toggle_freeze<N: Notifier + ?Sized>(
        &mut self,
        state: &mut TimeAuthorityState,
        notifier: &mut N,
        origin: PlayerId,
        requester: Option<&Requester>,
    ) -> bool {
        let frozen = state.toggle_freeze();
        notifier.on_freeze_toggled(frozen, None, requester);
        self.broadcast_freeze(frozen, origin);
        frozen
    }

    /// Host: change the interval, notify locally, broadcast to everyone but
    /// `origin`.
    pub fn apply_change_interval<N: Notifier + ?Sized>(
        &mut self,
        state: &mut TimeAuthorityState,
        notifier: &mut N,
        increase: bool,
        change: u32,
        origin: PlayerId,
        requester: Option<&Requester>,
    ) -> u32 {
        let interval = state.change_tick_interval(increase, change);
        notifier.on_speed_changed(interval, requester);
        self.broadcast_interval(interval, origin);
        interval
    }

    /// Whether a received message is for us: from another process and
    /// addressed to this add-on.
    pub fn accepts(&self, envelope: &Envelope) -> bool {
        envelope.from != self.local_id && envelope.mod_id == self.mod_id
    }

    /// Host side of message handling.
    pub fn on_host_message<N, D>(
        &mut self,
        envelope: &Envelope,
        state: &mut TimeAuthorityState,
        allow_peer_control: bool,
        notifier: &mut N,
        directory: &D,
    ) -> MessageOutcome
    where
        N: Notifier + ?Sized,
        D: PeerDirectory + ?Sized,
    {
        if !self.accepts(envelope) {
            return MessageOutcome::Dropped;
        }
        let from = envelope.from;
        let action = match envelope.message {
            TimeMessage::ToggleFreezeRequest => "toggle time freeze",
            TimeMessage::ChangeTickIntervalRequest { .. } => "change time speed",
            TimeMessage::NotifyFreezeChanged { .. }
            | TimeMessage::NotifyTickIntervalChanged { .. }
            | TimeMessage::RequestDenied => {
                debug!(kind = envelope.message.kind(), %from, "host ignoring peer-bound message");
                return MessageOutcome::Dropped;
            }
        };

        let requester = resolve_requester(directory, from);
        if !allow_peer_control {
            info!(
                "Rejected request from {} to {action}, because peer control is disabled.",
                requester.name
            );
            self.outbox.push(Outgoing {
                to: Recipients::Player(from),
                message: TimeMessage::RequestDenied,
            });
            return MessageOutcome::Denied;
        }

        match envelope.message {
            TimeMessage::ToggleFreezeRequest => {
                self.apply_toggle_freeze(state, notifier, from, Some(&requester));
            }
            TimeMessage::ChangeTickIntervalRequest { increase, change } => {
                self.apply_change_interval(
                    state,
                    notifier,
                    increase,
                    change,
                    from,
                    Some(&requester),
                );
            }
            TimeMessage::NotifyFreezeChanged { .. }
            | TimeMessage::NotifyTickIntervalChanged { .. }
            | TimeMessage::RequestDenied => return MessageOutcome::Dropped,
        }
        MessageOutcome::Applied
    }

    /// Peer side of message handling. Never queues a reply.
    pub fn on_peer_message<N, D>(
        &mut self,
        envelope: &Envelope,
        mirror: &mut MirrorState,
        notifier: &mut N,
        directory: &D,
    ) -> MessageOutcome
    where
        N: Notifier + ?Sized,
        D: PeerDirectory + ?Sized,
    {
        if !self.accepts(envelope) {
            return MessageOutcome::Dropped;
        }
        match envelope.message {
            TimeMessage::NotifyFreezeChanged {
                is_frozen,
                from_peer_id,
            } => {
                for copy in std::iter::once(&mut *mirror).chain(self.confirmed.as_mut()) {
                    copy.is_frozen = Some(is_frozen);
                    copy.last_changed_by = Some(from_peer_id);
                }
                let requester = self.attribution(directory, from_peer_id);
                notifier.on_freeze_toggled(is_frozen, None, requester.as_ref());
                MessageOutcome::Mirrored
            }
            TimeMessage::NotifyTickIntervalChanged {
                new_interval,
                from_peer_id,
            } => {
                for copy in std::iter::once(&mut *mirror).chain(self.confirmed.as_mut()) {
                    copy.tick_interval_ms = Some(new_interval);
                    copy.last_changed_by = Some(from_peer_id);
                }
                let requester = self.attribution(directory, from_peer_id);
                notifier.on_speed_changed(new_interval, requester.as_ref());
                MessageOutcome::Mirrored
            }
            TimeMessage::RequestDenied => {
                if let Some(confirmed) = self.confirmed.take() {
                    *mirror = confirmed;
                }
                notifier.on_access_denied(HOST_DENIED_TEXT);
                MessageOutcome::DenialShown
            }
            TimeMessage::ToggleFreezeRequest | TimeMessage::ChangeTickIntervalRequest { .. } => {
                debug!(kind = envelope.message.kind(), from = %envelope.from, "peer ignoring host-bound message");
                MessageOutcome::Dropped
            }
        }
    }

    /// Attribution for a change: none when it came from this process.
    fn attribution<D: PeerDirectory + ?Sized>(
        &self,
        directory: &D,
        player: PlayerId,
    ) -> Option<Requester> {
        (player != self.local_id).then(|| resolve_requester(directory, player))
    }
}

/// Look up a player's display name, falling back to the numeric ID.
pub fn resolve_requester<D: PeerDirectory + ?Sized>(directory: &D, id: PlayerId) -> Requester {
    Requester {
        id,
        name: directory
            .player_name(id)
            .unwrap_or_else(|| id.to_string()),
    }
}
