// Session state for the relay.
//
// `Session` is the central data structure that `server.rs` drives. It tracks
// the connected game processes and routes addressed payloads between them.
// All mutation happens through methods called from the server's
// single-threaded main loop, so there is no internal locking.
//
// Key responsibilities:
// - Roster: add/remove players, check the handshake, announce joins and
//   departures. Players bring their own multiplayer `PlayerId` and list of
//   installed add-ons; the roster is what lets a peer check the host's
//   add-on version before sending it a request.
// - Host: the first player to join an empty session is the host. If the host
//   leaves, the session refuses new players until everyone has left.
// - Routing: a `Send` is delivered as `Deliver` to the players its
//   `Recipients` select, never back to the sender. The relay does not look
//   inside payloads.
//
// Writing to client streams: `Session` holds cloned `TcpStream` write halves
// wrapped in `BufWriter`. Write errors on a single client are logged but do
// not crash the relay; the reader thread for that client will detect the
// broken pipe and send a `Disconnected` event.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::TcpStream;

use timespeed_protocol::{
    PROTOCOL_VERSION, PlayerId, PlayerInfo, Recipients, ServerFrame, TimeMessage, write_frame,
};
use tracing::{debug, info, warn};

/// Why a handshake was refused. The text is sent to the client in
/// `ServerFrame::Rejected`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("protocol version mismatch: relay speaks {expected}, client sent {got}")]
    ProtocolMismatch { expected: u32, got: u32 },
    #[error("session is full")]
    SessionFull,
    #[error("player {0} is already connected")]
    DuplicatePlayer(PlayerId),
    #[error("the session host has left")]
    HostGone,
}

/// Relay session connecting one host and its peers.
pub struct Session {
    host_id: Option<PlayerId>,
    players: BTreeMap<PlayerId, PlayerState>,
    max_players: u32,
}

struct PlayerState {
    info: PlayerInfo,
    writer: BufWriter<TcpStream>,
}

impl Session {
    pub fn new(max_players: u32) -> Self {
        Self {
            host_id: None,
            players: BTreeMap::new(),
            max_players,
        }
    }

    /// Attempt to add a player to the session. Returns the player's ID on
    /// success, which tags the reader thread for this connection.
    pub fn add_player(
        &mut self,
        protocol_version: u32,
        player: PlayerInfo,
        stream: TcpStream,
    ) -> Result<PlayerId, JoinError> {
        if protocol_version != PROTOCOL_VERSION {
            return Err(JoinError::ProtocolMismatch {
                expected: PROTOCOL_VERSION,
                got: protocol_version,
            });
        }
        if self.players.len() >= self.max_players as usize {
            return Err(JoinError::SessionFull);
        }
        if self.players.contains_key(&player.id) {
            return Err(JoinError::DuplicatePlayer(player.id));
        }

        let id = player.id;
        let host_id = match self.host_id {
            Some(host_id) => host_id,
            None if self.players.is_empty() => id,
            None => return Err(JoinError::HostGone),
        };
        self.host_id = Some(host_id);

        // Announce to existing players before adding the new one.
        self.broadcast(&ServerFrame::PlayerJoined {
            player: player.clone(),
        });

        let is_host = id == host_id;
        info!(player = %id, name = %player.name, is_host, "player joined");
        self.players.insert(
            id,
            PlayerState {
                info: player,
                writer: BufWriter::new(stream),
            },
        );

        let welcome = ServerFrame::Welcome {
            host_id,
            players: self.player_list(),
        };
        self.send_to(id, &welcome);

        Ok(id)
    }

    /// Remove a player and broadcast their departure.
    pub fn remove_player(&mut self, player_id: PlayerId) {
        let Some(state) = self.players.remove(&player_id) else {
            return;
        };
        info!(player = %player_id, name = %state.info.name, "player left");
        self.broadcast(&ServerFrame::PlayerLeft {
            player_id,
            name: state.info.name,
        });
        if self.players.is_empty() {
            self.host_id = None;
        } else if self.host_id == Some(player_id) {
            warn!("host left, refusing new players until the session empties");
        }
    }

    /// Deliver a payload from `from` to the players `to` selects. Returns the
    /// number of players it was sent to.
    pub fn route(
        &mut self,
        from: PlayerId,
        to: Recipients,
        mod_id: String,
        message: TimeMessage,
    ) -> usize {
        let targets: Vec<PlayerId> = match to {
            Recipients::Host => self.host_id.into_iter().collect(),
            Recipients::Player(id) => vec![id],
            Recipients::AllExcept(excluded) => self
                .players
                .keys()
                .copied()
                .filter(|id| *id != excluded)
                .collect(),
        };
        let targets: Vec<PlayerId> = targets
            .into_iter()
            .filter(|id| *id != from && self.players.contains_key(id))
            .collect();

        debug!(
            %from,
            ?to,
            kind = message.kind(),
            delivered = targets.len(),
            "routing payload"
        );
        let frame = ServerFrame::Deliver {
            from,
            mod_id,
            message,
        };
        for id in &targets {
            self.send_to(*id, &frame);
        }
        targets.len()
    }

    pub fn host_id(&self) -> Option<PlayerId> {
        self.host_id
    }

    /// Returns the number of connected players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Returns info about all connected players.
    pub fn player_list(&self) -> Vec<PlayerInfo> {
        self.players.values().map(|ps| ps.info.clone()).collect()
    }

    /// Send a frame to a specific player. Write errors are logged only (the
    /// reader thread will detect the broken pipe).
    fn send_to(&mut self, player_id: PlayerId, frame: &ServerFrame) {
        let Some(ps) = self.players.get_mut(&player_id) else {
            return;
        };
        if let Err(e) = write_frame(&mut ps.writer, frame) {
            warn!(player = %player_id, error = %e, "write to client failed");
        }
    }

    /// Broadcast a frame to all connected players.
    fn broadcast(&mut self, frame: &ServerFrame) {
        let ids: Vec<PlayerId> = self.players.keys().copied().collect();
        for id in ids {
            self.send_to(id, frame);
        }
    }
}
