// Protocol messages for time-speed replication.
//
// Two layers:
// - `TimeMessage`: the five message kinds the time-speed subsystem exchanges
//   between the host and its peers. This is the payload the core dispatches
//   on, matched exhaustively; new kinds are added by extending the enum.
// - `ClientFrame` / `ServerFrame`: the relay envelope around payloads. A
//   process says `Hello` once (name, multiplayer ID, installed add-ons), then
//   `Send`s addressed payloads. The relay answers with the roster and
//   `Deliver`s payloads from other processes.
//
// Addressing is expressed by `Recipients`. The relay never delivers a payload
// back to the process that sent it, whatever the recipients say.

use serde::{Deserialize, Serialize};

use crate::types::{ModVersion, PlayerId};

/// Add-on ID under which the time-speed subsystem sends its messages.
pub const TIME_SPEED_MOD_ID: &str = "cantorsdust.TimeSpeed";

/// Relay handshake version. Bumped on any incompatible frame change.
pub const PROTOCOL_VERSION: u32 = 1;

/// A time-speed payload. Serialized with an inline `type` tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TimeMessage {
    /// Peer → host: toggle whether time is frozen.
    ToggleFreezeRequest,
    /// Peer → host: change the tick interval by `change` milliseconds.
    ChangeTickIntervalRequest { increase: bool, change: u32 },
    /// Host → peers: time was frozen or unfrozen.
    NotifyFreezeChanged {
        is_frozen: bool,
        from_peer_id: PlayerId,
    },
    /// Host → peers: the tick interval changed.
    NotifyTickIntervalChanged {
        new_interval: u32,
        from_peer_id: PlayerId,
    },
    /// Host → one peer: the request was refused by host policy.
    RequestDenied,
}

impl TimeMessage {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TimeMessage::ToggleFreezeRequest => "ToggleFreezeRequest",
            TimeMessage::ChangeTickIntervalRequest { .. } => "ChangeTickIntervalRequest",
            TimeMessage::NotifyFreezeChanged { .. } => "NotifyFreezeChanged",
            TimeMessage::NotifyTickIntervalChanged { .. } => "NotifyTickIntervalChanged",
            TimeMessage::RequestDenied => "RequestDenied",
        }
    }
}

/// Who a payload is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipients {
    /// The session host only.
    Host,
    /// A single player.
    Player(PlayerId),
    /// Every connected player except the given one (and the sender).
    AllExcept(PlayerId),
}

/// An add-on installed in a game process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModInfo {
    pub id: String,
    pub version: ModVersion,
}

/// Public identity of a connected game process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub mods: Vec<ModInfo>,
}

impl PlayerInfo {
    /// Version of the given add-on this player runs, if installed.
    pub fn mod_version(&self, mod_id: &str) -> Option<ModVersion> {
        self.mods.iter().find(|m| m.id == mod_id).map(|m| m.version)
    }
}

/// Frames sent by a game process to the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientFrame {
    /// Join the session (handshake).
    Hello {
        protocol_version: u32,
        player: PlayerInfo,
    },
    /// Send a payload to the given recipients.
    Send {
        to: Recipients,
        mod_id: String,
        message: TimeMessage,
    },
    /// Leaving gracefully.
    Goodbye,
}

/// Frames sent by the relay to a game process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServerFrame {
    /// Handshake accepted. `players` includes the new player.
    Welcome {
        host_id: PlayerId,
        players: Vec<PlayerInfo>,
    },
    /// Handshake rejected.
    Rejected { reason: String },
    /// Another process connected.
    PlayerJoined { player: PlayerInfo },
    /// Another process disconnected.
    PlayerLeft { player_id: PlayerId, name: String },
    /// A payload from another process.
    Deliver {
        from: PlayerId,
        mod_id: String,
        message: TimeMessage,
    },
}
