// timespeed_protocol: wire protocol for time-speed replication.
//
// Defines the payloads exchanged by the time-speed subsystem (`TimeMessage`),
// the relay envelope around them (`ClientFrame` / `ServerFrame`), and the
// length-delimited framing both sides use on a TCP stream. Shared by the core
// (`timespeed_core`, which only needs `TimeMessage` and the ID types) and the
// relay (`timespeed_relay`). No dependency on either.
//
// Module overview:
// - `types.rs`:    `PlayerId`, `ModVersion`, and the minimum compatible version.
// - `message.rs`:  `TimeMessage`, `Recipients`, roster types, relay frames.
// - `framing.rs`:  4-byte big-endian length prefix, then JSON payload.
//
// JSON on the wire, as with the config files. Frames are tiny and infrequent
// (one per player keypress), so bandwidth is not a concern.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_MESSAGE_SIZE, read_frame, read_message, write_frame, write_message};
pub use message::{
    ClientFrame, ModInfo, PROTOCOL_VERSION, PlayerInfo, Recipients, ServerFrame, TIME_SPEED_MOD_ID,
    TimeMessage,
};
pub use types::{MIN_COMPATIBLE_VERSION, ModVersion, ParseVersionError, PlayerId};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn host_info() -> PlayerInfo {
        PlayerInfo {
            id: PlayerId(100),
            name: "Host".into(),
            mods: vec![ModInfo {
                id: TIME_SPEED_MOD_ID.into(),
                version: ModVersion::new(2, 8, 0),
            }],
        }
    }

    /// Frame a ClientFrame onto the wire and read it back.
    fn client_roundtrip(frame: &ClientFrame) {
        let mut wire = Vec::new();
        write_frame(&mut wire, frame).unwrap();
        let recovered: ClientFrame = read_frame(&mut Cursor::new(&wire)).unwrap();
        assert_eq!(&recovered, frame);
    }

    /// Frame a ServerFrame onto the wire and read it back.
    fn server_roundtrip(frame: &ServerFrame) {
        let mut wire = Vec::new();
        write_frame(&mut wire, frame).unwrap();
        let recovered: ServerFrame = read_frame(&mut Cursor::new(&wire)).unwrap();
        assert_eq!(&recovered, frame);
    }

    #[test]
    fn roundtrip_hello() {
        client_roundtrip(&ClientFrame::Hello {
            protocol_version: PROTOCOL_VERSION,
            player: host_info(),
        });
    }

    #[test]
    fn roundtrip_send_to_host() {
        client_roundtrip(&ClientFrame::Send {
            to: Recipients::Host,
            mod_id: TIME_SPEED_MOD_ID.into(),
            message: TimeMessage::ChangeTickIntervalRequest {
                increase: false,
                change: 10_000,
            },
        });
    }

    #[test]
    fn roundtrip_welcome() {
        server_roundtrip(&ServerFrame::Welcome {
            host_id: PlayerId(100),
            players: vec![host_info()],
        });
    }

    #[test]
    fn roundtrip_deliver() {
        server_roundtrip(&ServerFrame::Deliver {
            from: PlayerId(100),
            mod_id: TIME_SPEED_MOD_ID.into(),
            message: TimeMessage::NotifyFreezeChanged {
                is_frozen: true,
                from_peer_id: PlayerId(7),
            },
        });
    }

    #[test]
    fn roundtrip_player_left() {
        server_roundtrip(&ServerFrame::PlayerLeft {
            player_id: PlayerId(7),
            name: "Farmhand".into(),
        });
    }
}
