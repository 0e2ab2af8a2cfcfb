// Integration smoke test for the relay server.
//
// Starts a relay on localhost, connects mock clients, and exercises the
// protocol lifecycle: handshake, addressed routing, sender exclusion,
// malformed-frame handling, and graceful disconnect.
//
// Most clients are plain TCP sockets using the protocol crate's framing and
// frame types, with no game code involved. The last test drives the same
// flow through `NetClient`.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use timespeed_protocol::{
    ClientFrame, ModInfo, ModVersion, PROTOCOL_VERSION, PlayerId, PlayerInfo, Recipients,
    ServerFrame, TIME_SPEED_MOD_ID, TimeMessage, read_frame, read_message, write_frame,
    write_message,
};
use timespeed_relay::client::{NetClient, NetError};
use timespeed_relay::server::{RelayConfig, start_relay};

const HOST: PlayerId = PlayerId(100);
const ALICE: PlayerId = PlayerId(7);
const BOB: PlayerId = PlayerId(8);

fn relay_config() -> RelayConfig {
    RelayConfig {
        port: 0, // OS picks a free port
        ..RelayConfig::default()
    }
}

fn player(id: PlayerId, name: &str) -> PlayerInfo {
    PlayerInfo {
        id,
        name: name.into(),
        mods: vec![ModInfo {
            id: TIME_SPEED_MOD_ID.into(),
            version: ModVersion::new(2, 8, 0),
        }],
    }
}

fn send(writer: &mut BufWriter<TcpStream>, frame: &ClientFrame) {
    write_frame(writer, frame).unwrap();
}

fn recv(reader: &mut BufReader<TcpStream>) -> ServerFrame {
    read_frame(reader).unwrap()
}

fn send_to(writer: &mut BufWriter<TcpStream>, to: Recipients, message: TimeMessage) {
    send(
        writer,
        &ClientFrame::Send {
            to,
            mod_id: TIME_SPEED_MOD_ID.into(),
            message,
        },
    );
}

/// Connect to the relay and perform the Hello handshake. Returns the
/// reader/writer pair and the Welcome frame.
fn connect_and_hello(
    addr: SocketAddr,
    info: PlayerInfo,
) -> (BufReader<TcpStream>, BufWriter<TcpStream>, ServerFrame) {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let reader_stream = stream.try_clone().unwrap();
    let mut writer = BufWriter::new(stream);
    let mut reader = BufReader::new(reader_stream);

    send(
        &mut writer,
        &ClientFrame::Hello {
            protocol_version: PROTOCOL_VERSION,
            player: info,
        },
    );
    let welcome = recv(&mut reader);
    (reader, writer, welcome)
}

/// Drain all currently buffered frames using a short read timeout.
fn drain_frames(reader: &mut BufReader<TcpStream>) -> Vec<ServerFrame> {
    let mut frames = Vec::new();
    reader
        .get_ref()
        .set_read_timeout(Some(Duration::from_millis(50)))
        .ok();
    for _ in 0..50 {
        match read_message(reader) {
            Ok(bytes) => match serde_json::from_slice::<ServerFrame>(&bytes) {
                Ok(frame) => frames.push(frame),
                Err(_) => break,
            },
            Err(_) => break,
        }
    }
    // Restore longer timeout for subsequent blocking reads.
    reader
        .get_ref()
        .set_read_timeout(Some(Duration::from_secs(5)))
        .ok();
    frames
}

#[test]
fn full_session_lifecycle() {
    let (handle, addr) = start_relay(relay_config()).unwrap();

    // 1. Host connects first and is told it is the host.
    let (mut host_r, mut host_w, welcome) = connect_and_hello(addr, player(HOST, "Host"));
    match welcome {
        ServerFrame::Welcome { host_id, players } => {
            assert_eq!(host_id, HOST);
            assert_eq!(players.len(), 1);
        }
        other => panic!("expected Welcome, got {other:?}"),
    }

    // 2. Two peers join; the roster carries the host's add-on version.
    let (mut alice_r, mut alice_w, welcome) = connect_and_hello(addr, player(ALICE, "Alice"));
    match welcome {
        ServerFrame::Welcome { host_id, players } => {
            assert_eq!(host_id, HOST);
            let host = players.iter().find(|p| p.id == HOST).unwrap();
            assert_eq!(
                host.mod_version(TIME_SPEED_MOD_ID),
                Some(ModVersion::new(2, 8, 0))
            );
        }
        other => panic!("expected Welcome, got {other:?}"),
    }
    let (mut bob_r, _bob_w, _) = connect_and_hello(addr, player(BOB, "Bob"));

    match recv(&mut host_r) {
        ServerFrame::PlayerJoined { player } => assert_eq!(player.id, ALICE),
        other => panic!("expected PlayerJoined, got {other:?}"),
    }
    match recv(&mut host_r) {
        ServerFrame::PlayerJoined { player } => assert_eq!(player.id, BOB),
        other => panic!("expected PlayerJoined, got {other:?}"),
    }
    let _bob_joined = recv(&mut alice_r);

    // 3. Alice asks the host for a change; only the host receives it.
    send_to(
        &mut alice_w,
        Recipients::Host,
        TimeMessage::ChangeTickIntervalRequest {
            increase: true,
            change: 1000,
        },
    );
    assert_eq!(
        recv(&mut host_r),
        ServerFrame::Deliver {
            from: ALICE,
            mod_id: TIME_SPEED_MOD_ID.into(),
            message: TimeMessage::ChangeTickIntervalRequest {
                increase: true,
                change: 1000,
            },
        }
    );

    // 4. The host tells everyone but Alice; Bob gets it, Alice doesn't.
    let notify = TimeMessage::NotifyTickIntervalChanged {
        new_interval: 15_000,
        from_peer_id: ALICE,
    };
    send_to(&mut host_w, Recipients::AllExcept(ALICE), notify.clone());
    assert_eq!(
        recv(&mut bob_r),
        ServerFrame::Deliver {
            from: HOST,
            mod_id: TIME_SPEED_MOD_ID.into(),
            message: notify,
        }
    );
    assert!(drain_frames(&mut alice_r).is_empty());

    // 5. Alice leaves; the host sees PlayerLeft.
    send(&mut alice_w, &ClientFrame::Goodbye);
    match recv(&mut host_r) {
        ServerFrame::PlayerLeft { player_id, name } => {
            assert_eq!(player_id, ALICE);
            assert_eq!(name, "Alice");
        }
        other => panic!("expected PlayerLeft, got {other:?}"),
    }

    handle.stop();
}

#[test]
fn duplicate_player_rejected() {
    let (handle, addr) = start_relay(relay_config()).unwrap();
    let (_host_r, _host_w, _) = connect_and_hello(addr, player(HOST, "Host"));

    let (_r, _w, response) = connect_and_hello(addr, player(HOST, "Impostor"));
    match response {
        ServerFrame::Rejected { reason } => {
            assert_eq!(reason, "player 100 is already connected");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }

    handle.stop();
}

#[test]
fn malformed_frame_dropped_connection_kept() {
    let (handle, addr) = start_relay(relay_config()).unwrap();
    let (mut host_r, _host_w, _) = connect_and_hello(addr, player(HOST, "Host"));
    let (_alice_r, mut alice_w, _) = connect_and_hello(addr, player(ALICE, "Alice"));
    let _joined = recv(&mut host_r);

    // A negative interval is unrepresentable and must not decode.
    let bad = br#"{"Send":{"to":"Host","mod_id":"cantorsdust.TimeSpeed","message":{"type":"NotifyTickIntervalChanged","new_interval":-1,"from_peer_id":7}}}"#;
    write_message(&mut alice_w, bad).unwrap();
    send_to(&mut alice_w, Recipients::Host, TimeMessage::ToggleFreezeRequest);

    assert_eq!(
        recv(&mut host_r),
        ServerFrame::Deliver {
            from: ALICE,
            mod_id: TIME_SPEED_MOD_ID.into(),
            message: TimeMessage::ToggleFreezeRequest,
        }
    );

    handle.stop();
}

#[test]
fn net_client_roundtrip() {
    let (handle, addr) = start_relay(relay_config()).unwrap();
    let addr = addr.to_string();

    let (host, welcome) = NetClient::connect(&addr, player(HOST, "Host")).unwrap();
    assert_eq!(welcome.host_id, HOST);
    let (mut alice, welcome) = NetClient::connect(&addr, player(ALICE, "Alice")).unwrap();
    assert_eq!(welcome.players.len(), 2);
    assert_eq!(alice.player_id(), ALICE);

    alice
        .send(
            Recipients::Host,
            TIME_SPEED_MOD_ID,
            TimeMessage::ToggleFreezeRequest,
        )
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut received = Vec::new();
    while Instant::now() < deadline {
        received.extend(host.poll());
        if received
            .iter()
            .any(|f| matches!(f, ServerFrame::Deliver { .. }))
        {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(
        received.iter().any(|f| matches!(
            f,
            ServerFrame::Deliver {
                from: ALICE,
                message: TimeMessage::ToggleFreezeRequest,
                ..
            }
        )),
        "host should receive Alice's request, got: {received:?}"
    );

    // A second process claiming the same ID is refused.
    match NetClient::connect(&addr, player(ALICE, "Alice again")) {
        Err(NetError::Rejected(reason)) => assert!(reason.contains("already connected")),
        Err(other) => panic!("expected rejection, got {other}"),
        Ok(_) => panic!("expected rejection"),
    }

    alice.disconnect();
    handle.stop();
}
