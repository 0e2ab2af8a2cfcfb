// TCP server and main event loop for the relay.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::NewConnection` to the main thread.
// - **Reader threads** (one per client): call `read_message()` in a loop and
//   send `InternalEvent::FrameFrom` to the main thread. A frame that doesn't
//   parse is dropped; on EOF or a read error, send `InternalEvent::Disconnected`.
// - **Main thread**: owns the `Session`, receives events from the channel,
//   and dispatches them. `recv_timeout` wakes it periodically to check the
//   stop flag.
//
// The main thread is the only writer to client TCP streams (via the
// `Session`). Reader threads only read from streams.
//
// Shutdown: the main thread checks a `keep_running` flag (set to false by
// `RelayHandle::stop`) and breaks out of the event loop.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use timespeed_protocol::{
    ClientFrame, PlayerId, ServerFrame, read_frame, read_message, write_frame,
};
use tracing::{debug, info, warn};

use crate::session::Session;

/// How often the main loop wakes up to check the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time a new connection has to send its `Hello`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    NewConnection { stream: TcpStream },
    FrameFrom { player_id: PlayerId, frame: ClientFrame },
    Disconnected { player_id: PlayerId },
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a relay server.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_players: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            port: 24642,
            max_players: 8,
        }
    }
}

/// Start the relay server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used
/// to let the OS pick a free port).
pub fn start_relay(config: RelayConfig) -> std::io::Result<(RelayHandle, SocketAddr)> {
    let listener = TcpListener::bind((config.bind_address.as_str(), config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    info!(%addr, max_players = config.max_players, "relay listening");
    let thread = thread::spawn(move || {
        run_relay(listener, config, keep_running_clone);
    });

    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main relay loop. Runs until `keep_running` is set to false.
fn run_relay(listener: TcpListener, config: RelayConfig, keep_running: Arc<AtomicBool>) {
    let mut session = Session::new(config.max_players);
    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Non-blocking so the accept thread can check keep_running periodically.
    if let Err(e) = listener.set_nonblocking(true) {
        warn!(error = %e, "could not make listener non-blocking");
    }

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    debug!(%addr, "accepted connection");
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed, listener stopping");
                    break;
                }
            }
        }
    });

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                handle_event(&mut session, event, &tx, &keep_running);
                // Drain any additional events that arrived during handling.
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut session, event, &tx, &keep_running);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("relay stopped");
}

/// Dispatch a single event to the session.
fn handle_event(
    session: &mut Session,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    match event {
        InternalEvent::NewConnection { stream } => {
            handle_new_connection(session, stream, tx, keep_running);
        }
        InternalEvent::FrameFrom { player_id, frame } => {
            handle_frame(session, player_id, frame);
        }
        InternalEvent::Disconnected { player_id } => {
            session.remove_player(player_id);
        }
    }
}

/// Handle a new TCP connection: read the Hello handshake, add the player to
/// the session, and spawn a reader thread.
fn handle_new_connection(
    session: &mut Session,
    stream: TcpStream,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).ok();

    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);

    let hello: ClientFrame = match read_frame(&mut reader) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "handshake failed");
            return;
        }
    };

    let ClientFrame::Hello {
        protocol_version,
        player,
    } = hello
    else {
        warn!("first frame was not Hello, dropping connection");
        return;
    };

    let Ok(write_half) = stream.try_clone() else {
        return;
    };
    let name = player.name.clone();
    match session.add_player(protocol_version, player, write_half) {
        Ok(player_id) => {
            // Clear the handshake timeout for the long-lived reader loop.
            stream.set_read_timeout(None).ok();

            let tx_reader = tx.clone();
            let keep_running_reader = keep_running.clone();
            thread::spawn(move || {
                reader_loop(reader, player_id, tx_reader, keep_running_reader);
            });
        }
        Err(e) => {
            warn!(%name, reason = %e, "rejected player");
            let rejected = ServerFrame::Rejected {
                reason: e.to_string(),
            };
            let _ = write_frame(&mut BufWriter::new(stream), &rejected);
        }
    }
}

/// Reader loop for a single client. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    player_id: PlayerId,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        let bytes = match read_message(&mut reader) {
            Ok(bytes) => bytes,
            Err(e) => {
                // EOF or broken pipe.
                debug!(player = %player_id, error = %e, "reader stopping");
                break;
            }
        };
        match serde_json::from_slice::<ClientFrame>(&bytes) {
            Ok(ClientFrame::Goodbye) => {
                debug!(player = %player_id, "goodbye");
                break;
            }
            Ok(frame) => {
                if tx.send(InternalEvent::FrameFrom { player_id, frame }).is_err() {
                    return;
                }
            }
            Err(e) => {
                // The frame was fully consumed, so the stream is still in
                // sync: drop the frame and keep reading.
                warn!(player = %player_id, error = %e, "dropping malformed frame");
            }
        }
    }
    let _ = tx.send(InternalEvent::Disconnected { player_id });
}

/// Handle a frame from a connected player. Hello is handled during
/// connection setup and Goodbye in the reader loop.
fn handle_frame(session: &mut Session, player_id: PlayerId, frame: ClientFrame) {
    match frame {
        ClientFrame::Send {
            to,
            mod_id,
            message,
        } => {
            session.route(player_id, to, mod_id, message);
        }
        ClientFrame::Hello { .. } => {
            warn!(player = %player_id, "ignoring repeated Hello");
        }
        ClientFrame::Goodbye => {}
    }
}
