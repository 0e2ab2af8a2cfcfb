// TCP client for connecting a game process to the relay.
//
// Provides a non-blocking interface for the game's update loop. Architecture:
// - `connect()` performs TCP connect + Hello handshake on the calling thread,
//   then spawns a background reader thread.
// - The reader thread reads framed `ServerFrame`s in a loop and pushes them
//   into an `mpsc` channel.
// - The update loop holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking, returning all queued frames.
//
// The update loop never blocks on network reads. Writes flush synchronously,
// which is fine for frames of a few hundred bytes.

use std::io::{self, BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use timespeed_protocol::{
    ClientFrame, PROTOCOL_VERSION, PlayerId, PlayerInfo, Recipients, ServerFrame, TimeMessage,
    read_frame, read_message, write_frame,
};
use tracing::{debug, warn};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from connecting to or talking to the relay.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("relay connection failed: {0}")]
    Io(#[from] io::Error),
    #[error("relay rejected the connection: {0}")]
    Rejected(String),
    #[error("unexpected handshake response: {0}")]
    UnexpectedResponse(String),
}

/// Information returned by a successful `connect()` handshake.
#[derive(Clone, Debug)]
pub struct WelcomeInfo {
    pub host_id: PlayerId,
    /// Everyone connected, including this process.
    pub players: Vec<PlayerInfo>,
}

/// TCP client for relay communication.
pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerFrame>,
    _reader_thread: JoinHandle<()>,
    player_id: PlayerId,
}

impl NetClient {
    /// Connect to a relay, perform the Hello handshake, and spawn a reader
    /// thread. Returns the client and welcome info on success.
    pub fn connect(addr: &str, player: PlayerInfo) -> Result<(Self, WelcomeInfo), NetError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);
        let player_id = player.id;

        write_frame(
            &mut writer,
            &ClientFrame::Hello {
                protocol_version: PROTOCOL_VERSION,
                player,
            },
        )?;

        let welcome = match read_frame::<_, ServerFrame>(&mut reader)? {
            ServerFrame::Welcome { host_id, players } => WelcomeInfo { host_id, players },
            ServerFrame::Rejected { reason } => return Err(NetError::Rejected(reason)),
            other => return Err(NetError::UnexpectedResponse(format!("{other:?}"))),
        };
        debug!(player = %player_id, host = %welcome.host_id, "connected to relay");

        // Clear the handshake timeout for the long-lived reader loop.
        reader.get_ref().set_read_timeout(None)?;

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, tx));

        Ok((
            Self {
                writer,
                inbox: rx,
                _reader_thread: reader_thread,
                player_id,
            },
            welcome,
        ))
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Send a payload to the given recipients.
    pub fn send(
        &mut self,
        to: Recipients,
        mod_id: &str,
        message: TimeMessage,
    ) -> Result<(), NetError> {
        let frame = ClientFrame::Send {
            to,
            mod_id: mod_id.into(),
            message,
        };
        write_frame(&mut self.writer, &frame)?;
        Ok(())
    }

    /// Send Goodbye. The relay closes the connection.
    pub fn disconnect(&mut self) {
        if let Err(e) = write_frame(&mut self.writer, &ClientFrame::Goodbye) {
            debug!(error = %e, "goodbye not delivered");
        }
    }

    /// Drain all queued server frames (non-blocking).
    pub fn poll(&self) -> Vec<ServerFrame> {
        self.inbox.try_iter().collect()
    }
}

/// Reader thread: read framed messages in a loop, push to channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerFrame>) {
    while let Ok(bytes) = read_message(&mut reader) {
        match serde_json::from_slice::<ServerFrame>(&bytes) {
            Ok(frame) => {
                if tx.send(frame).is_err() {
                    break; // Update loop dropped the receiver
                }
            }
            Err(e) => warn!(error = %e, "dropping malformed frame from relay"),
        }
    }
}
