// timespeed_relay: message relay for time-speed multiplayer sessions.
//
// Stands in for the game framework's multiplayer message channel: game
// processes connect over TCP, announce themselves with their multiplayer ID
// and installed add-ons, and send addressed payloads that the relay delivers
// to the selected players. Delivery is per-sender ordered (one TCP stream and
// one reader thread per sender) and unordered across senders, and a payload
// is never delivered back to its sender. The relay never looks inside
// payloads; all time-speed logic stays in the game processes.
//
// Module overview:
// - `session.rs`:  Roster, host tracking, handshake checks, payload routing.
//                  The core data structure that `server.rs` drives.
// - `server.rs`:   TCP listener, reader threads (one per client), and the
//                  main event loop. Uses `std::net` with a thread-per-reader
//                  architecture and an `mpsc` channel to funnel events into
//                  the single-threaded `Session`.
// - `client.rs`:   `NetClient`, the game-process side: handshake, send,
//                  non-blocking poll.
//
// The relay can run as a standalone binary (`main.rs`) or be embedded in a
// process via the library API (`start_relay`).

pub mod client;
pub mod server;
pub mod session;

pub use client::{NetClient, NetError, WelcomeInfo};
pub use server::{RelayConfig, RelayHandle, start_relay};
pub use session::{JoinError, Session};
