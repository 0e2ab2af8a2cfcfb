// Test-only game process for multiplayer integration tests.
//
// Wraps the real `NetClient` (from `timespeed_relay::client`) and a real
// `TimeSpeedSession` (from `timespeed_core`) to provide a synchronous,
// test-friendly API for exercising the full replication pipeline:
// peer action → request → relay → host session → notify → relay → peers.
//
// The only test-specific code here is the synchronous polling wrappers
// (blocking loops around `NetClient::poll()`), the in-memory game clock, and
// the roster bookkeeping a game framework would normally do. All networking
// and time-speed logic uses the same code paths as a real game process.
//
// See also: `tests/full_pipeline.rs` for the integration test scenarios.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use timespeed_core::replication::Envelope;
use timespeed_core::scaler::GAME_DEFAULT_TICK_INTERVAL_MS;
use timespeed_core::{
    GameClock, HudNotifier, Notification, PeerDirectory, PlayerAction, SessionEvent,
    TimeSpeedConfig, TimeSpeedSession,
};
use timespeed_protocol::{ModInfo, ModVersion, PlayerId, PlayerInfo, ServerFrame, TIME_SPEED_MOD_ID};
use timespeed_relay::client::{NetClient, WelcomeInfo};

/// Default timeout for blocking poll operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long `settle()` keeps polling to show that nothing else arrives.
const SETTLE_TIME: Duration = Duration::from_millis(200);

/// The add-on list of a process running the current time-speed version.
pub fn time_speed_mods() -> Vec<ModInfo> {
    vec![ModInfo {
        id: TIME_SPEED_MOD_ID.into(),
        version: ModVersion::new(2, 8, 0),
    }]
}

/// Who is connected, kept up to date from relay frames the way the game
/// framework tracks connected players.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    host_id: Option<PlayerId>,
    players: BTreeMap<PlayerId, PlayerInfo>,
}

impl Roster {
    pub fn from_welcome(welcome: WelcomeInfo) -> Self {
        Self {
            host_id: Some(welcome.host_id),
            players: welcome.players.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    pub fn apply(&mut self, frame: &ServerFrame) {
        match frame {
            ServerFrame::PlayerJoined { player } => {
                self.players.insert(player.id, player.clone());
            }
            ServerFrame::PlayerLeft { player_id, .. } => {
                self.players.remove(player_id);
                if self.host_id == Some(*player_id) {
                    self.host_id = None;
                }
            }
            ServerFrame::Welcome { .. }
            | ServerFrame::Rejected { .. }
            | ServerFrame::Deliver { .. } => {}
        }
    }
}

impl PeerDirectory for Roster {
    fn host_id(&self) -> Option<PlayerId> {
        self.host_id
    }

    fn mod_version(&self, player: PlayerId, mod_id: &str) -> Option<ModVersion> {
        self.players.get(&player)?.mod_version(mod_id)
    }

    fn player_name(&self, player: PlayerId) -> Option<String> {
        self.players.get(&player).map(|p| p.name.clone())
    }
}

/// In-memory game clock.
#[derive(Clone, Debug)]
pub struct TestClock {
    pub time_of_day: u16,
    pub elapsed_ms: f64,
}

impl Default for TestClock {
    fn default() -> Self {
        Self {
            time_of_day: 600,
            elapsed_ms: 0.0,
        }
    }
}

impl GameClock for TestClock {
    fn time_of_day(&self) -> u16 {
        self.time_of_day
    }

    fn default_tick_interval_ms(&self) -> u32 {
        GAME_DEFAULT_TICK_INTERVAL_MS
    }

    fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    fn set_elapsed_ms(&mut self, elapsed_ms: f64) {
        self.elapsed_ms = elapsed_ms;
    }
}

/// A test game process: relay connection, roster, clock, and a real session.
pub struct TestGameProcess {
    client: NetClient,
    pub roster: Roster,
    pub session: TimeSpeedSession<HudNotifier>,
    pub clock: TestClock,
}

impl TestGameProcess {
    /// Connect as the session host. Must be the first process to connect.
    pub fn host(addr: SocketAddr, id: i64, name: &str, config: TimeSpeedConfig) -> Self {
        let (client, welcome) = connect(addr, id, name, time_speed_mods());
        assert_eq!(welcome.host_id, PlayerId(id), "{name} is not the host");
        let session = TimeSpeedSession::host(PlayerId(id), config, HudNotifier::new());
        Self::new(client, welcome, session)
    }

    /// Connect as a peer.
    pub fn peer(addr: SocketAddr, id: i64, name: &str) -> Self {
        let (client, welcome) = connect(addr, id, name, time_speed_mods());
        let session =
            TimeSpeedSession::peer(PlayerId(id), TimeSpeedConfig::default(), HudNotifier::new());
        Self::new(client, welcome, session)
    }

    fn new(client: NetClient, welcome: WelcomeInfo, session: TimeSpeedSession<HudNotifier>) -> Self {
        Self {
            client,
            roster: Roster::from_welcome(welcome),
            session,
            clock: TestClock::default(),
        }
    }

    /// Feed one event to the session and send whatever it queued.
    pub fn handle(&mut self, event: SessionEvent) {
        self.session.handle(event, &mut self.clock, &self.roster);
        for out in self.session.drain_outbox() {
            self.client
                .send(out.to, TIME_SPEED_MOD_ID, out.message)
                .expect("send failed");
        }
    }

    pub fn act(&mut self, action: PlayerAction) {
        self.handle(SessionEvent::Action(action));
    }

    /// Non-blocking: process everything the relay has sent. Returns the
    /// number of payloads delivered to the session.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        for frame in self.client.poll() {
            self.roster.apply(&frame);
            if let ServerFrame::Deliver {
                from,
                mod_id,
                message,
            } = frame
            {
                delivered += 1;
                self.handle(SessionEvent::MessageReceived(Envelope {
                    from,
                    mod_id,
                    message,
                }));
            }
        }
        delivered
    }

    /// Blocking pump until `done` holds.
    pub fn pump_until(&mut self, what: &str, done: impl Fn(&Self) -> bool) {
        let start = Instant::now();
        loop {
            self.pump();
            if done(&*self) {
                return;
            }
            assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Pump for a short while. Returns the number of payloads delivered.
    pub fn settle(&mut self) -> usize {
        let start = Instant::now();
        let mut delivered = 0;
        while start.elapsed() < SETTLE_TIME {
            delivered += self.pump();
            thread::sleep(POLL_INTERVAL);
        }
        delivered
    }

    /// Wait until the roster has `count` players (including this one).
    pub fn wait_for_players(&mut self, count: usize) {
        self.pump_until("players to join", |p| p.roster.players.len() == count);
    }

    pub fn notifications(&mut self) -> Vec<Notification> {
        self.session.notifier_mut().drain()
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }
}

/// Connect a process with the given add-ons and return the raw client. Used
/// for processes that don't run a time-speed session at all.
pub fn connect(
    addr: SocketAddr,
    id: i64,
    name: &str,
    mods: Vec<ModInfo>,
) -> (NetClient, WelcomeInfo) {
    let player = PlayerInfo {
        id: PlayerId(id),
        name: name.into(),
        mods,
    };
    NetClient::connect(&addr.to_string(), player).expect("NetClient::connect failed")
}
