// Notifications for on-screen and log display.
//
// The core reports every successful state change through the `Notifier`
// trait and never reads anything back. The bundled implementation,
// `HudNotifier`, logs each notification through `tracing` and queues it as a
// `Notification` value; the embedding layer drains the queue once per frame
// and draws the text for `display_ms()`.
//
// Attribution: a change requested by another player carries a `Requester`
// so the text can say who asked. Changes made by the local player carry none.

use timespeed_protocol::PlayerId;
use tracing::info;

use crate::types::AutoFreezeReason;

/// The player who asked for a change, with a display name resolved from the
/// roster (or the numeric ID when unknown).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requester {
    pub id: PlayerId,
    pub name: String,
}

/// Receives state-change notifications from the core.
pub trait Notifier {
    fn on_speed_changed(&mut self, new_interval_ms: u32, from: Option<&Requester>);
    /// `reason` is set when the freeze was applied automatically.
    fn on_freeze_toggled(
        &mut self,
        frozen: bool,
        reason: Option<AutoFreezeReason>,
        from: Option<&Requester>,
    );
    fn on_access_denied(&mut self, reason: &str);
    fn on_location_changed(&mut self, frozen: bool, interval_ms: u32, reason: AutoFreezeReason);
    fn on_config_reloaded(&mut self);
}

/// One queued notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    SpeedChanged {
        interval_ms: u32,
        from: Option<Requester>,
    },
    FreezeToggled {
        frozen: bool,
        reason: Option<AutoFreezeReason>,
        from: Option<Requester>,
    },
    AccessDenied {
        reason: String,
    },
    LocationChanged {
        frozen: bool,
        interval_ms: u32,
        reason: AutoFreezeReason,
    },
    ConfigReloaded,
}

impl Notification {
    /// On-screen text.
    pub fn text(&self) -> String {
        match self {
            Notification::SpeedChanged { interval_ms, .. } => {
                format!(
                    "10 minutes of game time now last {} seconds.",
                    format_seconds(*interval_ms)
                )
            }
            Notification::FreezeToggled { frozen: true, .. } => "Time stopped.".to_owned(),
            Notification::FreezeToggled { frozen: false, .. } => "Time resumed.".to_owned(),
            Notification::AccessDenied { reason } => reason.clone(),
            Notification::LocationChanged {
                frozen: true,
                reason: AutoFreezeReason::FrozenAtTime,
                ..
            } => "Time is stopped globally.".to_owned(),
            Notification::LocationChanged {
                frozen: true,
                reason: AutoFreezeReason::FrozenForLocation,
                ..
            } => "Time is stopped here.".to_owned(),
            Notification::LocationChanged { interval_ms, .. } => format!(
                "10 minutes of game time last {} seconds here.",
                format_seconds(*interval_ms)
            ),
            Notification::ConfigReloaded => "Time speed config reloaded.".to_owned(),
        }
    }

    /// How long the text stays on screen.
    pub fn display_ms(&self) -> u32 {
        match self {
            Notification::SpeedChanged { .. } | Notification::FreezeToggled { .. } => 1000,
            Notification::AccessDenied { .. }
            | Notification::LocationChanged { .. }
            | Notification::ConfigReloaded => 2000,
        }
    }
}

/// Logs notifications and queues them for the HUD.
#[derive(Debug, Default)]
pub struct HudNotifier {
    pending: Vec<Notification>,
}

impl HudNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every notification queued since the last drain.
    pub fn drain(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[Notification] {
        &self.pending
    }
}

impl Notifier for HudNotifier {
    fn on_speed_changed(&mut self, new_interval_ms: u32, from: Option<&Requester>) {
        info!(
            "Tick length set to {} seconds{}.",
            format_seconds(new_interval_ms),
            requested_by(from)
        );
        self.pending.push(Notification::SpeedChanged {
            interval_ms: new_interval_ms,
            from: from.cloned(),
        });
    }

    fn on_freeze_toggled(
        &mut self,
        frozen: bool,
        reason: Option<AutoFreezeReason>,
        from: Option<&Requester>,
    ) {
        match (frozen, reason) {
            (true, Some(reason)) => info!(%reason, "Time automatically set to frozen."),
            (true, None) => info!("Time is frozen globally{}.", requested_by(from)),
            (false, _) => info!("Time has resumed{}.", requested_by(from)),
        }
        self.pending.push(Notification::FreezeToggled {
            frozen,
            reason,
            from: from.cloned(),
        });
    }

    fn on_access_denied(&mut self, reason: &str) {
        info!(reason, "Time change refused.");
        self.pending.push(Notification::AccessDenied {
            reason: reason.to_owned(),
        });
    }

    fn on_location_changed(&mut self, frozen: bool, interval_ms: u32, reason: AutoFreezeReason) {
        info!(frozen, interval_ms, %reason, "Location time settings applied.");
        self.pending.push(Notification::LocationChanged {
            frozen,
            interval_ms,
            reason,
        });
    }

    fn on_config_reloaded(&mut self) {
        info!("Config reloaded.");
        self.pending.push(Notification::ConfigReloaded);
    }
}

/// Milliseconds as seconds with at most two decimals ("7", "0.5", "1.25").
pub fn format_seconds(ms: u32) -> String {
    let text = format!("{:.2}", f64::from(ms) / 1000.0);
    text.trim_end_matches('0').trim_end_matches('.').to_owned()
}

fn requested_by(from: Option<&Requester>) -> String {
    from.map(|r| format!(" as requested by {}", r.name))
        .unwrap_or_default()
}
