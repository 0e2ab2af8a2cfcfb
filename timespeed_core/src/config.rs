// Data-driven time-speed configuration.
//
// `TimeSpeedConfig` holds every rule table the core consults: how many real
// seconds a game minute lasts (by location name or location kind), which
// days time is scaled at all, which contexts freeze time automatically, and
// the host policy for peer-initiated control. Loaded from JSON; every field
// has a default, so a partial file (or no file) works.
//
// The freeze tables are only read through the `AutoFreezePolicy` impl in
// `freeze_policy.rs`. The rest of the core reads the scalar settings
// directly.
//
// See also: `session.rs` which owns the config and swaps it on reload.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Location, LocationKind, PASS_OUT_FREEZE_TIME, Season};

/// Errors raised while loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A specific day of the year.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeasonDay {
    pub season: Season,
    pub day: u8,
}

/// Contexts in which time freezes automatically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreezeRules {
    /// Freeze everywhere once the clock reaches this `HHMM` time.
    pub anywhere_at_time: Option<u16>,
    /// Freeze on the last tick before the player passes out.
    pub before_passing_out: bool,
    /// Location kinds in which time is frozen.
    pub by_kind: BTreeSet<LocationKind>,
    /// Location names in which time is frozen.
    pub by_name: BTreeSet<String>,
    /// Location names exempt from `by_kind`/`by_name`.
    pub except_names: BTreeSet<String>,
}

/// How far one tick-interval keypress moves the interval, selected by the
/// modifier key held at the time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepModifier {
    /// One tenth of the base step.
    Fine,
    /// The base step.
    Normal,
    /// Ten times the base step.
    Coarse,
    /// A hundred times the base step.
    Huge,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSpeedConfig {
    /// Real seconds per game minute where no override applies.
    pub default_seconds_per_minute: f64,
    /// Per-kind overrides of `default_seconds_per_minute`.
    pub seconds_per_minute_by_kind: BTreeMap<LocationKind, f64>,
    /// Per-name overrides; take precedence over the kind.
    pub seconds_per_minute_by_name: BTreeMap<String, f64>,
    /// Seasons in which the custom speed applies.
    pub scale_seasons: BTreeSet<Season>,
    /// Individual days (e.g. festivals) left at the game's own speed.
    pub unscaled_days: BTreeSet<SeasonDay>,
    pub freeze: FreezeRules,
    /// Whether the host accepts freeze/speed requests from peers.
    pub allow_peer_control: bool,
    /// Whether to show the current speed whenever the player changes location.
    pub notify_on_location_change: bool,
    /// Base tick-interval step in milliseconds for one keypress.
    pub interval_step_ms: u32,
}

impl Default for TimeSpeedConfig {
    fn default() -> Self {
        Self {
            default_seconds_per_minute: 1.4,
            seconds_per_minute_by_kind: BTreeMap::new(),
            seconds_per_minute_by_name: BTreeMap::new(),
            scale_seasons: Season::ALL.into_iter().collect(),
            unscaled_days: BTreeSet::new(),
            freeze: FreezeRules::default(),
            allow_peer_control: true,
            notify_on_location_change: true,
            interval_step_ms: 1000,
        }
    }
}

impl TimeSpeedConfig {
    /// Parse a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Real seconds per game minute in the given location.
    pub fn seconds_per_minute(&self, location: &Location) -> f64 {
        self.seconds_per_minute_by_name
            .get(&location.name)
            .or_else(|| self.seconds_per_minute_by_kind.get(&location.kind))
            .copied()
            .unwrap_or(self.default_seconds_per_minute)
    }

    /// Real milliseconds per 10-game-minute tick in the given location.
    /// Non-positive or non-finite rates yield 0, which the scaler treats as
    /// unset.
    pub fn tick_interval_for(&self, location: &Location) -> u32 {
        tick_interval_from_rate(self.seconds_per_minute(location))
    }

    /// Tick interval where no location override applies.
    pub fn default_tick_interval(&self) -> u32 {
        tick_interval_from_rate(self.default_seconds_per_minute)
    }

    /// Whether the custom speed applies on the given day.
    pub fn should_scale(&self, season: Season, day_of_month: u8) -> bool {
        self.scale_seasons.contains(&season)
            && !self.unscaled_days.contains(&SeasonDay {
                season,
                day: day_of_month,
            })
    }

    /// Whether the location freezes time.
    pub fn should_freeze_location(&self, location: Option<&Location>) -> bool {
        let Some(location) = location else {
            return false;
        };
        if self.freeze.except_names.contains(&location.name) {
            return false;
        }
        self.freeze.by_name.contains(&location.name) || self.freeze.by_kind.contains(&location.kind)
    }

    /// Whether time should stop on the last tick before passing out.
    pub fn should_freeze_before_passing_out(&self, time_of_day: u16) -> bool {
        self.freeze.before_passing_out && time_of_day >= PASS_OUT_FREEZE_TIME
    }

    /// Whether the time of day freezes time everywhere.
    pub fn should_freeze_at_time(&self, time_of_day: u16) -> bool {
        self.freeze
            .anywhere_at_time
            .is_some_and(|freeze_at| time_of_day >= freeze_at)
    }

    /// Tick-interval change for one keypress with the given modifier held.
    pub fn interval_change(&self, modifier: StepModifier) -> u32 {
        let base = self.interval_step_ms;
        match modifier {
            StepModifier::Fine => base / 10,
            StepModifier::Normal => base,
            StepModifier::Coarse => base.saturating_mul(10),
            StepModifier::Huge => base.saturating_mul(100),
        }
    }
}

fn tick_interval_from_rate(seconds_per_minute: f64) -> u32 {
    if !seconds_per_minute.is_finite() || seconds_per_minute <= 0.0 {
        return 0;
    }
    let ms_per_minute = (seconds_per_minute * 1000.0).round() as u32;
    ms_per_minute.saturating_mul(10)
}
