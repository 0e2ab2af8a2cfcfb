// Game-context types consumed by the time-speed core.
//
// These describe the parts of the running game the core reads but never
// owns: where the local player is, what time and date it is, and which
// automatic freeze rule (if any) applies. They are plain values built by the
// embedding layer on every day-start, location-change and time-change event.
//
// Time of day uses the game's `HHMM` encoding: 600 is 6:00 AM, 1350 is
// 1:50 PM, 2600 is 2:00 AM the next morning (the hour keeps counting past
// midnight). The clock advances in 10-minute ticks.
//
// See also: `freeze_policy.rs` which maps a `GameContext` to an
// `AutoFreezeReason`, `config.rs` for the rule tables keyed by these types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Time at which the player passes out (2:00 AM).
pub const PASS_OUT_TIME: u16 = 2600;

/// Last 10-minute tick before the player passes out (1:50 AM).
pub const PASS_OUT_FREEZE_TIME: u16 = 2550;

/// Game minutes per clock tick.
pub const MINUTES_PER_TICK: u16 = 10;

/// Calendar season.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Spring, Season::Summer, Season::Fall, Season::Winter];
}

/// Broad category of a game location, used for per-category tick intervals
/// and freeze rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocationKind {
    Indoors,
    Outdoors,
    Mine,
    SkullCavern,
    VolcanoDungeon,
}

/// The location the local player is standing in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub kind: LocationKind,
}

impl Location {
    pub fn new(name: impl Into<String>, kind: LocationKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Snapshot of the game state the auto-freeze rules depend on.
///
/// `location` is `None` while the game is between locations (e.g. during a
/// warp transition); location rules never match then.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameContext {
    pub location: Option<Location>,
    pub time_of_day: u16,
    pub season: Season,
    pub day_of_month: u8,
}

/// Why time is frozen automatically, independent of the manual freeze.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AutoFreezeReason {
    /// No automatic freeze applies.
    #[default]
    None,
    /// Frozen because of the current location.
    FrozenForLocation,
    /// Frozen because of the time of day.
    FrozenAtTime,
    /// Frozen just before the player would pass out.
    FrozenBeforePassOut,
}

impl AutoFreezeReason {
    pub fn is_active(self) -> bool {
        self != AutoFreezeReason::None
    }
}

impl fmt::Display for AutoFreezeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AutoFreezeReason::None => "none",
            AutoFreezeReason::FrozenForLocation => "location",
            AutoFreezeReason::FrozenAtTime => "time of day",
            AutoFreezeReason::FrozenBeforePassOut => "pass-out threshold",
        };
        f.write_str(label)
    }
}

/// Add game minutes to an `HHMM` time, carrying into the hour digits.
/// `add_minutes(1250, 10)` is `1300`; `add_minutes(2550, 10)` is `2600`.
pub fn add_minutes(time_of_day: u16, minutes: u16) -> u16 {
    let total = u32::from(time_of_day / 100) * 60 + u32::from(time_of_day % 100) + u32::from(minutes);
    let hhmm = (total / 60) * 100 + total % 60;
    u16::try_from(hhmm).unwrap_or(u16::MAX)
}

/// Render an `HHMM` time as a 12-hour clock string ("6:00 AM", "1:50 AM").
pub fn format_time_of_day(time_of_day: u16) -> String {
    let hour = (time_of_day / 100) % 24;
    let minute = time_of_day % 100;
    let (display_hour, suffix) = match hour {
        0 => (12, "AM"),
        1..=11 => (hour, "AM"),
        12 => (12, "PM"),
        _ => (hour - 12, "PM"),
    };
    format!("{display_hour}:{minute:02} {suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_minutes_carries_into_hour() {
        assert_eq!(add_minutes(600, 10), 610);
        assert_eq!(add_minutes(1250, 10), 1300);
        assert_eq!(add_minutes(2550, MINUTES_PER_TICK), PASS_OUT_TIME);
        assert_eq!(add_minutes(1345, 30), 1415);
    }

    #[test]
    fn formats_past_midnight() {
        assert_eq!(format_time_of_day(600), "6:00 AM");
        assert_eq!(format_time_of_day(1200), "12:00 PM");
        assert_eq!(format_time_of_day(1350), "1:50 PM");
        assert_eq!(format_time_of_day(2400), "12:00 AM");
        assert_eq!(format_time_of_day(2550), "1:50 AM");
    }

    #[test]
    fn none_reason_is_inactive() {
        assert!(!AutoFreezeReason::None.is_active());
        assert!(AutoFreezeReason::FrozenAtTime.is_active());
        assert_eq!(AutoFreezeReason::default(), AutoFreezeReason::None);
    }

    #[test]
    fn context_roundtrips_through_json() {
        let ctx = GameContext {
            location: Some(Location::new("Farm", LocationKind::Outdoors)),
            time_of_day: 1230,
            season: Season::Fall,
            day_of_month: 16,
        };
        let json = serde_json::to_string(&ctx).unwrap();
        let restored: GameContext = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ctx);
    }
}
