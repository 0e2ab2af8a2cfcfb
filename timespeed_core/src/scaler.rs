// Tick-progress rescaling.
//
// The game advances its clock one 10-minute tick every
// `default_tick_interval_ms` real milliseconds (7000 normally). "Tick
// progress" is the fraction of that interval elapsed so far. To make a tick
// last `custom_interval_ms` instead, every per-update progress delta is
// multiplied by `default / custom`.
//
// Per update:
// 1. `ProgressTracker::observe` reads the game clock and reports how progress
//    moved since the last update, and whether the clock rolled over to a new
//    time of day in between.
// 2. `adjust_progress` decides the progress to write back:
//    - frozen: pin it (0 after a rollover, otherwise the previous value);
//    - running with scaling: rescale the delta (or the fresh progress after
//      a rollover);
//    - scaling disabled today: leave the game's own value alone.
// 3. The tracker writes the result back through `GameClock`.
//
// A custom interval of 0 means "unset" and is replaced with
// `FALLBACK_TICK_INTERVAL_MS` before dividing.

/// Interval substituted for an unset (0) custom interval.
pub const FALLBACK_TICK_INTERVAL_MS: u32 = 1000;

/// The game's own tick interval outside of special locations.
pub const GAME_DEFAULT_TICK_INTERVAL_MS: u32 = 7000;

/// Rescale a progress delta from the game's interval to a custom one.
pub fn scale(raw_delta: f64, custom_interval_ms: u32, default_interval_ms: u32) -> f64 {
    let custom = if custom_interval_ms == 0 {
        FALLBACK_TICK_INTERVAL_MS
    } else {
        custom_interval_ms
    };
    let ratio = f64::from(default_interval_ms) / f64::from(custom);
    raw_delta * ratio
}

/// The external game clock, as far as tick progress is concerned.
pub trait GameClock {
    /// Current `HHMM` time of day.
    fn time_of_day(&self) -> u16;
    /// Real milliseconds the game itself spends per 10-minute tick here.
    fn default_tick_interval_ms(&self) -> u32;
    /// Real milliseconds elapsed towards the next 10-minute tick.
    fn elapsed_ms(&self) -> f64;
    fn set_elapsed_ms(&mut self, elapsed_ms: f64);
}

/// How tick progress moved between two updates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressChange {
    pub previous: f64,
    pub new: f64,
    /// The time of day changed since the previous update.
    pub time_changed: bool,
}

/// Decide the tick progress to write back after a change, or `None` to leave
/// the game's value untouched.
pub fn adjust_progress(
    change: ProgressChange,
    frozen: bool,
    adjust_time: bool,
    custom_interval_ms: u32,
    default_interval_ms: u32,
) -> Option<f64> {
    if frozen {
        return Some(if change.time_changed {
            0.0
        } else {
            change.previous
        });
    }
    if !adjust_time {
        return None;
    }
    Some(if change.time_changed {
        scale(change.new, custom_interval_ms, default_interval_ms)
    } else {
        change.previous + scale(change.new - change.previous, custom_interval_ms, default_interval_ms)
    })
}

/// Tracks tick progress across updates.
#[derive(Clone, Debug, Default)]
pub struct ProgressTracker {
    last: Option<(u16, f64)>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress towards the next tick as of the last observation or write.
    pub fn progress(&self) -> f64 {
        self.last.map_or(0.0, |(_, progress)| progress)
    }

    /// Read the clock and report how progress moved since last time. The
    /// first observation only records a baseline.
    pub fn observe<C: GameClock + ?Sized>(&mut self, clock: &C) -> Option<ProgressChange> {
        let time = clock.time_of_day();
        let progress = current_progress(clock);
        let previous = self.last.replace((time, progress));
        let (last_time, last_progress) = previous?;
        let time_changed = last_time != time;
        if !time_changed && last_progress == progress {
            return None;
        }
        Some(ProgressChange {
            previous: last_progress,
            new: progress,
            time_changed,
        })
    }

    /// Overwrite the clock's progress.
    pub fn write<C: GameClock + ?Sized>(&mut self, clock: &mut C, progress: f64) {
        let interval = effective_default(clock);
        clock.set_elapsed_ms(progress * f64::from(interval));
        self.last = Some((clock.time_of_day(), progress));
    }

    /// One update pass: observe, adjust, write back. Returns the progress that
    /// was written, if any.
    pub fn update<C: GameClock + ?Sized>(
        &mut self,
        clock: &mut C,
        frozen: bool,
        adjust_time: bool,
        custom_interval_ms: u32,
    ) -> Option<f64> {
        let change = self.observe(clock)?;
        let default_interval = effective_default(clock);
        let progress = adjust_progress(
            change,
            frozen,
            adjust_time,
            custom_interval_ms,
            default_interval,
        )?;
        self.write(clock, progress);
        Some(progress)
    }
}

fn effective_default<C: GameClock + ?Sized>(clock: &C) -> u32 {
    match clock.default_tick_interval_ms() {
        0 => GAME_DEFAULT_TICK_INTERVAL_MS,
        interval => interval,
    }
}

fn current_progress<C: GameClock + ?Sized>(clock: &C) -> f64 {
    clock.elapsed_ms() / f64::from(effective_default(clock))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPSILON,
            "expected {expected}, got {actual}"
        );
    }

    /// Minimal clock: the test advances `elapsed_ms` and rolls the time over
    /// by hand.
    struct FakeClock {
        time_of_day: u16,
        elapsed_ms: f64,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                time_of_day: 600,
                elapsed_ms: 0.0,
            }
        }

        fn advance(&mut self, ms: f64) {
            self.elapsed_ms += ms;
        }

        fn roll_over(&mut self, leftover_ms: f64) {
            self.time_of_day = crate::types::add_minutes(self.time_of_day, 10);
            self.elapsed_ms = leftover_ms;
        }
    }

    impl GameClock for FakeClock {
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

    #[test]
    fn halves_interval_doubles_delta() {
        assert_close(scale(0.1, 3500, 7000), 0.2);
    }

    #[test]
    fn doubled_interval_halves_delta() {
        assert_close(scale(0.1, 14_000, 7000), 0.05);
    }

    #[test]
    fn zero_interval_uses_fallback() {
        for x in [0.0, 0.013, 0.5, 1.0] {
            assert_eq!(scale(x, 0, 7000), scale(x, FALLBACK_TICK_INTERVAL_MS, 7000));
        }
    }

    #[test]
    fn frozen_pins_previous_progress() {
        let change = ProgressChange {
            previous: 0.4,
            new: 0.45,
            time_changed: false,
        };
        assert_eq!(adjust_progress(change, true, true, 14_000, 7000), Some(0.4));
        assert_eq!(adjust_progress(change, true, false, 14_000, 7000), Some(0.4));
    }

    #[test]
    fn frozen_resets_after_rollover() {
        let change = ProgressChange {
            previous: 0.99,
            new: 0.01,
            time_changed: true,
        };
        assert_eq!(adjust_progress(change, true, true, 14_000, 7000), Some(0.0));
    }

    #[test]
    fn disabled_adjustment_leaves_clock_alone() {
        let change = ProgressChange {
            previous: 0.2,
            new: 0.3,
            time_changed: false,
        };
        assert_eq!(adjust_progress(change, false, false, 14_000, 7000), None);
    }

    #[test]
    fn running_rescales_delta_only() {
        let change = ProgressChange {
            previous: 0.2,
            new: 0.3,
            time_changed: false,
        };
        let adjusted = adjust_progress(change, false, true, 14_000, 7000).unwrap();
        assert_close(adjusted, 0.25);
    }

    #[test]
    fn rollover_rescales_fresh_progress() {
        let change = ProgressChange {
            previous: 0.98,
            new: 0.02,
            time_changed: true,
        };
        let adjusted = adjust_progress(change, false, true, 14_000, 7000).unwrap();
        assert_close(adjusted, 0.01);
    }

    #[test]
    fn first_observation_is_baseline() {
        let clock = FakeClock::new();
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.observe(&clock), None);
        assert_eq!(tracker.observe(&clock), None);
    }

    #[test]
    fn tracker_slows_clock_to_custom_interval() {
        let mut clock = FakeClock::new();
        let mut tracker = ProgressTracker::new();
        tracker.update(&mut clock, false, true, 14_000);

        // 700 ms of game time at the default rate is 10% progress; with a
        // 14 s interval only 5% should stick.
        clock.advance(700.0);
        let written = tracker.update(&mut clock, false, true, 14_000).unwrap();
        assert_close(written, 0.05);
        assert_close(clock.elapsed_ms, 350.0);
        assert_close(tracker.progress(), 0.05);
    }

    #[test]
    fn tracker_holds_clock_while_frozen() {
        let mut clock = FakeClock::new();
        clock.elapsed_ms = 2100.0;
        let mut tracker = ProgressTracker::new();
        tracker.update(&mut clock, true, true, 14_000);

        for _ in 0..5 {
            clock.advance(16.0);
            tracker.update(&mut clock, true, true, 14_000);
        }
        assert_close(clock.elapsed_ms, 2100.0);
        assert_eq!(clock.time_of_day, 600);
    }

    #[test]
    fn tracker_resets_when_clock_rolls_while_frozen() {
        let mut clock = FakeClock::new();
        let mut tracker = ProgressTracker::new();
        tracker.update(&mut clock, true, true, 14_000);

        clock.roll_over(40.0);
        let written = tracker.update(&mut clock, true, true, 14_000).unwrap();
        assert_eq!(written, 0.0);
        assert_eq!(clock.elapsed_ms, 0.0);
        assert_eq!(clock.time_of_day, 610);
    }

    #[test]
    fn tracker_passes_through_when_not_adjusting() {
        let mut clock = FakeClock::new();
        let mut tracker = ProgressTracker::new();
        tracker.update(&mut clock, false, false, 14_000);

        clock.advance(700.0);
        assert_eq!(tracker.update(&mut clock, false, false, 14_000), None);
        assert_close(clock.elapsed_ms, 700.0);
    }
}
