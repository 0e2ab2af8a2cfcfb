// Auto-freeze policy: maps the current game context to at most one reason.
//
// The rules are fixed-priority, first match wins:
//   1. the location freezes time            → `FrozenForLocation`
//   2. the player is about to pass out      → `FrozenBeforePassOut`
//   3. the time of day freezes time         → `FrozenAtTime`
//   4. otherwise                            → `None`
//
// The policy is a pure function of its input. Callers re-run it on every
// day-start, location-change and time-change event; nothing is cached here.

use crate::config::TimeSpeedConfig;
use crate::types::{AutoFreezeReason, GameContext};

/// Decides whether time should be frozen automatically for a context.
pub trait AutoFreezePolicy {
    fn freeze_reason(&self, ctx: &GameContext) -> AutoFreezeReason;
}

impl AutoFreezePolicy for TimeSpeedConfig {
    fn freeze_reason(&self, ctx: &GameContext) -> AutoFreezeReason {
        if self.should_freeze_location(ctx.location.as_ref()) {
            AutoFreezeReason::FrozenForLocation
        } else if self.should_freeze_before_passing_out(ctx.time_of_day) {
            AutoFreezeReason::FrozenBeforePassOut
        } else if self.should_freeze_at_time(ctx.time_of_day) {
            AutoFreezeReason::FrozenAtTime
        } else {
            AutoFreezeReason::None
        }
    }
}
