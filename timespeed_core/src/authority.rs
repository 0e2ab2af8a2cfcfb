// The time authority: canonical freeze and tick-interval state for a session.
//
// `TimeAuthorityState` is owned by the host's session controller and mutated
// only from its single update pass. Peers never hold one; they keep a
// `MirrorState` (see `replication.rs`) instead.
//
// Freezing has two independent sources:
// - a manual freeze toggled by a player, and
// - an automatic freeze reason recomputed from the game context by an
//   `AutoFreezePolicy` on every day-start, location-change and time-change.
//
// A player "unfreezing" while an automatic reason is active suspends that
// reason. A suspension only matters while the same reason stays active: it is
// dropped when the reason goes away, when a new day starts, and (for the
// location reason) when the player changes location.
//
//   effectively frozen = manual_freeze
//                        || (auto reason active && auto reason not suspended)
//
// The tick interval is unsigned, so no change can drive it negative;
// decreasing by more than the current value floors at exactly 0. A 0
// interval means "unset" and is substituted by the scaler, never divided by.

use std::collections::BTreeSet;

use tracing::debug;

use crate::freeze_policy::AutoFreezePolicy;
use crate::types::{AutoFreezeReason, GameContext};

/// Result of re-evaluating the automatic freeze for a new context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreezeTransition {
    pub was_frozen: bool,
    pub is_frozen: bool,
    pub previous_reason: AutoFreezeReason,
    pub reason: AutoFreezeReason,
}

impl FreezeTransition {
    /// Time went from running to frozen in this evaluation.
    pub fn newly_frozen(&self) -> bool {
        !self.was_frozen && self.is_frozen
    }
}

/// Human-facing summary of why time is (not) moving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FreezeStatus {
    FrozenManually,
    /// An automatic freeze applies but the player suspended it.
    ResumedManually,
    FrozenAuto(AutoFreezeReason),
    Running,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeAuthorityState {
    manual_freeze: bool,
    auto_freeze_reason: AutoFreezeReason,
    suspended_reasons: BTreeSet<AutoFreezeReason>,
    tick_interval_ms: u32,
    adjust_time_enabled: bool,
}

impl TimeAuthorityState {
    /// Fresh state for a new session: running, no interval set yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manual_freeze(&self) -> bool {
        self.manual_freeze
    }

    pub fn auto_freeze_reason(&self) -> AutoFreezeReason {
        self.auto_freeze_reason
    }

    pub fn suspended_reasons(&self) -> &BTreeSet<AutoFreezeReason> {
        &self.suspended_reasons
    }

    pub fn tick_interval_ms(&self) -> u32 {
        self.tick_interval_ms
    }

    pub fn adjust_time_enabled(&self) -> bool {
        self.adjust_time_enabled
    }

    pub fn set_adjust_time_enabled(&mut self, enabled: bool) {
        self.adjust_time_enabled = enabled;
    }

    pub fn is_effectively_frozen(&self) -> bool {
        self.manual_freeze
            || (self.auto_freeze_reason.is_active()
                && !self.suspended_reasons.contains(&self.auto_freeze_reason))
    }

    /// Recompute the automatic freeze reason for `ctx`.
    ///
    /// Suspensions are cleared when `clear_overrides` is set (day start) or
    /// when no automatic reason applies any more.
    pub fn evaluate<P: AutoFreezePolicy + ?Sized>(
        &mut self,
        policy: &P,
        ctx: &GameContext,
        clear_overrides: bool,
    ) -> FreezeTransition {
        let was_frozen = self.is_effectively_frozen();
        let previous_reason = self.auto_freeze_reason;

        self.auto_freeze_reason = policy.freeze_reason(ctx);
        if clear_overrides || !self.auto_freeze_reason.is_active() {
            self.suspended_reasons.clear();
        }

        if previous_reason != self.auto_freeze_reason {
            debug!(
                from = %previous_reason,
                to = %self.auto_freeze_reason,
                time = ctx.time_of_day,
                "auto freeze changed"
            );
        }

        FreezeTransition {
            was_frozen,
            is_frozen: self.is_effectively_frozen(),
            previous_reason,
            reason: self.auto_freeze_reason,
        }
    }

    /// Set the manual freeze. Unfreezing while an automatic reason is active
    /// suspends that reason until the context changes.
    pub fn toggle_manual_freeze(&mut self, requested_freeze: bool) {
        if self.manual_freeze != requested_freeze {
            debug!(
                from = self.manual_freeze,
                to = requested_freeze,
                "manual freeze changed"
            );
        }
        self.manual_freeze = requested_freeze;
        if !requested_freeze && self.auto_freeze_reason.is_active() {
            self.suspended_reasons.insert(self.auto_freeze_reason);
        }
    }

    /// Flip the effective freeze state. Returns whether time is now frozen.
    pub fn toggle_freeze(&mut self) -> bool {
        let freeze = !self.is_effectively_frozen();
        self.toggle_manual_freeze(freeze);
        freeze
    }

    /// Increase or decrease the tick interval by `delta` milliseconds.
    /// Returns the new interval.
    pub fn change_tick_interval(&mut self, increase: bool, delta: u32) -> u32 {
        self.tick_interval_ms = if increase {
            self.tick_interval_ms.saturating_add(delta)
        } else {
            // Subtracts min(current, delta).
            self.tick_interval_ms.saturating_sub(delta)
        };
        self.tick_interval_ms
    }

    pub fn set_tick_interval(&mut self, tick_interval_ms: u32) {
        self.tick_interval_ms = tick_interval_ms;
    }

    /// Drop a single suspension so the reason takes effect again.
    pub fn lift_suspension(&mut self, reason: AutoFreezeReason) {
        self.suspended_reasons.remove(&reason);
    }

    pub fn status(&self) -> FreezeStatus {
        if self.manual_freeze {
            FreezeStatus::FrozenManually
        } else if self.auto_freeze_reason.is_active()
            && self.suspended_reasons.contains(&self.auto_freeze_reason)
        {
            FreezeStatus::ResumedManually
        } else if self.is_effectively_frozen() {
            FreezeStatus::FrozenAuto(self.auto_freeze_reason)
        } else {
            FreezeStatus::Running
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::types::Season;

    /// Policy that always answers with the reason it holds.
    struct FixedPolicy(AutoFreezeReason);

    impl AutoFreezePolicy for FixedPolicy {
        fn freeze_reason(&self, _ctx: &GameContext) -> AutoFreezeReason {
            self.0
        }
    }

    fn ctx() -> GameContext {
        GameContext {
            location: None,
            time_of_day: 1200,
            season: Season::Spring,
            day_of_month: 1,
        }
    }

    fn expected_frozen(state: &TimeAuthorityState) -> bool {
        state.manual_freeze()
            || (state.auto_freeze_reason() != AutoFreezeReason::None
                && !state
                    .suspended_reasons()
                    .contains(&state.auto_freeze_reason()))
    }

    #[test]
    fn fresh_state_runs() {
        let state = TimeAuthorityState::new();
        assert!(!state.is_effectively_frozen());
        assert_eq!(state.tick_interval_ms(), 0);
        assert_eq!(state.status(), FreezeStatus::Running);
    }

    #[test]
    fn auto_freeze_applies_and_reports_transition() {
        let mut state = TimeAuthorityState::new();
        let t = state.evaluate(&FixedPolicy(AutoFreezeReason::FrozenAtTime), &ctx(), false);
        assert!(t.newly_frozen());
        assert_eq!(t.previous_reason, AutoFreezeReason::None);
        assert_eq!(t.reason, AutoFreezeReason::FrozenAtTime);
        assert_eq!(
            state.status(),
            FreezeStatus::FrozenAuto(AutoFreezeReason::FrozenAtTime)
        );
    }

    #[test]
    fn unfreeze_suspends_active_reason() {
        let mut state = TimeAuthorityState::new();
        state.evaluate(&FixedPolicy(AutoFreezeReason::FrozenAtTime), &ctx(), false);
        state.toggle_manual_freeze(false);
        assert!(!state.is_effectively_frozen());
        assert!(
            state
                .suspended_reasons()
                .contains(&AutoFreezeReason::FrozenAtTime)
        );
        assert_eq!(state.status(), FreezeStatus::ResumedManually);

        // Same reason on the next time change: still suspended.
        let t = state.evaluate(&FixedPolicy(AutoFreezeReason::FrozenAtTime), &ctx(), false);
        assert!(!t.is_frozen);
    }

    #[test]
    fn suspension_ignores_other_reasons() {
        let mut state = TimeAuthorityState::new();
        state.evaluate(&FixedPolicy(AutoFreezeReason::FrozenAtTime), &ctx(), false);
        state.toggle_manual_freeze(false);

        let t = state.evaluate(
            &FixedPolicy(AutoFreezeReason::FrozenBeforePassOut),
            &ctx(),
            false,
        );
        assert!(t.newly_frozen());
    }

    #[test]
    fn suspension_cleared_when_reason_disappears() {
        let mut state = TimeAuthorityState::new();
        state.evaluate(&FixedPolicy(AutoFreezeReason::FrozenAtTime), &ctx(), false);
        state.toggle_manual_freeze(false);
        state.evaluate(&FixedPolicy(AutoFreezeReason::None), &ctx(), false);
        assert!(state.suspended_reasons().is_empty());

        // Reason returns: the old suspension no longer applies.
        let t = state.evaluate(&FixedPolicy(AutoFreezeReason::FrozenAtTime), &ctx(), false);
        assert!(t.is_frozen);
    }

    #[test]
    fn day_start_clears_suspensions_regardless() {
        let mut state = TimeAuthorityState::new();
        state.evaluate(&FixedPolicy(AutoFreezeReason::FrozenForLocation), &ctx(), false);
        state.toggle_manual_freeze(false);
        state.evaluate(&FixedPolicy(AutoFreezeReason::FrozenForLocation), &ctx(), true);
        assert!(state.suspended_reasons().is_empty());
        assert!(state.is_effectively_frozen());
    }

    #[test]
    fn manual_freeze_survives_reevaluation() {
        let mut state = TimeAuthorityState::new();
        state.toggle_manual_freeze(true);
        state.evaluate(&FixedPolicy(AutoFreezeReason::None), &ctx(), true);
        assert!(state.is_effectively_frozen());
        assert_eq!(state.status(), FreezeStatus::FrozenManually);
    }

    #[test]
    fn toggle_freeze_flips_effective_state() {
        let mut state = TimeAuthorityState::new();
        assert!(state.toggle_freeze());
        assert!(state.is_effectively_frozen());
        assert!(!state.toggle_freeze());
        assert!(!state.is_effectively_frozen());

        state.evaluate(&FixedPolicy(AutoFreezeReason::FrozenAtTime), &ctx(), false);
        assert!(state.is_effectively_frozen());
        assert!(!state.toggle_freeze());
        assert!(!state.is_effectively_frozen());
    }

    #[test]
    fn lift_suspension_reapplies_reason() {
        let mut state = TimeAuthorityState::new();
        state.evaluate(&FixedPolicy(AutoFreezeReason::FrozenForLocation), &ctx(), false);
        state.toggle_manual_freeze(false);
        state.lift_suspension(AutoFreezeReason::FrozenForLocation);
        assert!(state.is_effectively_frozen());
    }

    #[test]
    fn decrease_floors_at_zero() {
        let mut state = TimeAuthorityState::new();
        state.set_tick_interval(2500);
        assert_eq!(state.change_tick_interval(false, 1000), 1500);
        assert_eq!(state.change_tick_interval(false, 10_000), 0);
        assert_eq!(state.change_tick_interval(false, 1000), 0);
        assert_eq!(state.change_tick_interval(true, 1000), 1000);
    }

    #[test]
    fn increase_saturates() {
        let mut state = TimeAuthorityState::new();
        state.set_tick_interval(u32::MAX - 5);
        assert_eq!(state.change_tick_interval(true, 1000), u32::MAX);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Evaluate(AutoFreezeReason, bool),
        ToggleManual(bool),
        Toggle,
        Lift(AutoFreezeReason),
        ChangeInterval(bool, u32),
    }

    fn reason() -> impl Strategy<Value = AutoFreezeReason> {
        prop_oneof![
            Just(AutoFreezeReason::None),
            Just(AutoFreezeReason::FrozenForLocation),
            Just(AutoFreezeReason::FrozenAtTime),
            Just(AutoFreezeReason::FrozenBeforePassOut),
        ]
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (reason(), any::<bool>()).prop_map(|(r, clear)| Op::Evaluate(r, clear)),
            any::<bool>().prop_map(Op::ToggleManual),
            Just(Op::Toggle),
            reason().prop_map(Op::Lift),
            (any::<bool>(), 0u32..20_000).prop_map(|(inc, d)| Op::ChangeInterval(inc, d)),
        ]
    }

    proptest! {
        #[test]
        fn effective_freeze_matches_invariant(ops in prop::collection::vec(op(), 0..64)) {
            let mut state = TimeAuthorityState::new();
            for op in ops {
                match op {
                    Op::Evaluate(r, clear) => {
                        state.evaluate(&FixedPolicy(r), &ctx(), clear);
                        if clear || r == AutoFreezeReason::None {
                            prop_assert!(state.suspended_reasons().is_empty());
                        }
                    }
                    Op::ToggleManual(freeze) => {
                        state.toggle_manual_freeze(freeze);
                        prop_assert_eq!(state.is_effectively_frozen(), freeze);
                    }
                    Op::Toggle => {
                        let before = state.is_effectively_frozen();
                        prop_assert_eq!(state.toggle_freeze(), !before);
                    }
                    Op::Lift(r) => state.lift_suspension(r),
                    Op::ChangeInterval(inc, d) => {
                        let before = state.tick_interval_ms();
                        let after = state.change_tick_interval(inc, d);
                        if inc {
                            prop_assert_eq!(after, before + d);
                        } else {
                            prop_assert_eq!(after, before - before.min(d));
                        }
                    }
                }
                prop_assert_eq!(state.is_effectively_frozen(), expected_frozen(&state));
            }
        }
    }
}
