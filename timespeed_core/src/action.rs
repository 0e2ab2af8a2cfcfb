// Player actions fed into the session controller.
//
// Input detection (key bindings, held modifiers) lives in the embedding
// layer, which turns a keypress into a `PlayerAction` and hands it to
// `TimeSpeedSession::handle()`. On the host an action mutates the authority
// directly; on a peer it becomes a request to the host (see
// `replication.rs`), except `ReloadConfig`, which is always local.

use serde::{Deserialize, Serialize};
use timespeed_protocol::TimeMessage;

use crate::config::{StepModifier, TimeSpeedConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerAction {
    /// Freeze time if it is running, resume it if it is frozen.
    ToggleFreeze,
    /// Make ticks last longer (slow time down).
    IncreaseTickInterval(StepModifier),
    /// Make ticks shorter (speed time up).
    DecreaseTickInterval(StepModifier),
    /// Re-read the config file.
    ReloadConfig,
}

impl PlayerAction {
    /// The request a peer sends to the host for this action, or `None` for
    /// actions that never leave the local process.
    pub fn to_request(self, config: &TimeSpeedConfig) -> Option<TimeMessage> {
        match self {
            PlayerAction::ToggleFreeze => Some(TimeMessage::ToggleFreezeRequest),
            PlayerAction::IncreaseTickInterval(modifier) => {
                Some(TimeMessage::ChangeTickIntervalRequest {
                    increase: true,
                    change: config.interval_change(modifier),
                })
            }
            PlayerAction::DecreaseTickInterval(modifier) => {
                Some(TimeMessage::ChangeTickIntervalRequest {
                    increase: false,
                    change: config.interval_change(modifier),
                })
            }
            PlayerAction::ReloadConfig => None,
        }
    }
}
