//! Effects produced by loop transitions

use super::state::{CaptureMode, CoreState, StopReason};
use crate::turn::Utterance;

/// Effects to be executed after a loop transition
#[derive(Debug, Clone)]
pub enum LoopEffect {
    /// Broadcast a new core state (only while the session is current)
    SetState(CoreState),

    /// Open a capture window. `Listening` is broadcast only once the
    /// capture slot is held, so a playback conflict leaves state untouched.
    Capture { mode: CaptureMode, timeout_ms: u64 },

    /// Run the turn orchestrator on a transcript
    Orchestrate { utterance: Utterance },

    /// Play the audio of the most recent turn
    Play,

    /// End the loop
    Stop(StopReason),
}

impl LoopEffect {
    pub fn capture(mode: CaptureMode, timeout_ms: u64) -> Self {
        LoopEffect::Capture { mode, timeout_ms }
    }
}
