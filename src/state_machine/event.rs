//! Events that drive the follow-up loop

use crate::turn::{TurnResult, Utterance};

/// Events that trigger loop transitions
#[derive(Debug, Clone)]
pub enum LoopEvent {
    // Capture outcomes
    Heard {
        utterance: Utterance,
    },
    /// Capture completed (or timed out) with an empty transcript
    NoSpeech,
    CaptureFailed {
        message: String,
    },
    PlaybackBusy,

    // Turn outcomes
    TurnComplete {
        replied: bool,
        has_audio: bool,
        should_followup: bool,
        followup_timeout_ms: u64,
    },
    PlaybackFinished,

    /// The loop's session id is no longer current
    Superseded,
}

impl LoopEvent {
    pub fn turn_complete(result: &TurnResult) -> Self {
        LoopEvent::TurnComplete {
            replied: result.replied(),
            has_audio: result.audio.is_some(),
            should_followup: result.should_followup,
            followup_timeout_ms: result.followup_timeout_ms,
        }
    }
}
