//! API request and response types

use crate::state_machine::{CaptureMode, CoreState};
use crate::turn::{TurnMetadata, TurnResult};
use serde::{Deserialize, Serialize};

/// Request to send typed input
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub text: String,
}

/// Request to open one capture window
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VoiceTurnRequest {
    pub mode: CaptureMode,
    /// Capture window; the mode's default when absent or zero
    pub timeout_ms: Option<u64>,
    /// Session of the turn being continued (follow-up modes only)
    pub session_id: Option<u64>,
}

/// One finished turn, as returned by both `chat` and `voice-turn`
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub text: String,
    pub reply: Option<String>,
    pub audio_url: Option<String>,
    pub replied: bool,
    pub metadata: TurnMetadata,
    pub should_followup: bool,
    pub followup_timeout_ms: u64,
    pub session_id: u64,
}

impl From<&TurnResult> for TurnResponse {
    fn from(result: &TurnResult) -> Self {
        Self {
            text: result.transcript.clone(),
            reply: result.reply.clone(),
            audio_url: result.audio_url().map(String::from),
            replied: result.replied(),
            metadata: result.metadata.clone(),
            should_followup: result.should_followup,
            followup_timeout_ms: result.followup_timeout_ms,
            session_id: result.session_id,
        }
    }
}

/// Current core state
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: CoreState,
}

/// Response for cancel action
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub ok: bool,
    pub session_id: u64,
}

/// Error body for most failures
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error body for a playback conflict
#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub detail: String,
}
