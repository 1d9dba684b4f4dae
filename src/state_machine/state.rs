//! Assistant and follow-up loop state types

use crate::policy;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Core State
// ============================================================================

/// Process-visible assistant state, broadcast to UI observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoreState {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
    /// Transient impulse; reverts to the prior state after a fixed delay
    Tool,
}

impl CoreState {
    pub fn as_str(self) -> &'static str {
        match self {
            CoreState::Idle => "idle",
            CoreState::Listening => "listening",
            CoreState::Thinking => "thinking",
            CoreState::Speaking => "speaking",
            CoreState::Tool => "tool",
        }
    }
}

impl fmt::Display for CoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Capture Mode
// ============================================================================

/// Why a capture window was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Push-to-talk or explicit button press
    #[default]
    Manual,
    /// Opened by the wake phrase
    Wake,
    /// Re-listen after the assistant expects a reply
    Followup,
    /// The single extra attempt after a follow-up heard nothing
    SecondChance,
}

impl CaptureMode {
    /// Manual and wake captures supersede any older session
    pub fn starts_session(self) -> bool {
        matches!(self, CaptureMode::Manual | CaptureMode::Wake)
    }

    pub fn is_continuation(self) -> bool {
        !self.starts_session()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CaptureMode::Manual => "manual",
            CaptureMode::Wake => "wake",
            CaptureMode::Followup => "followup",
            CaptureMode::SecondChance => "second_chance",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Follow-up Loop State
// ============================================================================

/// The next capture window to open once the current turn is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation {
    pub mode: CaptureMode,
    pub timeout_ms: u64,
}

/// Why a loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The last turn did not ask for a reply
    Completed,
    /// Nothing was heard and no retry remains
    NoSpeech,
    /// A newer manual interaction took over
    Superseded,
    /// Capture hardware or stream error
    CaptureFailed,
    /// Audio was playing when the loop tried to listen
    PlaybackConflict,
}

/// Follow-up loop state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// A capture window is open
    Listening { mode: CaptureMode },
    /// A transcript is being turned into a reply
    Thinking { mode: CaptureMode },
    /// Reply audio is playing; `next` opens afterwards if set
    Speaking { next: Option<Continuation> },
    /// Terminal
    Stopped { reason: StopReason },
}

impl LoopState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, LoopState::Stopped { .. })
    }
}

/// Immutable loop configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopContext {
    pub manual_timeout_ms: u64,
    pub followup_timeout_ms: u64,
    pub second_chance_timeout_ms: u64,
}

impl Default for LoopContext {
    fn default() -> Self {
        Self {
            manual_timeout_ms: policy::DEFAULT_MANUAL_TIMEOUT_MS,
            followup_timeout_ms: policy::FOLLOWUP_TIMEOUT_MS,
            second_chance_timeout_ms: policy::SECOND_CHANCE_TIMEOUT_MS,
        }
    }
}

impl LoopContext {
    /// Capture window for a mode when nothing more specific was requested
    pub fn timeout_for(&self, mode: CaptureMode) -> u64 {
        match mode {
            CaptureMode::Manual | CaptureMode::Wake => self.manual_timeout_ms,
            CaptureMode::Followup => self.followup_timeout_ms,
            CaptureMode::SecondChance => self.second_chance_timeout_ms,
        }
    }
}
