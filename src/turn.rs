//! Utterances and turn results
//!
//! An `Utterance` is one user input, typed or transcribed. Every orchestration
//! cycle turns exactly one utterance into one `TurnResult`.

use crate::state_machine::CaptureMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where an utterance came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtteranceSource {
    Typed,
    VoiceManual,
    VoiceFollowup,
    VoiceSecondChance,
    Wake,
}

impl UtteranceSource {
    pub fn is_voice(self) -> bool {
        !matches!(self, UtteranceSource::Typed)
    }

    /// Follow-up sources are held to the stricter "is this worth answering" gate.
    pub fn is_continuation(self) -> bool {
        matches!(
            self,
            UtteranceSource::VoiceFollowup | UtteranceSource::VoiceSecondChance
        )
    }

    /// The capture mode that produced this source, if any
    pub fn capture_mode(self) -> Option<CaptureMode> {
        match self {
            UtteranceSource::Typed => None,
            UtteranceSource::VoiceManual => Some(CaptureMode::Manual),
            UtteranceSource::VoiceFollowup => Some(CaptureMode::Followup),
            UtteranceSource::VoiceSecondChance => Some(CaptureMode::SecondChance),
            UtteranceSource::Wake => Some(CaptureMode::Wake),
        }
    }
}

impl From<CaptureMode> for UtteranceSource {
    fn from(mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::Manual => UtteranceSource::VoiceManual,
            CaptureMode::Wake => UtteranceSource::Wake,
            CaptureMode::Followup => UtteranceSource::VoiceFollowup,
            CaptureMode::SecondChance => UtteranceSource::VoiceSecondChance,
        }
    }
}

/// One user input. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    text: String,
    source: UtteranceSource,
    timestamp: DateTime<Utc>,
}

impl Utterance {
    pub fn new(text: impl Into<String>, source: UtteranceSource) -> Self {
        Self {
            text: text.into(),
            source,
            timestamp: Utc::now(),
        }
    }

    pub fn typed(text: impl Into<String>) -> Self {
        Self::new(text, UtteranceSource::Typed)
    }

    pub fn voice(text: impl Into<String>, mode: CaptureMode) -> Self {
        Self::new(text, mode.into())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> UtteranceSource {
        self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Why a turn produced no reply without consulting a skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    Empty,
    Ack,
    ShortNonQuestion,
    /// The skill ran but is configured as side-effect only
    Suppressed,
}

/// Metadata attached to every turn, kept even when the reply is gated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub source: UtteranceSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<CaptureMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    pub tool_called: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gated: Option<GateReason>,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub superseded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl TurnMetadata {
    pub fn for_source(source: UtteranceSource) -> Self {
        Self {
            source,
            mode: source.capture_mode(),
            skill: None,
            tool_called: false,
            gated: None,
            exit: false,
            superseded: false,
            error: None,
            data: Value::Null,
        }
    }
}

/// Handle to a synthesized, playable clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioHandle {
    pub id: String,
    #[serde(skip)]
    pub path: std::path::PathBuf,
    pub url: String,
    pub mime: String,
}

/// Output of one orchestration cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResult {
    pub transcript: String,
    pub reply: Option<String>,
    #[serde(skip)]
    pub audio: Option<AudioHandle>,
    pub metadata: TurnMetadata,
    pub should_followup: bool,
    pub followup_timeout_ms: u64,
    /// Session that produced this turn; playback is skipped once it goes stale
    pub session_id: u64,
}

impl TurnResult {
    /// A turn that ends without a reply and without continuation
    pub fn silent(transcript: impl Into<String>, metadata: TurnMetadata, session_id: u64) -> Self {
        Self {
            transcript: transcript.into(),
            reply: None,
            audio: None,
            metadata,
            should_followup: false,
            followup_timeout_ms: 0,
            session_id,
        }
    }

    pub fn replied(&self) -> bool {
        self.reply.as_deref().is_some_and(|r| !r.trim().is_empty())
    }

    pub fn audio_url(&self) -> Option<&str> {
        self.audio.as_ref().map(|a| a.url.as_str())
    }
}
