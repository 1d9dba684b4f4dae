//! Capture gateway
//!
//! Turns a capture window into an `Utterance`: claims the audio device,
//! records, transcribes, and classifies the outcome. "Nothing was said" and
//! "the device failed" are kept apart because only the former may be retried
//! by the follow-up loop.

use crate::guard::{GuardError, PlaybackLock};
use crate::runtime::{AudioSource, Transcriber};
use crate::state_machine::CaptureMode;
use crate::turn::Utterance;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Slack given to a recorder to stop itself and flush after its window
pub const CAPTURE_GRACE: Duration = Duration::from_millis(500);

/// Raw output of an audio source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedAudio {
    /// WAV bytes to hand to the transcriber
    Wav(Vec<u8>),
    /// Already text (console stand-in for a microphone)
    Typed(String),
    /// The window closed without any speech
    Silence,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No speech detected")]
    NoSpeech,
    #[error("Playback in progress")]
    PlaybackInProgress,
    #[error("Audio device busy")]
    Busy,
    #[error("Capture failed: {0}")]
    Failed(String),
    #[error("Capture cancelled")]
    Cancelled,
}

impl CaptureError {
    /// Only an empty capture can be retried within the same loop
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CaptureError::NoSpeech)
    }
}

impl From<GuardError> for CaptureError {
    fn from(e: GuardError) -> Self {
        match e {
            GuardError::PlaybackInProgress => CaptureError::PlaybackInProgress,
            GuardError::Busy => CaptureError::Busy,
            GuardError::Cancelled => CaptureError::Cancelled,
        }
    }
}

/// Single entry point for every voice capture, CLI or web
#[derive(Clone)]
pub struct CaptureGateway {
    source: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    lock: PlaybackLock,
}

impl CaptureGateway {
    pub fn new(
        source: Arc<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        lock: PlaybackLock,
    ) -> Self {
        Self {
            source,
            transcriber,
            lock,
        }
    }

    /// Open a capture window and return what was said.
    ///
    /// `on_open` runs once the device is held, before recording starts; the
    /// caller uses it to broadcast `listening`. A window that elapses is
    /// reported as `NoSpeech`.
    pub async fn listen(
        &self,
        mode: CaptureMode,
        window: Duration,
        cancel: &CancellationToken,
        on_open: impl FnOnce() + Send,
    ) -> Result<Utterance, CaptureError> {
        if cancel.is_cancelled() {
            return Err(CaptureError::Cancelled);
        }

        let guard = self.lock.acquire_capture(cancel).await?;
        on_open();
        tracing::debug!(%mode, ?window, "Capture window open");

        let recording = self.source.record(mode, window, cancel.child_token());
        let captured = tokio::select! {
            () = cancel.cancelled() => return Err(CaptureError::Cancelled),
            outcome = tokio::time::timeout(window + CAPTURE_GRACE, recording) => match outcome {
                Ok(captured) => captured?,
                Err(_) => {
                    tracing::debug!(%mode, "Capture window elapsed");
                    return Err(CaptureError::NoSpeech);
                }
            },
        };
        drop(guard);

        let text = match captured {
            CapturedAudio::Silence => return Err(CaptureError::NoSpeech),
            CapturedAudio::Typed(text) => text,
            CapturedAudio::Wav(wav) => self.transcribe(&wav, cancel).await?,
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(CaptureError::NoSpeech);
        }
        Ok(Utterance::voice(text, mode))
    }

    /// Transcription failures degrade to "nothing heard"; only a superseding
    /// session surfaces as an error.
    async fn transcribe(&self, wav: &[u8], cancel: &CancellationToken) -> Result<String, CaptureError> {
        let result = tokio::select! {
            () = cancel.cancelled() => return Err(CaptureError::Cancelled),
            result = self.transcriber.transcribe(wav, cancel.child_token()) => result,
        };
        match result {
            Ok(text) => Ok(text),
            Err(e) if e.is_cancelled() => Err(CaptureError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind, "Transcription unavailable");
                Ok(String::new())
            }
        }
    }
}

/// Text trigger that opens a wake-mode capture
#[derive(Debug, Clone)]
pub struct WakeWord {
    phrase: String,
}

impl WakeWord {
    pub fn new(phrase: &str) -> Self {
        Self {
            phrase: crate::policy::normalize_text(phrase),
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn matches(&self, line: &str) -> bool {
        !self.phrase.is_empty() && crate::policy::normalize_text(line) == self.phrase
    }
}
