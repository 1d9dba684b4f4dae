//! Trait abstractions for the assistant's collaborators
//!
//! Each suspension point of a turn sits behind one of these, so the
//! orchestrator and the follow-up loop can be driven by mocks in tests.

use crate::capture::{CaptureError, CapturedAudio};
use crate::skills::{SkillError, SkillReply};
use crate::state_machine::CaptureMode;
use crate::turn::AudioHandle;
use crate::voice::SpeechError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Microphone (or stand-in) capture
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Record until the speaker stops or `window` runs out
    async fn record(
        &self,
        mode: CaptureMode,
        window: Duration,
        cancel: CancellationToken,
    ) -> Result<CapturedAudio, CaptureError>;
}

/// Speech to text. An empty transcript means nothing was said.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, wav: &[u8], cancel: CancellationToken) -> Result<String, SpeechError>;
}

/// Text to a draft reply plus routing metadata
#[async_trait]
pub trait SkillRouter: Send + Sync {
    async fn route(&self, text: &str, cancel: CancellationToken) -> Result<SkillReply, SkillError>;
}

/// Reply text to a playable clip
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, cancel: CancellationToken) -> Result<AudioHandle, SpeechError>;
}

/// Plays a clip to completion or until cancelled
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, audio: &AudioHandle, cancel: CancellationToken) -> Result<(), SpeechError>;
}

/// Everything a turn needs from the outside world
#[derive(Clone)]
pub struct Services {
    pub source: Arc<dyn AudioSource>,
    pub transcriber: Arc<dyn Transcriber>,
    pub router: Arc<dyn SkillRouter>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub player: Arc<dyn AudioPlayer>,
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: AudioSource + ?Sized> AudioSource for Arc<T> {
    async fn record(
        &self,
        mode: CaptureMode,
        window: Duration,
        cancel: CancellationToken,
    ) -> Result<CapturedAudio, CaptureError> {
        (**self).record(mode, window, cancel).await
    }
}

#[async_trait]
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    async fn transcribe(&self, wav: &[u8], cancel: CancellationToken) -> Result<String, SpeechError> {
        (**self).transcribe(wav, cancel).await
    }
}

#[async_trait]
impl<T: SkillRouter + ?Sized> SkillRouter for Arc<T> {
    async fn route(&self, text: &str, cancel: CancellationToken) -> Result<SkillReply, SkillError> {
        (**self).route(text, cancel).await
    }
}

#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(&self, text: &str, cancel: CancellationToken) -> Result<AudioHandle, SpeechError> {
        (**self).synthesize(text, cancel).await
    }
}

#[async_trait]
impl<T: AudioPlayer + ?Sized> AudioPlayer for Arc<T> {
    async fn play(&self, audio: &AudioHandle, cancel: CancellationToken) -> Result<(), SpeechError> {
        (**self).play(audio, cancel).await
    }
}
