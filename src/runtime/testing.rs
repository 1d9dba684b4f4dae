//! Mock implementations for testing
//!
//! These mocks enable integration testing without audio devices or network.
//! Clones share their queues and records, so a test can keep a handle to a
//! mock after handing it to the assistant.

use super::traits::*;
use super::Assistant;
use crate::capture::{CaptureError, CapturedAudio};
use crate::guard::PlaybackLock;
use crate::skills::{SkillError, SkillReply};
use crate::state_machine::{CaptureMode, LoopContext};
use crate::turn::{AudioHandle, TurnResult, Utterance};
use crate::voice::SpeechError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Sleep for `delay` unless cancelled first; true if cancelled
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return cancel.is_cancelled();
    }
    tokio::select! {
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(delay) => false,
    }
}

// ============================================================================
// Mock Audio Source
// ============================================================================

/// Audio source that returns queued captures; silence once the queue is empty
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct MockAudioSource {
    captures: Arc<Mutex<VecDeque<Result<CapturedAudio, CaptureError>>>>,
    delay: Arc<Mutex<Duration>>,
    /// Mode of every capture window opened
    modes: Arc<Mutex<Vec<CaptureMode>>>,
}

#[allow(dead_code)]
impl MockAudioSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn queue(&self, capture: Result<CapturedAudio, CaptureError>) {
        self.captures.lock().unwrap().push_back(capture);
    }

    /// Queue typed text as if it had been spoken
    pub fn queue_speech(&self, text: &str) {
        self.queue(Ok(CapturedAudio::Typed(text.to_string())));
    }

    pub fn queue_silence(&self) {
        self.queue(Ok(CapturedAudio::Silence));
    }

    pub fn recorded_modes(&self) -> Vec<CaptureMode> {
        self.modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSource for MockAudioSource {
    async fn record(
        &self,
        mode: CaptureMode,
        _window: Duration,
        cancel: CancellationToken,
    ) -> Result<CapturedAudio, CaptureError> {
        self.modes.lock().unwrap().push(mode);
        let delay = *self.delay.lock().unwrap();
        if pause(delay, &cancel).await {
            return Err(CaptureError::Cancelled);
        }
        self.captures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(CapturedAudio::Silence))
    }
}

// ============================================================================
// Mock Transcriber
// ============================================================================

/// Transcriber that returns queued transcripts; empty once the queue is empty
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct MockTranscriber {
    transcripts: Arc<Mutex<VecDeque<Result<String, SpeechError>>>>,
    delay: Arc<Mutex<Duration>>,
    completed: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub fn queue(&self, transcript: Result<String, SpeechError>) {
        self.transcripts.lock().unwrap().push_back(transcript);
    }

    /// Transcriptions that ran to completion
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _wav: &[u8], cancel: CancellationToken) -> Result<String, SpeechError> {
        let delay = *self.delay.lock().unwrap();
        if pause(delay, &cancel).await {
            return Err(SpeechError::cancelled());
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.transcripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

// ============================================================================
// Mock Skill Router
// ============================================================================

/// Build a routed reply for `skill`
#[allow(dead_code)]
pub fn skill_reply(skill: &str, reply: &str) -> SkillReply {
    SkillReply {
        reply: reply.to_string(),
        skill: skill.to_string(),
        ..SkillReply::default()
    }
}

/// Router that returns queued replies; a plain conversation reply once empty
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct MockSkillRouter {
    replies: Arc<Mutex<VecDeque<Result<SkillReply, SkillError>>>>,
    delay: Arc<Mutex<Duration>>,
    /// Record of all routed texts
    requests: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl MockSkillRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn queue_reply(&self, reply: SkillReply) {
        self.replies.lock().unwrap().push_back(Ok(reply));
    }

    pub fn queue_error(&self, error: SkillError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SkillRouter for MockSkillRouter {
    async fn route(&self, text: &str, cancel: CancellationToken) -> Result<SkillReply, SkillError> {
        self.requests.lock().unwrap().push(text.to_string());
        let delay = *self.delay.lock().unwrap();
        if pause(delay, &cancel).await {
            return Err(SkillError::Cancelled);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(skill_reply("conversation", "Certainly, Sir.")))
    }
}

// ============================================================================
// Mock Synthesizer
// ============================================================================

/// Synthesizer that hands out numbered clip handles without touching disk
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct MockSynthesizer {
    failing: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, _cancel: CancellationToken) -> Result<AudioHandle, SpeechError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SpeechError::unavailable("mock synthesizer offline"));
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(text.to_string());
        let id = format!("mock{}.mp3", requests.len());
        Ok(AudioHandle {
            url: format!("/audio/{id}"),
            path: std::env::temp_dir().join(&id),
            mime: "audio/mpeg".to_string(),
            id,
        })
    }
}

// ============================================================================
// Mock Player
// ============================================================================

/// Player that "plays" for a fixed duration and records what it played
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct MockPlayer {
    duration: Arc<Mutex<Duration>>,
    played: Arc<Mutex<Vec<String>>>,
    started: Arc<Notify>,
}

#[allow(dead_code)]
impl MockPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_duration(&self, duration: Duration) {
        *self.duration.lock().unwrap() = duration;
    }

    /// Ids of every clip whose playback started
    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    /// Resolves when the next playback starts
    pub async fn started(&self) {
        self.started.notified().await;
    }
}

#[async_trait]
impl AudioPlayer for MockPlayer {
    async fn play(&self, audio: &AudioHandle, cancel: CancellationToken) -> Result<(), SpeechError> {
        self.played.lock().unwrap().push(audio.id.clone());
        self.started.notify_one();
        let duration = *self.duration.lock().unwrap();
        if pause(duration, &cancel).await {
            return Err(SpeechError::cancelled());
        }
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// An assistant wired to mocks, with handles to every mock
#[allow(dead_code)]
pub struct TestHarness {
    pub source: MockAudioSource,
    pub transcriber: MockTranscriber,
    pub router: MockSkillRouter,
    pub synthesizer: MockSynthesizer,
    pub player: MockPlayer,
    pub lock: PlaybackLock,
    pub assistant: Arc<Assistant>,
}

#[allow(dead_code)]
impl TestHarness {
    pub fn new() -> Self {
        Self::with_context(LoopContext::default())
    }

    pub fn with_context(context: LoopContext) -> Self {
        let source = MockAudioSource::new();
        let transcriber = MockTranscriber::new();
        let router = MockSkillRouter::new();
        let synthesizer = MockSynthesizer::new();
        let player = MockPlayer::new();
        let services = Services {
            source: Arc::new(source.clone()),
            transcriber: Arc::new(transcriber.clone()),
            router: Arc::new(router.clone()),
            synthesizer: Arc::new(synthesizer.clone()),
            player: Arc::new(player.clone()),
        };
        let assistant = Arc::new(Assistant::new(services, context));
        Self {
            lock: assistant.lock().clone(),
            source,
            transcriber,
            router,
            synthesizer,
            player,
            assistant,
        }
    }

    /// Run one turn for `utterance` in a fresh session
    pub async fn orchestrate(&self, utterance: Utterance) -> TurnResult {
        self.assistant.submit(utterance).await
    }
}
