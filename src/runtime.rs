//! Assistant runtime
//!
//! `Assistant` is the one object both front ends talk to. It owns the
//! session registry, the state broadcaster and the playback lock, and wires
//! the capture gateway and the turn orchestrator to the same instances, so a
//! web request and a CLI loop can never disagree about who holds the
//! microphone or which session is current.

mod followup;
mod orchestrator;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use followup::LoopSummary;
pub use orchestrator::TurnOrchestrator;
pub use traits::*;

use crate::broadcast::{SessionEmitter, StateBroadcaster, UiEvent};
use crate::capture::{CaptureError, CaptureGateway};
use crate::guard::{AudioGuard, PlaybackLock};
use crate::policy;
use crate::session::{SessionRegistry, SessionToken};
use crate::state_machine::{CaptureMode, CoreState, LoopContext};
use crate::turn::{AudioHandle, GateReason, TurnMetadata, TurnResult, Utterance, UtteranceSource};
use crate::voice::SpeechError;
use followup::FollowupLoop;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub struct Assistant {
    sessions: Arc<SessionRegistry>,
    states: StateBroadcaster,
    lock: PlaybackLock,
    gateway: CaptureGateway,
    orchestrator: TurnOrchestrator,
    player: Arc<dyn AudioPlayer>,
    context: LoopContext,
}

impl Assistant {
    pub fn new(services: Services, context: LoopContext) -> Self {
        let lock = PlaybackLock::new();
        Self {
            sessions: Arc::new(SessionRegistry::new()),
            states: StateBroadcaster::new(),
            gateway: CaptureGateway::new(services.source, services.transcriber, lock.clone()),
            orchestrator: TurnOrchestrator::new(
                services.router,
                services.synthesizer,
                lock.clone(),
                context,
            ),
            player: services.player,
            lock,
            context,
        }
    }

    pub fn context(&self) -> LoopContext {
        self.context
    }

    pub fn lock(&self) -> &PlaybackLock {
        &self.lock
    }

    pub fn state(&self) -> CoreState {
        self.states.current()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.states.subscribe()
    }

    pub fn current_session(&self) -> u64 {
        self.sessions.current_id()
    }

    fn emitter(&self, session_id: u64) -> SessionEmitter {
        SessionEmitter::new(Arc::clone(&self.sessions), self.states.clone(), session_id)
    }

    /// Cancel whatever is in flight and return to idle
    pub fn interrupt(&self) -> u64 {
        let session_id = self.sessions.interrupt();
        self.states.set_state(CoreState::Idle);
        tracing::info!(session_id, "Interrupted");
        session_id
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Typed input. Starts a new session, superseding any running loop.
    pub async fn chat(&self, text: &str) -> TurnResult {
        self.submit(Utterance::typed(text)).await
    }

    /// Orchestrate an utterance obtained outside the capture gateway
    pub async fn submit(&self, utterance: Utterance) -> TurnResult {
        if policy::normalize_text(utterance.text()).is_empty() {
            let mut metadata = TurnMetadata::for_source(utterance.source());
            metadata.gated = Some(GateReason::Empty);
            return TurnResult::silent(utterance.text().trim(), metadata, self.current_session());
        }
        let session = self.sessions.begin();
        let emitter = self.emitter(session.id);
        self.orchestrator
            .orchestrate(&utterance, &emitter, &session.cancel)
            .await
    }

    /// One capture window followed by one turn, without looping.
    ///
    /// Manual and wake captures start a new session. Continuations run in
    /// `session_id` (or the current session if none is given) and come back
    /// marked superseded once that session is stale. Fails fast while audio
    /// is playing, before any state changes.
    pub async fn voice_turn(
        &self,
        mode: CaptureMode,
        timeout_ms: Option<u64>,
        session_id: Option<u64>,
    ) -> Result<TurnResult, CaptureError> {
        if self.lock.is_playing() {
            return Err(CaptureError::PlaybackInProgress);
        }

        let session = if mode.starts_session() {
            self.sessions.begin()
        } else {
            let current = match session_id {
                Some(id) => self.sessions.token_if_current(id),
                None => Some(self.sessions.current()),
            };
            match current {
                Some(session) => session,
                None => {
                    let stale = session_id.unwrap_or_default();
                    return Ok(Self::superseded(mode, stale));
                }
            }
        };

        let emitter = self.emitter(session.id);
        let timeout_ms = timeout_ms
            .filter(|ms| *ms > 0)
            .unwrap_or_else(|| self.context.timeout_for(mode));

        match self.capture(mode, timeout_ms, &session, &emitter).await {
            Ok(utterance) => Ok(self
                .orchestrator
                .orchestrate(&utterance, &emitter, &session.cancel)
                .await),
            Err(CaptureError::Cancelled) => Ok(Self::superseded(mode, session.id)),
            Err(e) => {
                if matches!(e, CaptureError::NoSpeech | CaptureError::Failed(_)) {
                    emitter.set_state(CoreState::Idle);
                }
                Err(e)
            }
        }
    }

    /// Run a full conversation: capture, reply, and keep listening for as
    /// long as replies ask for an answer.
    pub async fn converse(&self, mode: CaptureMode) -> LoopSummary {
        let session = if mode.starts_session() {
            self.sessions.begin()
        } else {
            self.sessions.current()
        };
        tracing::info!(session_id = session.id, %mode, "Conversation started");
        FollowupLoop::new(self, session, mode).run().await
    }

    async fn capture(
        &self,
        mode: CaptureMode,
        timeout_ms: u64,
        session: &SessionToken,
        emitter: &SessionEmitter,
    ) -> Result<Utterance, CaptureError> {
        let window = Duration::from_millis(timeout_ms);
        self.gateway
            .listen(mode, window, &session.cancel, || {
                emitter.set_state(CoreState::Listening);
            })
            .await
    }

    fn superseded(mode: CaptureMode, session_id: u64) -> TurnResult {
        let mut metadata = TurnMetadata::for_source(UtteranceSource::from(mode));
        metadata.superseded = true;
        TurnResult::silent("", metadata, session_id)
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Claim the audio device for a turn's reply and enter `speaking`.
    ///
    /// Returns `None` if the turn has no audio, its session is stale, or the
    /// device could not be claimed; in the last case state returns to idle.
    pub async fn start_playback(&self, result: &TurnResult) -> Option<Playback> {
        let audio = result.audio.clone()?;
        let session = self.sessions.token_if_current(result.session_id)?;
        let emitter = self.emitter(session.id);

        let guard = match self.lock.acquire_playback(&session.cancel).await {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(error = %e, clip = %audio.id, "Playback skipped");
                emitter.set_state(CoreState::Idle);
                return None;
            }
        };
        if !emitter.set_state(CoreState::Speaking) {
            return None;
        }
        Some(Playback {
            audio,
            guard,
            emitter,
            cancel: session.cancel,
            player: Arc::clone(&self.player),
        })
    }

    /// Play a turn's reply to completion. Returns false if nothing played.
    pub async fn speak(&self, result: &TurnResult) -> bool {
        match self.start_playback(result).await {
            Some(playback) => playback.run().await.is_ok(),
            None => false,
        }
    }
}

/// A claimed playback, ready to run. Holds the audio device until dropped.
pub struct Playback {
    audio: AudioHandle,
    guard: AudioGuard,
    emitter: SessionEmitter,
    cancel: CancellationToken,
    player: Arc<dyn AudioPlayer>,
}

impl Playback {
    pub async fn run(self) -> Result<(), SpeechError> {
        let Playback {
            audio,
            guard,
            emitter,
            cancel,
            player,
        } = self;

        let outcome = player.play(&audio, cancel.child_token()).await;
        drop(guard);
        emitter.set_state(CoreState::Idle);

        match &outcome {
            Ok(()) => tracing::debug!(clip = %audio.id, "Playback finished"),
            Err(e) if e.is_cancelled() => tracing::debug!(clip = %audio.id, "Playback interrupted"),
            Err(e) => tracing::warn!(clip = %audio.id, error = %e, "Playback failed"),
        }
        outcome
    }
}
