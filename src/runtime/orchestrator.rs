//! Turn orchestrator
//!
//! One utterance in, one `TurnResult` out. Every collaborator failure is
//! absorbed here: the caller always gets a result, at worst a text apology.

use super::{SkillRouter, Synthesizer};
use crate::broadcast::{SessionEmitter, UiEvent};
use crate::guard::PlaybackLock;
use crate::policy;
use crate::skills::{SkillError, SkillReply};
use crate::state_machine::{CaptureMode, CoreState, LoopContext};
use crate::turn::{AudioHandle, GateReason, TurnMetadata, TurnResult, Utterance};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct TurnOrchestrator {
    router: Arc<dyn SkillRouter>,
    synthesizer: Arc<dyn Synthesizer>,
    lock: PlaybackLock,
    context: LoopContext,
}

/// Outcome of a cancellable collaborator call
enum Step<T> {
    Done(T),
    Superseded,
}

impl TurnOrchestrator {
    pub fn new(
        router: Arc<dyn SkillRouter>,
        synthesizer: Arc<dyn Synthesizer>,
        lock: PlaybackLock,
        context: LoopContext,
    ) -> Self {
        Self {
            router,
            synthesizer,
            lock,
            context,
        }
    }

    /// Run one turn for `utterance` within the emitter's session
    pub async fn orchestrate(
        &self,
        utterance: &Utterance,
        emitter: &SessionEmitter,
        cancel: &CancellationToken,
    ) -> TurnResult {
        let source = utterance.source();
        let mut metadata = TurnMetadata::for_source(source);
        let transcript = utterance.text().trim().to_string();
        let session_id = emitter.session_id();

        if policy::normalize_text(&transcript).is_empty() {
            metadata.gated = Some(GateReason::Empty);
            tracing::info!(?source, reason = "empty", "Turn gated");
            emitter.set_state(CoreState::Idle);
            return TurnResult::silent(transcript, metadata, session_id);
        }

        emitter.publish(UiEvent::Transcription {
            text: transcript.clone(),
        });

        if policy::is_exit_phrase(&transcript) {
            tracing::info!(?source, "Exit phrase");
            metadata.exit = true;
            emitter.set_state(CoreState::Thinking);
            let reply = policy::EXIT_REPLY.to_string();
            return self
                .respond(transcript, reply, metadata, None, emitter, cancel)
                .await;
        }

        if let Some(result) = self.gate(&transcript, metadata.clone(), emitter) {
            return result;
        }

        emitter.set_state(CoreState::Thinking);
        let routed = tokio::select! {
            () = cancel.cancelled() => Step::Superseded,
            routed = self.router.route(&transcript, cancel.child_token()) => Step::Done(routed),
        };

        let skill = match routed {
            Step::Superseded | Step::Done(Err(SkillError::Cancelled)) => {
                return Self::superseded(transcript, metadata, session_id);
            }
            Step::Done(Ok(skill)) => skill,
            Step::Done(Err(e)) => {
                tracing::warn!(error = %e, "Skill dispatch failed");
                metadata.error = Some(e.to_string());
                SkillReply {
                    reply: policy::APOLOGY.to_string(),
                    ..SkillReply::default()
                }
            }
        };

        if !skill.skill.is_empty() {
            metadata.skill = Some(skill.skill.clone());
            emitter.publish(UiEvent::Skill {
                skill: skill.skill.clone(),
            });
        }
        metadata.tool_called = skill.tool_called;
        metadata.data = skill.data.clone();
        if skill.tool_called {
            emitter.set_state(CoreState::Tool);
        }

        let mut reply = skill.reply.clone();
        if skill.suppress_output {
            tracing::info!(skill = %skill.skill, "Reply suppressed");
            metadata.gated = Some(GateReason::Suppressed);
            reply.clear();
        }

        self.respond(transcript, reply, metadata, Some(&skill), emitter, cancel)
            .await
    }

    /// Reply gating ahead of any skill. Follow-up windows only answer
    /// questions and greetings; everything else skips acknowledgements.
    fn gate(
        &self,
        transcript: &str,
        mut metadata: TurnMetadata,
        emitter: &SessionEmitter,
    ) -> Option<TurnResult> {
        let source = metadata.source;
        let reason = if source.is_continuation() {
            policy::should_respond_with_reason(transcript).err()?
        } else if policy::is_acknowledgement(transcript) {
            GateReason::Ack
        } else {
            return None;
        };

        tracing::info!(?source, ?reason, transcript, "Turn gated");
        metadata.gated = Some(reason);
        let mut result = TurnResult::silent(transcript, metadata, emitter.session_id());

        // A gated first follow-up spends the one second chance
        if source.capture_mode() == Some(CaptureMode::Followup) && !self.lock.is_held() {
            result.should_followup = true;
            result.followup_timeout_ms = self.context.second_chance_timeout_ms;
        }
        emitter.set_state(CoreState::Idle);
        Some(result)
    }

    /// Synthesize, decide on follow-up, and publish the reply
    async fn respond(
        &self,
        transcript: String,
        reply: String,
        mut metadata: TurnMetadata,
        skill: Option<&SkillReply>,
        emitter: &SessionEmitter,
        cancel: &CancellationToken,
    ) -> TurnResult {
        let session_id = emitter.session_id();
        let mut result = TurnResult::silent(transcript, metadata.clone(), session_id);
        if reply.trim().is_empty() {
            emitter.set_state(CoreState::Idle);
            return result;
        }

        let audio = match self.synthesize(&reply, cancel).await {
            Step::Superseded => {
                metadata.superseded = true;
                result.metadata = metadata;
                return result;
            }
            Step::Done(audio) => audio,
        };

        let expects_reply = skill.is_some_and(|s| s.expects_reply);
        let should_followup = metadata.source.is_voice()
            && expects_reply
            && !metadata.exit
            && !self.lock.is_held();

        result.followup_timeout_ms = if should_followup {
            skill
                .and_then(|s| s.followup_timeout_ms)
                .unwrap_or(self.context.followup_timeout_ms)
        } else {
            0
        };
        result.should_followup = should_followup;
        result.reply = Some(reply);
        result.audio = audio;

        emitter.publish(UiEvent::Reply {
            text: result.reply.clone().unwrap_or_default(),
            audio_url: result.audio_url().map(String::from),
        });
        if result.audio.is_none() {
            emitter.set_state(CoreState::Idle);
        }

        tracing::info!(
            session_id,
            skill = ?result.metadata.skill,
            should_followup,
            has_audio = result.audio.is_some(),
            "Turn complete"
        );
        result
    }

    /// Synthesis failure degrades to a text-only turn
    async fn synthesize(
        &self,
        reply: &str,
        cancel: &CancellationToken,
    ) -> Step<Option<AudioHandle>> {
        let synthesized = tokio::select! {
            () = cancel.cancelled() => return Step::Superseded,
            audio = self.synthesizer.synthesize(reply, cancel.child_token()) => audio,
        };
        match synthesized {
            Ok(audio) => Step::Done(Some(audio)),
            Err(e) if e.is_cancelled() => Step::Superseded,
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind, "Synthesis unavailable; replying with text only");
                Step::Done(None)
            }
        }
    }

    fn superseded(transcript: String, mut metadata: TurnMetadata, session_id: u64) -> TurnResult {
        tracing::debug!(session_id, "Turn superseded");
        metadata.superseded = true;
        TurnResult::silent(transcript, metadata, session_id)
    }
}
