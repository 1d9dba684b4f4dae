//! Follow-up loop executor
//!
//! Drives the pure loop state machine: runs each effect against the
//! assistant's collaborators and feeds the outcome back as an event. The
//! session is checked before every effect, so a superseded loop stops
//! without touching the broadcaster again.

use super::Assistant;
use crate::broadcast::SessionEmitter;
use crate::capture::CaptureError;
use crate::session::SessionToken;
use crate::state_machine::{
    begin, transition, CaptureMode, LoopEffect, LoopEvent, LoopState, StopReason,
};
use crate::turn::TurnResult;
use std::collections::VecDeque;

/// What a finished loop did
#[derive(Debug, Clone)]
pub struct LoopSummary {
    pub session_id: u64,
    pub reason: StopReason,
    /// Every completed turn, in order
    pub turns: Vec<TurnResult>,
    /// Capture windows opened, including the first
    pub captures: usize,
}

impl LoopSummary {
    /// The user asked the assistant to stop listening
    pub fn exited(&self) -> bool {
        self.turns.iter().any(|t| t.metadata.exit)
    }

    pub fn last_turn(&self) -> Option<&TurnResult> {
        self.turns.last()
    }
}

pub(super) struct FollowupLoop<'a> {
    assistant: &'a Assistant,
    session: SessionToken,
    emitter: SessionEmitter,
    state: LoopState,
    pending: VecDeque<LoopEffect>,
    turns: Vec<TurnResult>,
    captures: usize,
}

impl<'a> FollowupLoop<'a> {
    pub(super) fn new(assistant: &'a Assistant, session: SessionToken, mode: CaptureMode) -> Self {
        let start = begin(mode, assistant.context.timeout_for(mode));
        Self {
            emitter: assistant.emitter(session.id),
            assistant,
            session,
            state: start.new_state,
            pending: start.effects.into(),
            turns: Vec::new(),
            captures: 0,
        }
    }

    pub(super) async fn run(mut self) -> LoopSummary {
        let context = self.assistant.context;
        while let Some(effect) = self.pending.pop_front() {
            if let LoopEffect::Stop(reason) = effect {
                return self.finish(reason);
            }

            let event = if self.emitter.is_current() {
                self.execute_effect(effect).await
            } else {
                Some(LoopEvent::Superseded)
            };
            let Some(event) = event else { continue };

            match transition(&self.state, &context, event) {
                Ok(result) => {
                    self.state = result.new_state;
                    self.pending.extend(result.effects);
                }
                Err(e) => {
                    tracing::warn!(error = %e, state = ?self.state, "Follow-up loop aborted");
                    return self.finish(StopReason::Completed);
                }
            }
        }

        let reason = match self.state {
            LoopState::Stopped { reason } => reason,
            _ => StopReason::Completed,
        };
        self.finish(reason)
    }

    async fn execute_effect(&mut self, effect: LoopEffect) -> Option<LoopEvent> {
        match effect {
            LoopEffect::SetState(state) => {
                self.emitter.set_state(state);
                None
            }

            LoopEffect::Capture { mode, timeout_ms } => {
                self.captures += 1;
                let heard = self
                    .assistant
                    .capture(mode, timeout_ms, &self.session, &self.emitter)
                    .await;
                Some(match heard {
                    Ok(utterance) => LoopEvent::Heard { utterance },
                    Err(e) => capture_event(e),
                })
            }

            LoopEffect::Orchestrate { utterance } => {
                let result = self
                    .assistant
                    .orchestrator
                    .orchestrate(&utterance, &self.emitter, &self.session.cancel)
                    .await;
                if result.metadata.superseded {
                    return Some(LoopEvent::Superseded);
                }
                let event = LoopEvent::turn_complete(&result);
                self.turns.push(result);
                Some(event)
            }

            LoopEffect::Play => {
                if let Some(turn) = self.turns.last() {
                    if let Some(playback) = self.assistant.start_playback(turn).await {
                        // Failures are logged by the playback itself
                        let _ = playback.run().await;
                    }
                }
                if self.emitter.is_current() {
                    Some(LoopEvent::PlaybackFinished)
                } else {
                    Some(LoopEvent::Superseded)
                }
            }

            LoopEffect::Stop(_) => None,
        }
    }

    fn finish(self, reason: StopReason) -> LoopSummary {
        tracing::info!(
            session_id = self.session.id,
            ?reason,
            turns = self.turns.len(),
            captures = self.captures,
            "Follow-up loop stopped"
        );
        LoopSummary {
            session_id: self.session.id,
            reason,
            turns: self.turns,
            captures: self.captures,
        }
    }
}

/// Only `NoSpeech` may be retried; everything else ends the loop
fn capture_event(error: CaptureError) -> LoopEvent {
    match error {
        CaptureError::NoSpeech => LoopEvent::NoSpeech,
        CaptureError::Cancelled => LoopEvent::Superseded,
        CaptureError::PlaybackInProgress | CaptureError::Busy => LoopEvent::PlaybackBusy,
        CaptureError::Failed(message) => LoopEvent::CaptureFailed { message },
    }
}
