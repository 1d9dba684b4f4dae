//! Pure follow-up loop transition function
//!
//! Given the same state, context and event this always produces the same
//! result, with no I/O. The executor in `runtime::followup` runs the effects.

use super::{CaptureMode, Continuation, CoreState, LoopContext, LoopEffect, LoopEvent, LoopState, StopReason};
use thiserror::Error;

/// Result of a loop transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: LoopState,
    pub effects: Vec<LoopEffect>,
}

impl TransitionResult {
    pub fn new(state: LoopState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: LoopEffect) -> Self {
        self.effects.push(effect);
        self
    }

    fn stopped(reason: StopReason) -> Self {
        Self::new(LoopState::Stopped { reason }).with_effect(LoopEffect::Stop(reason))
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Loop already stopped ({0:?})")]
    AlreadyStopped(StopReason),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Initial state for a loop that opens with a capture window
pub fn begin(mode: CaptureMode, timeout_ms: u64) -> TransitionResult {
    TransitionResult::new(LoopState::Listening { mode })
        .with_effect(LoopEffect::capture(mode, timeout_ms))
}

/// Pure transition function
pub fn transition(
    state: &LoopState,
    context: &LoopContext,
    event: LoopEvent,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        (LoopState::Stopped { reason }, _) => Err(TransitionError::AlreadyStopped(*reason)),

        // A stale session stops silently: no state broadcast, no messages
        (_, LoopEvent::Superseded) => Ok(TransitionResult::stopped(StopReason::Superseded)),

        // ============================================================
        // Capture outcomes
        // ============================================================
        (LoopState::Listening { mode }, LoopEvent::Heard { utterance }) => {
            Ok(TransitionResult::new(LoopState::Thinking { mode: *mode })
                .with_effect(LoopEffect::Orchestrate { utterance }))
        }

        // First silent follow-up earns exactly one second chance
        (LoopState::Listening { mode: CaptureMode::Followup }, LoopEvent::NoSpeech) => {
            let mode = CaptureMode::SecondChance;
            Ok(TransitionResult::new(LoopState::Listening { mode })
                .with_effect(LoopEffect::capture(mode, context.second_chance_timeout_ms)))
        }

        (LoopState::Listening { .. }, LoopEvent::NoSpeech) => Ok(TransitionResult::new(
            LoopState::Stopped {
                reason: StopReason::NoSpeech,
            },
        )
        .with_effect(LoopEffect::SetState(CoreState::Idle))
        .with_effect(LoopEffect::Stop(StopReason::NoSpeech))),

        (LoopState::Listening { .. }, LoopEvent::CaptureFailed { .. }) => {
            Ok(TransitionResult::new(LoopState::Stopped {
                reason: StopReason::CaptureFailed,
            })
            .with_effect(LoopEffect::SetState(CoreState::Idle))
            .with_effect(LoopEffect::Stop(StopReason::CaptureFailed)))
        }

        // Capture never started; state stays whatever playback set
        (LoopState::Listening { .. }, LoopEvent::PlaybackBusy) => {
            Ok(TransitionResult::stopped(StopReason::PlaybackConflict))
        }

        // ============================================================
        // Turn outcomes
        // ============================================================
        (
            LoopState::Thinking { mode },
            LoopEvent::TurnComplete {
                replied,
                has_audio,
                should_followup,
                followup_timeout_ms,
            },
        ) => {
            let next = continuation(*mode, replied, should_followup, followup_timeout_ms, context);
            if has_audio {
                Ok(TransitionResult::new(LoopState::Speaking { next }).with_effect(LoopEffect::Play))
            } else {
                Ok(proceed(next))
            }
        }

        (LoopState::Speaking { next }, LoopEvent::PlaybackFinished) => Ok(proceed(*next)),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} while {state:?}"
        ))),
    }
}

/// Decide which capture window, if any, follows a completed turn.
///
/// A turn without a reply may only continue from a first follow-up (it becomes
/// the second chance); once the second chance is spent nothing continues.
fn continuation(
    mode: CaptureMode,
    replied: bool,
    should_followup: bool,
    followup_timeout_ms: u64,
    context: &LoopContext,
) -> Option<Continuation> {
    if !should_followup {
        return None;
    }

    let (next_mode, fallback) = if replied {
        (CaptureMode::Followup, context.followup_timeout_ms)
    } else if mode == CaptureMode::Followup {
        (CaptureMode::SecondChance, context.second_chance_timeout_ms)
    } else {
        return None;
    };

    let timeout_ms = if followup_timeout_ms > 0 {
        followup_timeout_ms
    } else {
        fallback
    };

    Some(Continuation {
        mode: next_mode,
        timeout_ms,
    })
}

fn proceed(next: Option<Continuation>) -> TransitionResult {
    match next {
        Some(Continuation { mode, timeout_ms }) => {
            TransitionResult::new(LoopState::Listening { mode })
                .with_effect(LoopEffect::capture(mode, timeout_ms))
        }
        None => TransitionResult::stopped(StopReason::Completed),
    }
}
