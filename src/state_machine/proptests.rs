//! Property-based tests for the follow-up loop
//!
//! These drive the pure transition function with arbitrary capture and turn
//! outcomes and check the loop's bounds hold for every sequence.

use super::state::*;
use super::transition::*;
use super::*;
use crate::turn::Utterance;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> LoopContext {
    LoopContext {
        manual_timeout_ms: 20_000,
        followup_timeout_ms: 6_000,
        second_chance_timeout_ms: 3_000,
    }
}

/// Abstract outcome fed to the loop whenever it asks for one
#[derive(Debug, Clone)]
enum Outcome {
    Heard(String),
    NoSpeech,
    Failed,
    Busy,
    Turn {
        replied: bool,
        has_audio: bool,
        should_followup: bool,
        timeout_ms: u64,
    },
    Superseded,
}

/// Map an abstract outcome onto an event that fits the current state, so
/// every generated sequence exercises a legal path through the loop.
fn event_for(state: &LoopState, outcome: &Outcome) -> LoopEvent {
    match (state, outcome) {
        (_, Outcome::Superseded) => LoopEvent::Superseded,
        (LoopState::Listening { mode }, Outcome::Heard(text)) => LoopEvent::Heard {
            utterance: Utterance::voice(text.clone(), *mode),
        },
        (LoopState::Listening { .. }, Outcome::Failed) => LoopEvent::CaptureFailed {
            message: "device unplugged".to_string(),
        },
        (LoopState::Listening { .. }, Outcome::Busy) => LoopEvent::PlaybackBusy,
        (LoopState::Listening { .. }, _) => LoopEvent::NoSpeech,
        (
            LoopState::Thinking { .. },
            Outcome::Turn {
                replied,
                has_audio,
                should_followup,
                timeout_ms,
            },
        ) => LoopEvent::TurnComplete {
            replied: *replied,
            has_audio: *has_audio && *replied,
            should_followup: *should_followup,
            followup_timeout_ms: *timeout_ms,
        },
        (LoopState::Thinking { .. }, _) => LoopEvent::TurnComplete {
            replied: false,
            has_audio: false,
            should_followup: true,
            followup_timeout_ms: 0,
        },
        _ => LoopEvent::PlaybackFinished,
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_start_mode() -> impl Strategy<Value = CaptureMode> {
    prop_oneof![Just(CaptureMode::Manual), Just(CaptureMode::Wake)]
}

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        3 => "[a-z ]{1,20}".prop_map(Outcome::Heard),
        3 => Just(Outcome::NoSpeech),
        1 => Just(Outcome::Failed),
        1 => Just(Outcome::Busy),
        4 => (any::<bool>(), any::<bool>(), any::<bool>(), prop_oneof![Just(0u64), 1_000u64..10_000])
            .prop_map(|(replied, has_audio, should_followup, timeout_ms)| Outcome::Turn {
                replied,
                has_audio,
                should_followup,
                timeout_ms,
            }),
        1 => Just(Outcome::Superseded),
    ]
}

fn arb_outcomes() -> impl Strategy<Value = Vec<Outcome>> {
    prop::collection::vec(arb_outcome(), 1..40)
}

/// Run a loop to completion or until outcomes run out, returning every
/// effect produced along the way together with the final state.
fn run(mode: CaptureMode, outcomes: &[Outcome]) -> (LoopState, Vec<LoopEffect>) {
    let ctx = test_context();
    let start = begin(mode, ctx.timeout_for(mode));
    let mut state = start.new_state;
    let mut effects = start.effects;

    for outcome in outcomes {
        if state.is_stopped() {
            break;
        }
        let event = event_for(&state, outcome);
        let result = transition(&state, &ctx, event).expect("legal event rejected");
        state = result.new_state;
        effects.extend(result.effects);
    }
    (state, effects)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Without an utterance in between, the loop never opens more than two
    /// consecutive capture windows after the first follow-up begins.
    #[test]
    fn prop_relisten_bounded(mode in arb_start_mode(), outcomes in arb_outcomes()) {
        let (_, effects) = run(mode, &outcomes);
        let mut silent_captures = 0;
        for effect in &effects {
            match effect {
                LoopEffect::Capture { mode, .. } => {
                    if mode.is_continuation() {
                        silent_captures += 1;
                        prop_assert!(silent_captures <= 2, "effects: {effects:?}");
                    }
                }
                LoopEffect::Orchestrate { .. } => silent_captures = 0,
                _ => {}
            }
        }
    }

    /// A superseded loop stops without broadcasting any state
    #[test]
    fn prop_superseded_is_silent(
        mode in arb_start_mode(),
        mut outcomes in arb_outcomes(),
        cut in 0usize..40,
    ) {
        let cut = cut.min(outcomes.len());
        outcomes.insert(cut, Outcome::Superseded);

        let ctx = test_context();
        let mut state = begin(mode, ctx.timeout_for(mode)).new_state;
        for outcome in &outcomes {
            if state.is_stopped() {
                break;
            }
            let event = event_for(&state, outcome);
            let superseding = matches!(event, LoopEvent::Superseded);
            let result = transition(&state, &ctx, event).unwrap();
            if superseding {
                prop_assert!(result.effects.iter().all(|e| !matches!(e, LoopEffect::SetState(_))));
                prop_assert_eq!(&result.new_state, &LoopState::Stopped { reason: StopReason::Superseded });
            }
            state = result.new_state;
        }
    }

    /// Stopped is absorbing: every event is rejected and nothing is produced
    #[test]
    fn prop_stopped_is_absorbing(mode in arb_start_mode(), outcomes in arb_outcomes(), extra in arb_outcome()) {
        let (state, _) = run(mode, &outcomes);
        if state.is_stopped() {
            let event = event_for(&state, &extra);
            prop_assert!(matches!(
                transition(&state, &test_context(), event),
                Err(TransitionError::AlreadyStopped(_))
            ));
        }
    }

    /// A second-chance turn that produced no reply never leads to another capture
    #[test]
    fn prop_unanswered_second_chance_ends(
        has_audio in any::<bool>(),
        should_followup in any::<bool>(),
        timeout_ms in 0u64..10_000,
    ) {
        let state = LoopState::Thinking { mode: CaptureMode::SecondChance };
        let event = LoopEvent::TurnComplete {
            replied: false,
            has_audio,
            should_followup,
            followup_timeout_ms: timeout_ms,
        };
        let result = transition(&state, &test_context(), event).unwrap();
        let next = match &result.new_state {
            LoopState::Speaking { next } => *next,
            other => {
                prop_assert!(other.is_stopped());
                None
            }
        };
        prop_assert!(next.is_none());
        let captures = result
            .effects
            .iter()
            .any(|e| matches!(e, LoopEffect::Capture { .. }));
        prop_assert!(!captures, "capture scheduled after the loop ended");
    }

    /// Every capture effect carries a positive window
    #[test]
    fn prop_capture_windows_positive(mode in arb_start_mode(), outcomes in arb_outcomes()) {
        let (_, effects) = run(mode, &outcomes);
        for effect in effects {
            if let LoopEffect::Capture { timeout_ms, .. } = effect {
                prop_assert!(timeout_ms > 0);
            }
        }
    }
}
