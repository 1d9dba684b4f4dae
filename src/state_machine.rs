//! Assistant state and the follow-up loop state machine
//!
//! `CoreState` is the process-visible state broadcast to observers. The
//! follow-up loop is modelled the Elm way: a pure `transition` from
//! `(LoopState, LoopEvent)` to a new state plus `LoopEffect`s, executed by
//! `runtime::followup`.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::LoopEffect;
pub use event::LoopEvent;
pub use state::{CaptureMode, Continuation, CoreState, LoopContext, LoopState, StopReason};
pub use transition::{begin, transition, TransitionError, TransitionResult};
