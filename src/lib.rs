//! RICO - a butler-styled voice assistant
//!
//! Turn orchestration shared by the command-line loop and the web front end:
//! one utterance in, one reply out, with a bounded follow-up loop that keeps
//! listening while the assistant expects an answer.

pub mod api;
pub mod broadcast;
pub mod capture;
pub mod cli;
pub mod config;
pub mod guard;
pub mod logging;
pub mod policy;
pub mod runtime;
pub mod session;
pub mod skills;
pub mod state_machine;
pub mod turn;
pub mod voice;
