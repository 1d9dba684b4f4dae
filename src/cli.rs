//! Command-line loop
//!
//! One line at a time from stdin: text is a typed turn, an empty line or
//! `/voice` starts a push-to-talk conversation, the wake phrase starts a
//! wake conversation. UI events are echoed to stdout as they happen. A
//! failing turn never ends the loop; only `/quit`, an exit phrase or end of
//! input does.

use crate::broadcast::UiEvent;
use crate::capture::WakeWord;
use crate::policy;
use crate::runtime::{Assistant, LoopSummary};
use crate::state_machine::{CaptureMode, StopReason};
use crate::voice::ConsoleInput;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;

/// What one input line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    Voice,
    Wake,
    Quit,
}

impl Command {
    pub fn parse(line: &str, wake: &WakeWord) -> Self {
        let trimmed = line.trim();
        match trimmed {
            "" | "/voice" => Command::Voice,
            "/quit" | "/exit" => Command::Quit,
            _ if wake.matches(trimmed) => Command::Wake,
            _ => Command::Chat(trimmed.to_string()),
        }
    }
}

pub struct CommandLoop {
    assistant: Arc<Assistant>,
    input: ConsoleInput,
    wake: WakeWord,
}

impl CommandLoop {
    pub fn new(assistant: Arc<Assistant>, input: ConsoleInput, wake: WakeWord) -> Self {
        Self {
            assistant,
            input,
            wake,
        }
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let stop_echo = CancellationToken::new();
        let echo = tokio::spawn(echo(self.assistant.subscribe(), stop_echo.clone()));

        println!(
            "RICO ready. Type a request, press Enter to talk, say \"{}\" to wake, or /quit.",
            self.wake.phrase()
        );
        let outcome = self.read_commands().await;

        stop_echo.cancel();
        let _ = echo.await;
        outcome
    }

    async fn read_commands(&self) -> std::io::Result<()> {
        while let Some(line) = self.input.next_line().await? {
            let command = Command::parse(&line, &self.wake);
            tracing::debug!(?command, "Command");
            let exit = match command {
                Command::Quit => {
                    println!("RICO: {}", policy::EXIT_REPLY);
                    true
                }
                Command::Chat(text) => {
                    let result = self.assistant.chat(&text).await;
                    self.assistant.speak(&result).await;
                    result.metadata.exit
                }
                Command::Voice => self.converse(CaptureMode::Manual).await,
                Command::Wake => self.converse(CaptureMode::Wake).await,
            };
            if exit {
                return Ok(());
            }
        }
        tracing::info!("Input closed");
        Ok(())
    }

    /// Returns true if the conversation ended with an exit phrase
    async fn converse(&self, mode: CaptureMode) -> bool {
        let summary = self.assistant.converse(mode).await;
        report(&summary);
        summary.exited()
    }
}

fn report(summary: &LoopSummary) {
    match summary.reason {
        StopReason::NoSpeech if summary.turns.is_empty() => {
            println!("RICO: {}", policy::NO_SPEECH_MESSAGE);
        }
        StopReason::CaptureFailed => println!("(microphone unavailable)"),
        StopReason::PlaybackConflict => println!("(still speaking)"),
        _ => {}
    }
}

/// Print UI events until stopped, then flush whatever is already queued
async fn echo(mut rx: broadcast::Receiver<UiEvent>, stop: CancellationToken) {
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            event = rx.recv() => match event {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
    loop {
        match rx.try_recv() {
            Ok(event) => print_event(&event),
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => return,
        }
    }
}

fn print_event(event: &UiEvent) {
    match event {
        UiEvent::StateChange { state } => println!("  [{state}]"),
        UiEvent::Transcription { text } => println!("You: {text}"),
        UiEvent::Reply { text, .. } => println!("RICO: {text}"),
        UiEvent::Skill { skill } => tracing::debug!(%skill, "Skill"),
    }
}
