//! Typed stand-in for the microphone
//!
//! When no recorder is available the CLI still runs voice conversations: each
//! capture window prompts for a typed line instead.

use crate::capture::{CaptureError, CapturedAudio};
use crate::runtime::AudioSource;
use crate::state_machine::CaptureMode;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub const SPEAK_PROMPT: &str = "Speak now (type your request):";

type LineReader = Lines<Box<dyn AsyncBufRead + Unpin + Send>>;

/// Line input shared between the command loop and console capture
#[derive(Clone)]
pub struct ConsoleInput {
    lines: Arc<Mutex<LineReader>>,
}

impl ConsoleInput {
    pub fn new(reader: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        let boxed: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(reader);
        Self {
            lines: Arc::new(Mutex::new(boxed.lines())),
        }
    }

    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()))
    }

    /// Next line, or `None` at end of input. Cancel safe.
    pub async fn next_line(&self) -> std::io::Result<Option<String>> {
        self.lines.lock().await.next_line().await
    }
}

pub struct ConsoleSource {
    input: ConsoleInput,
}

impl ConsoleSource {
    pub fn new(input: ConsoleInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl AudioSource for ConsoleSource {
    async fn record(
        &self,
        mode: CaptureMode,
        _window: Duration,
        cancel: CancellationToken,
    ) -> Result<CapturedAudio, CaptureError> {
        println!("{SPEAK_PROMPT}");
        tracing::debug!(%mode, "Waiting for typed speech");
        let line = tokio::select! {
            () = cancel.cancelled() => return Err(CaptureError::Cancelled),
            line = self.input.next_line() => line,
        };
        match line {
            Ok(Some(text)) if !text.trim().is_empty() => Ok(CapturedAudio::Typed(text)),
            Ok(Some(_)) => Ok(CapturedAudio::Silence),
            Ok(None) => Err(CaptureError::Failed("input closed".into())),
            Err(e) => Err(CaptureError::Failed(e.to_string())),
        }
    }
}
