//! Speech providers and local audio devices
//!
//! Production implementations of the capture, transcription, synthesis and
//! playback traits. Everything here degrades: a missing key or binary makes a
//! provider unavailable, never fatal.

mod console;
mod elevenlabs;
mod error;
mod openai;
mod player;
mod recorder;
mod store;

pub use console::{ConsoleInput, ConsoleSource, SPEAK_PROMPT};
pub use elevenlabs::ElevenLabsSpeech;
pub use error::{SpeechError, SpeechErrorKind};
pub use openai::{OpenAiSpeech, OpenAiTranscriber, DEFAULT_BASE_URL};
pub use player::{CommandPlayer, SilentPlayer};
pub use recorder::{CommandRecorder, DEFAULT_RECORDER};
pub use store::AudioStore;

use crate::runtime::Synthesizer;
use crate::turn::AudioHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Provider selection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    OpenAi,
    ElevenLabs,
}

impl TtsProvider {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Some(TtsProvider::OpenAi),
            "elevenlabs" | "eleven" => Some(TtsProvider::ElevenLabs),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TtsProvider::OpenAi => "OpenAI",
            TtsProvider::ElevenLabs => "ElevenLabs",
        }
    }
}

/// Routes synthesis to whichever provider is active; switchable at runtime
pub struct VoiceSelector {
    openai: Option<Arc<dyn Synthesizer>>,
    elevenlabs: Option<Arc<dyn Synthesizer>>,
    active: Mutex<TtsProvider>,
}

impl VoiceSelector {
    pub fn new(
        openai: Option<Arc<dyn Synthesizer>>,
        elevenlabs: Option<Arc<dyn Synthesizer>>,
        preferred: TtsProvider,
    ) -> Self {
        let selector = Self {
            openai,
            elevenlabs,
            active: Mutex::new(preferred),
        };
        if !selector.is_available(preferred) {
            let fallback = match preferred {
                TtsProvider::OpenAi => TtsProvider::ElevenLabs,
                TtsProvider::ElevenLabs => TtsProvider::OpenAi,
            };
            if selector.is_available(fallback) {
                *selector.active.lock().unwrap() = fallback;
            }
        }
        selector
    }

    fn provider(&self, provider: TtsProvider) -> Option<&Arc<dyn Synthesizer>> {
        match provider {
            TtsProvider::OpenAi => self.openai.as_ref(),
            TtsProvider::ElevenLabs => self.elevenlabs.as_ref(),
        }
    }

    pub fn is_available(&self, provider: TtsProvider) -> bool {
        self.provider(provider).is_some()
    }

    pub fn active(&self) -> TtsProvider {
        *self.active.lock().unwrap()
    }

    /// Returns false (and keeps the current voice) if `provider` is not configured
    pub fn switch_to(&self, provider: TtsProvider) -> bool {
        if !self.is_available(provider) {
            return false;
        }
        *self.active.lock().unwrap() = provider;
        tracing::info!(provider = provider.label(), "Voice switched");
        true
    }
}

#[async_trait]
impl Synthesizer for VoiceSelector {
    async fn synthesize(&self, text: &str, cancel: CancellationToken) -> Result<AudioHandle, SpeechError> {
        let active = self.active();
        let Some(synth) = self.provider(active) else {
            return Err(SpeechError::unavailable("No speech provider configured"));
        };
        synth.synthesize(text, cancel).await
    }
}

// ============================================================================
// Child processes
// ============================================================================

/// Start the child as leader of its own process group
pub(crate) fn own_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            // New group with this process as leader, so kill(-pgid) reaches
            // anything it spawns
            nix::unistd::setpgid(nix::unistd::Pid::from_raw(0), nix::unistd::Pid::from_raw(0))
                .ok();
            Ok(())
        });
    }
    #[cfg(not(unix))]
    let _ = cmd;
}

/// Kill a process group immediately with SIGKILL
#[cfg(unix)]
pub(crate) fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    let Some(pid) = pid else { return };
    let pgid = nix::unistd::Pid::from_raw(pid.cast_signed());
    tracing::debug!(pgid = pid, "Sending SIGKILL to process group");
    let _ = killpg(pgid, Signal::SIGKILL);
}

#[cfg(not(unix))]
pub(crate) fn kill_process_group(_pid: Option<u32>) {}
