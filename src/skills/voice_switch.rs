//! Switch the speaking voice between providers

use super::{Skill, SkillError, SkillOutput};
use crate::voice::{TtsProvider, VoiceSelector};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct VoiceSkill {
    voices: Arc<VoiceSelector>,
}

impl VoiceSkill {
    pub fn new(voices: Arc<VoiceSelector>) -> Self {
        Self { voices }
    }

    /// Lower-case, trailing punctuation stripped
    fn command(text: &str) -> String {
        text.trim()
            .to_lowercase()
            .trim_end_matches(['.', ',', '?', '!'])
            .to_string()
    }

    fn target(&self, command: &str) -> TtsProvider {
        if command.contains("eleven") {
            TtsProvider::ElevenLabs
        } else if command.contains("openai") {
            TtsProvider::OpenAi
        } else {
            // Bare "voice" toggles
            match self.voices.active() {
                TtsProvider::OpenAi => TtsProvider::ElevenLabs,
                TtsProvider::ElevenLabs => TtsProvider::OpenAi,
            }
        }
    }
}

#[async_trait]
impl Skill for VoiceSkill {
    fn name(&self) -> &str {
        "voice"
    }

    fn matches(&self, lowered: &str) -> bool {
        let command = Self::command(lowered);
        command == "voice"
            || command.starts_with("voice ")
            || command.contains("switch voice")
            || command.contains("change voice")
            || (command.contains("switch to") && command.contains("voice"))
    }

    async fn handle(&self, text: &str, _cancel: CancellationToken) -> Result<SkillOutput, SkillError> {
        let target = self.target(&Self::command(text));
        let reply = match (self.voices.switch_to(target), target) {
            (true, TtsProvider::ElevenLabs) => "Switching to your ElevenLabs voice, Sir.",
            (true, TtsProvider::OpenAi) => "Reverting to the OpenAI voice, Sir.",
            (false, TtsProvider::ElevenLabs) => "ElevenLabs voice is unavailable, Sir.",
            (false, TtsProvider::OpenAi) => "OpenAI voice is unavailable, Sir.",
        };
        Ok(SkillOutput::reply(reply)
            .with_tool_called()
            .with_data(json!({ "provider": self.voices.active() })))
    }
}
