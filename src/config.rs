//! Runtime configuration from environment variables
//!
//! Read once at startup. Missing keys and binaries only degrade the
//! assistant (text-only replies, typed "speech"); nothing here is fatal
//! except an unusable audio directory.

use crate::policy;
use crate::runtime::{AudioPlayer, AudioSource, Services, Synthesizer};
use crate::skills::{ClockSkill, ConversationSkill, KeywordRouter, SkillPolicies, VoiceSkill};
use crate::state_machine::LoopContext;
use crate::voice::{
    AudioStore, CommandPlayer, CommandRecorder, ElevenLabsSpeech, OpenAiSpeech,
    OpenAiTranscriber, SilentPlayer, TtsProvider, VoiceSelector, DEFAULT_BASE_URL,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: Option<String>,
    pub tts_provider: TtsProvider,
    pub wakeword: String,
    pub audio_dir: PathBuf,
    /// Recorder command template; `None` means typed input stands in
    pub recorder: Option<String>,
    /// Preferred player binary
    pub player: Option<String>,
    pub skills_file: Option<PathBuf>,
    pub context: LoopContext,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            openai_api_key: None,
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            elevenlabs_api_key: None,
            elevenlabs_voice_id: None,
            tts_provider: TtsProvider::OpenAi,
            wakeword: "wake".to_string(),
            audio_dir: std::env::temp_dir().join("rico-audio"),
            recorder: None,
            player: None,
            skills_file: None,
            context: LoopContext::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str, default: u64| {
            get(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(default)
        };
        let defaults = Self::default();

        Self {
            host: get("RICO_HOST").unwrap_or(defaults.host),
            port: get("RICO_PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            elevenlabs_api_key: get("ELEVENLABS_API_KEY"),
            elevenlabs_voice_id: get("ELEVENLABS_VOICE_ID"),
            tts_provider: get("RICO_TTS_PROVIDER")
                .and_then(|p| TtsProvider::parse(&p))
                .unwrap_or(defaults.tts_provider),
            wakeword: get("RICO_WAKEWORD").unwrap_or(defaults.wakeword),
            audio_dir: get("RICO_AUDIO_DIR").map_or(defaults.audio_dir, PathBuf::from),
            recorder: get("RICO_RECORDER"),
            player: get("RICO_PLAYER"),
            skills_file: get("RICO_SKILLS_FILE").map(PathBuf::from),
            context: LoopContext {
                manual_timeout_ms: millis("RICO_MANUAL_TIMEOUT_MS", policy::DEFAULT_MANUAL_TIMEOUT_MS),
                followup_timeout_ms: millis("RICO_FOLLOWUP_TIMEOUT_MS", policy::FOLLOWUP_TIMEOUT_MS),
                second_chance_timeout_ms: millis(
                    "RICO_SECOND_CHANCE_TIMEOUT_MS",
                    policy::SECOND_CHANCE_TIMEOUT_MS,
                ),
            },
        }
    }

    /// Log what is missing. Never fails.
    pub fn validate(&self) {
        if self.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set: transcription, OpenAI voice and conversation are offline");
        }
        if self.tts_provider == TtsProvider::ElevenLabs && self.elevenlabs_api_key.is_none() {
            tracing::warn!("RICO_TTS_PROVIDER=elevenlabs but ELEVENLABS_API_KEY not set");
        }
        if self.recorder.is_none() {
            tracing::info!("RICO_RECORDER not set: voice input falls back to typed text");
        }
    }

    // ========================================================================
    // Wiring
    // ========================================================================

    /// Production collaborators. `source` is the capture device chosen by
    /// the front end; see `recorder_source`.
    pub fn services(&self, source: Arc<dyn AudioSource>) -> std::io::Result<Wiring> {
        let store = AudioStore::new(&self.audio_dir)?;

        let openai = OpenAiSpeech::new(self.openai_api_key.clone(), &self.openai_base_url, store.clone())
            .map(|s| Arc::new(s) as Arc<dyn Synthesizer>);
        let elevenlabs = ElevenLabsSpeech::new(
            self.elevenlabs_api_key.clone(),
            self.elevenlabs_voice_id.clone(),
            store.clone(),
        )
        .map(|s| Arc::new(s) as Arc<dyn Synthesizer>);
        let voices = Arc::new(VoiceSelector::new(openai, elevenlabs, self.tts_provider));

        let router = KeywordRouter::new(Arc::new(ConversationSkill::new(
            self.openai_api_key.clone(),
            &self.openai_base_url,
        )))
        .register(Arc::new(VoiceSkill::new(Arc::clone(&voices))))
        .register(Arc::new(ClockSkill))
        .with_policies(self.skill_policies());

        let player: Arc<dyn AudioPlayer> = match CommandPlayer::detect(self.player.as_deref()) {
            Some(player) => {
                tracing::info!(player = %player.program().display(), "Audio player found");
                Arc::new(player)
            }
            None => {
                tracing::warn!("No audio player found: replies are text only");
                Arc::new(SilentPlayer)
            }
        };

        Ok(Wiring {
            services: Services {
                source,
                transcriber: Arc::new(OpenAiTranscriber::new(
                    self.openai_api_key.clone(),
                    &self.openai_base_url,
                )),
                router: Arc::new(router),
                synthesizer: voices,
                player,
            },
            store,
        })
    }

    /// The configured recorder, if it can run here
    pub fn recorder_source(&self) -> Option<Arc<dyn AudioSource>> {
        let template = self.recorder.as_deref()?;
        let scratch = std::env::temp_dir();
        CommandRecorder::new(template, &scratch).map(|r| Arc::new(r) as Arc<dyn AudioSource>)
    }

    fn skill_policies(&self) -> SkillPolicies {
        let Some(path) = &self.skills_file else {
            return SkillPolicies::default();
        };
        match SkillPolicies::load(path) {
            Ok(policies) => {
                tracing::info!(path = %path.display(), "Skill policies loaded");
                policies
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring skills file");
                SkillPolicies::default()
            }
        }
    }
}

/// Collaborators plus the clip store the web front end serves from
pub struct Wiring {
    pub services: Services,
    pub store: AudioStore,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.wakeword, "wake");
        assert_eq!(config.tts_provider, TtsProvider::OpenAi);
        assert_eq!(config.context, LoopContext::default());
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("RICO_PORT", "9001"),
            ("RICO_TTS_PROVIDER", "ElevenLabs"),
            ("RICO_WAKEWORD", "Hey Rico"),
            ("RICO_FOLLOWUP_TIMEOUT_MS", "8000"),
            ("OPENAI_API_KEY", "sk-test"),
        ]);
        assert_eq!(config.port, 9001);
        assert_eq!(config.tts_provider, TtsProvider::ElevenLabs);
        assert_eq!(config.wakeword, "Hey Rico");
        assert_eq!(config.context.followup_timeout_ms, 8000);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config(&[
            ("RICO_PORT", "not-a-port"),
            ("RICO_SECOND_CHANCE_TIMEOUT_MS", "0"),
            ("RICO_TTS_PROVIDER", "polly"),
            ("OPENAI_API_KEY", "   "),
        ]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.context.second_chance_timeout_ms, policy::SECOND_CHANCE_TIMEOUT_MS);
        assert_eq!(config.tts_provider, TtsProvider::OpenAi);
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_unreadable_skills_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skills.json");
        std::fs::write(&path, "not json").unwrap();
        let config = Config {
            skills_file: Some(path),
            ..Config::default()
        };
        assert_eq!(config.skill_policies(), SkillPolicies::default());
    }
}
