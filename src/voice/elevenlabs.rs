//! ElevenLabs text-to-speech

use super::openai::{cancellable, error_from_response, http_client};
use super::{AudioStore, SpeechError};
use crate::runtime::Synthesizer;
use crate::turn::AudioHandle;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

const BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
const MODEL_ID: &str = "eleven_monolingual_v1";

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

pub struct ElevenLabsSpeech {
    client: Client,
    api_key: String,
    voice_id: String,
    store: AudioStore,
}

impl ElevenLabsSpeech {
    pub fn new(api_key: Option<String>, voice_id: Option<String>, store: AudioStore) -> Option<Self> {
        Some(Self {
            client: http_client(),
            api_key: api_key?,
            voice_id: voice_id.unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            store,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let body = SpeechRequest {
            text,
            model_id: MODEL_ID,
            voice_settings: VoiceSettings {
                stability: 0.4,
                similarity_boost: 0.75,
            },
        };
        let response = self
            .client
            .post(format!("{BASE_URL}/text-to-speech/{}", self.voice_id))
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::from_request(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::network(format!("Failed to read audio: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSpeech {
    async fn synthesize(&self, text: &str, cancel: CancellationToken) -> Result<AudioHandle, SpeechError> {
        let audio = cancellable(&cancel, self.request(text)).await?;
        self.store.save(&audio, "mp3").await
    }
}
