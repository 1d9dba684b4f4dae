//! `OpenAI`-compatible transcription and speech

use super::{AudioStore, SpeechError};
use crate::runtime::{Synthesizer, Transcriber};
use crate::turn::AudioHandle;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const TRANSCRIBE_MODEL: &str = "gpt-4o-mini-transcribe";
const SPEECH_MODEL: &str = "gpt-4o-mini-tts";
const SPEECH_VOICE: &str = "fable";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Turn a non-success response into a classified error
pub(crate) async fn error_from_response(response: reqwest::Response) -> SpeechError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    match status.as_u16() {
        401 | 403 => SpeechError::unavailable(format!("Authentication failed: {message}")),
        500..=599 => SpeechError::network(format!("Server error: {message}")),
        _ => SpeechError::api(format!("HTTP {status}: {message}")),
    }
}

/// Run a request future unless the token fires first
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = Result<T, SpeechError>>,
) -> Result<T, SpeechError> {
    tokio::select! {
        () = cancel.cancelled() => Err(SpeechError::cancelled()),
        result = fut => result,
    }
}

// ============================================================================
// Transcription
// ============================================================================

pub struct OpenAiTranscriber {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

impl OpenAiTranscriber {
    pub fn new(api_key: Option<String>, base_url: &str) -> Self {
        Self {
            client: http_client(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn request(&self, api_key: &str, wav: &[u8]) -> Result<String, SpeechError> {
        let part = Part::bytes(wav.to_vec())
            .file_name("speech.wav")
            .mime_str("audio/wav")
            .map_err(|e| SpeechError::api(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("model", TRANSCRIBE_MODEL);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SpeechError::from_request(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::api(format!("Failed to parse transcription: {e}")))?;
        Ok(parsed.text.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, wav: &[u8], cancel: CancellationToken) -> Result<String, SpeechError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(SpeechError::unavailable("OPENAI_API_KEY not set"));
        };
        let text = cancellable(&cancel, self.request(api_key, wav)).await?;
        tracing::debug!(chars = text.len(), "Transcribed");
        Ok(text)
    }
}

// ============================================================================
// Speech
// ============================================================================

pub struct OpenAiSpeech {
    client: Client,
    api_key: String,
    base_url: String,
    store: AudioStore,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

impl OpenAiSpeech {
    /// `None` without a key, so callers can tell the provider is unavailable
    pub fn new(api_key: Option<String>, base_url: &str, store: AudioStore) -> Option<Self> {
        Some(Self {
            client: http_client(),
            api_key: api_key?,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let body = SpeechRequest {
            model: SPEECH_MODEL,
            voice: SPEECH_VOICE,
            input: text,
            response_format: "mp3",
        };
        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
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
impl Synthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, cancel: CancellationToken) -> Result<AudioHandle, SpeechError> {
        let audio = cancellable(&cancel, self.request(text)).await?;
        self.store.save(&audio, "mp3").await
    }
}
