//! General conversation through an `OpenAI`-compatible chat endpoint

use super::{Skill, SkillError, SkillOutput};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MODEL: &str = "gpt-4.1-mini";
const MAX_TOKENS: u32 = 220;
/// Messages of rolling history (user and assistant turns) sent with each request
const HISTORY_LEN: usize = 8;

const PERSONA: &str = "You are RICO, a British butler-inspired AI companion. \
Address the user as \"Sir\". Be polite, witty and dry, never stiff. \
Keep answers short enough to be spoken aloud, one to three sentences unless detail is requested. \
If the request is ambiguous, ask one brief clarifying question.";

pub const OFFLINE_REPLY: &str =
    "My apologies, Sir. My conversational faculties are offline at the moment.";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct ConversationSkill {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    history: Mutex<VecDeque<ChatMessage>>,
}

impl ConversationSkill {
    pub fn new(api_key: Option<String>, base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LEN)),
        }
    }

    fn build_messages(&self, text: &str) -> Vec<ChatMessage> {
        let history = self.history.lock().unwrap();
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::new("system", PERSONA));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::new("user", text));
        messages
    }

    fn remember(&self, user: &str, assistant: &str) {
        let mut history = self.history.lock().unwrap();
        history.push_back(ChatMessage::new("user", user));
        history.push_back(ChatMessage::new("assistant", assistant));
        while history.len() > HISTORY_LEN {
            history.pop_front();
        }
    }

    async fn complete(&self, api_key: &str, text: &str) -> Result<String, SkillError> {
        let request = ChatRequest {
            model: MODEL,
            messages: self.build_messages(text),
            max_tokens: MAX_TOKENS,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SkillError::Upstream(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SkillError::Upstream(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SkillError::Upstream(format!("Failed to parse response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| SkillError::Upstream("No choices in response".into()))
    }
}

#[async_trait]
impl Skill for ConversationSkill {
    fn name(&self) -> &str {
        "conversation"
    }

    // Fallback only; never claims an utterance by keyword
    fn matches(&self, _lowered: &str) -> bool {
        false
    }

    async fn handle(&self, text: &str, cancel: CancellationToken) -> Result<SkillOutput, SkillError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("Conversation unavailable: OPENAI_API_KEY not set");
            return Ok(SkillOutput::reply(OFFLINE_REPLY));
        };

        let reply = tokio::select! {
            () = cancel.cancelled() => return Err(SkillError::Cancelled),
            reply = self.complete(api_key, text) => reply?,
        };
        self.remember(text, &reply);
        Ok(SkillOutput::reply(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_without_key() {
        let skill = ConversationSkill::new(None, "https://api.openai.com/v1");
        let out = skill
            .handle("how are you", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.reply, OFFLINE_REPLY);
    }

    #[test]
    fn test_history_is_bounded() {
        let skill = ConversationSkill::new(Some("sk-test".into()), "http://localhost/v1/");
        assert_eq!(skill.endpoint, "http://localhost/v1/chat/completions");
        for i in 0..10 {
            skill.remember(&format!("q{i}"), &format!("a{i}"));
        }
        let messages = skill.build_messages("latest");
        assert_eq!(messages.len(), HISTORY_LEN + 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "q6");
        assert_eq!(messages.last().unwrap().content, "latest");
    }
}
