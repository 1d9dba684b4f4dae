//! Skills and keyword routing
//!
//! A skill turns an utterance into a draft reply. The `KeywordRouter` picks
//! the first registered skill whose keywords match, falling back to
//! conversation, then applies that skill's `SkillPolicy` to decide whether
//! the reply expects an answer and whether it should be spoken at all.
//!
//! A vague follow-up ("and tomorrow?") that no keyword claims goes back to
//! the skill that answered last, for up to `CARRY_OVER_TTL`.

mod clock;
mod conversation;
mod voice_switch;

pub use clock::ClockSkill;
pub use conversation::ConversationSkill;
pub use voice_switch::VoiceSkill;

use crate::policy;
use crate::runtime::SkillRouter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long the last answering skill keeps vague follow-ups
pub const CARRY_OVER_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("Skill failed: {0}")]
    Failed(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Skill cancelled")]
    Cancelled,
}

/// What a skill hands back
#[derive(Debug, Clone, Default)]
pub struct SkillOutput {
    pub reply: String,
    /// The skill acted on the world (switched a voice, toggled a device)
    pub tool_called: bool,
    /// Skill's own suggestion for the next capture window
    pub followup_timeout_ms: Option<u64>,
    pub data: Value,
}

impl SkillOutput {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tool_called(mut self) -> Self {
        self.tool_called = true;
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Routed reply as seen by the orchestrator, with policy applied
#[derive(Debug, Clone, Default)]
pub struct SkillReply {
    pub reply: String,
    pub skill: String,
    pub tool_called: bool,
    /// The reply asks the user something and a follow-up window should open
    pub expects_reply: bool,
    /// Side-effect-only skill: keep metadata, say nothing
    pub suppress_output: bool,
    pub followup_timeout_ms: Option<u64>,
    pub data: Value,
}

#[async_trait]
pub trait Skill: Send + Sync {
    fn name(&self) -> &str;

    /// Lower-case phrases that route to this skill
    fn keywords(&self) -> &[&str] {
        &[]
    }

    /// Whether this skill should handle `lowered` (already lower-cased)
    fn matches(&self, lowered: &str) -> bool {
        self.keywords().iter().any(|k| lowered.contains(k))
    }

    async fn handle(&self, text: &str, cancel: CancellationToken) -> Result<SkillOutput, SkillError>;
}

// ============================================================================
// Policy
// ============================================================================

/// When a skill's reply opens a follow-up window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowupPolicy {
    Never,
    Always,
    /// Only when the reply itself is a question
    #[default]
    WhenQuestion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillPolicy {
    pub followup: FollowupPolicy,
    pub followup_timeout_ms: Option<u64>,
    pub suppress_output: bool,
}

impl SkillPolicy {
    pub fn expects_reply(&self, reply: &str) -> bool {
        match self.followup {
            FollowupPolicy::Never => false,
            FollowupPolicy::Always => true,
            FollowupPolicy::WhenQuestion => reply.trim_end().ends_with('?'),
        }
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to read skills file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid skills file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Per-skill policies keyed by skill name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillPolicies {
    policies: HashMap<String, SkillPolicy>,
}

impl Default for SkillPolicies {
    /// Built-in skills that act rather than converse never hold the mic open
    fn default() -> Self {
        let never = SkillPolicy {
            followup: FollowupPolicy::Never,
            ..SkillPolicy::default()
        };
        let mut policies = HashMap::new();
        policies.insert("clock".to_string(), never.clone());
        policies.insert("voice".to_string(), never);
        Self { policies }
    }
}

impl SkillPolicies {
    /// Parse `{"skill": {"followup": "always", ...}}`, layered over the defaults
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let overrides: HashMap<String, SkillPolicy> = serde_json::from_str(json)?;
        let mut policies = Self::default();
        policies.policies.extend(overrides);
        Ok(policies)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, skill: &str) -> SkillPolicy {
        self.policies.get(skill).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn with(mut self, skill: &str, policy: SkillPolicy) -> Self {
        self.policies.insert(skill.to_string(), policy);
        self
    }
}

// ============================================================================
// Router
// ============================================================================

/// The skill that answered most recently
#[derive(Debug, Clone)]
struct LastSkill {
    name: String,
    at: Instant,
}

/// Ordered keyword routing with a fallback skill
pub struct KeywordRouter {
    skills: Vec<Arc<dyn Skill>>,
    fallback: Arc<dyn Skill>,
    policies: SkillPolicies,
    last: Mutex<Option<LastSkill>>,
}

impl KeywordRouter {
    pub fn new(fallback: Arc<dyn Skill>) -> Self {
        Self {
            skills: Vec::new(),
            fallback,
            policies: SkillPolicies::default(),
            last: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn register(mut self, skill: Arc<dyn Skill>) -> Self {
        self.skills.push(skill);
        self
    }

    #[must_use]
    pub fn with_policies(mut self, policies: SkillPolicies) -> Self {
        self.policies = policies;
        self
    }

    fn select(&self, text: &str) -> &Arc<dyn Skill> {
        let lowered = text.to_lowercase();
        if let Some(skill) = self.skills.iter().find(|skill| skill.matches(&lowered)) {
            return skill;
        }
        if policy::is_vague(text) {
            if let Some(skill) = self.carry_over() {
                tracing::debug!(skill = %skill.name(), "Vague follow-up carried over");
                return skill;
            }
        }
        &self.fallback
    }

    /// The last answering skill, while it is still fresh
    fn carry_over(&self) -> Option<&Arc<dyn Skill>> {
        let last = self.last.lock().unwrap().clone()?;
        if last.at.elapsed() > CARRY_OVER_TTL {
            return None;
        }
        self.skills
            .iter()
            .chain(std::iter::once(&self.fallback))
            .find(|skill| skill.name() == last.name)
    }

    fn remember(&self, name: &str) {
        *self.last.lock().unwrap() = Some(LastSkill {
            name: name.to_string(),
            at: Instant::now(),
        });
    }
}

#[async_trait]
impl SkillRouter for KeywordRouter {
    async fn route(&self, text: &str, cancel: CancellationToken) -> Result<SkillReply, SkillError> {
        let skill = self.select(text);
        let name = skill.name().to_string();
        tracing::info!(skill = %name, "Routing utterance");

        let output = skill.handle(text, cancel).await?;
        self.remember(&name);
        let policy = self.policies.get(&name);

        Ok(SkillReply {
            expects_reply: policy.expects_reply(&output.reply),
            suppress_output: policy.suppress_output,
            followup_timeout_ms: policy.followup_timeout_ms.or(output.followup_timeout_ms),
            reply: output.reply,
            skill: name,
            tool_called: output.tool_called,
            data: output.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo {
        name: &'static str,
        keywords: &'static [&'static str],
        reply: &'static str,
    }

    #[async_trait]
    impl Skill for Echo {
        fn name(&self) -> &str {
            self.name
        }

        fn keywords(&self) -> &[&str] {
            self.keywords
        }

        async fn handle(&self, _text: &str, _cancel: CancellationToken) -> Result<SkillOutput, SkillError> {
            Ok(SkillOutput {
                followup_timeout_ms: Some(4_000),
                ..SkillOutput::reply(self.reply)
            })
        }
    }

    fn router() -> KeywordRouter {
        KeywordRouter::new(Arc::new(Echo {
            name: "conversation",
            keywords: &[],
            reply: "Which room, Sir?",
        }))
        .register(Arc::new(Echo {
            name: "lights",
            keywords: &["lights", "lamp"],
            reply: "Lights on, Sir.",
        }))
    }

    #[tokio::test]
    async fn test_keyword_wins_over_fallback() {
        let reply = router()
            .route("Turn on the LIGHTS", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.skill, "lights");
        assert!(!reply.expects_reply);
    }

    #[tokio::test]
    async fn test_fallback_question_expects_reply() {
        let reply = router()
            .route("make it cosy", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.skill, "conversation");
        assert!(reply.expects_reply);
        assert_eq!(reply.followup_timeout_ms, Some(4_000));
    }

    #[tokio::test]
    async fn test_policy_overrides_skill() {
        let policies = SkillPolicies::from_json(
            r#"{"lights": {"followup": "always", "followup_timeout_ms": 9000, "suppress_output": true}}"#,
        )
        .unwrap();
        let reply = router()
            .with_policies(policies)
            .route("lamp please", CancellationToken::new())
            .await
            .unwrap();
        assert!(reply.expects_reply);
        assert!(reply.suppress_output);
        assert_eq!(reply.followup_timeout_ms, Some(9_000));
    }

    fn weather_router() -> KeywordRouter {
        router().register(Arc::new(Echo {
            name: "weather",
            keywords: &["weather", "rain"],
            reply: "Dry and mild, Sir.",
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_vague_followup_returns_to_last_skill() {
        let router = weather_router();
        let first = router.route("What's the weather like", CancellationToken::new()).await.unwrap();
        assert_eq!(first.skill, "weather");

        tokio::time::advance(Duration::from_secs(30)).await;
        let next = router.route("And tomorrow?", CancellationToken::new()).await.unwrap();
        assert_eq!(next.skill, "weather");

        // A keyword still wins over the carry-over
        let lights = router.route("and the lights", CancellationToken::new()).await.unwrap();
        assert_eq!(lights.skill, "lights");
    }

    #[tokio::test(start_paused = true)]
    async fn test_carry_over_expires() {
        let router = weather_router();
        router.route("Will it rain", CancellationToken::new()).await.unwrap();

        tokio::time::advance(CARRY_OVER_TTL + Duration::from_secs(1)).await;
        let next = router.route("what about tomorrow", CancellationToken::new()).await.unwrap();
        assert_eq!(next.skill, "conversation");
    }

    #[tokio::test(start_paused = true)]
    async fn test_specific_request_ignores_last_skill() {
        let router = weather_router();
        router.route("weather please", CancellationToken::new()).await.unwrap();
        let next = router
            .route("Tell me a story about a very brave knight", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(next.skill, "conversation");
    }

    #[test]
    fn test_policy_defaults() {
        let policies = SkillPolicies::default();
        assert_eq!(policies.get("clock").followup, FollowupPolicy::Never);
        assert_eq!(policies.get("anything").followup, FollowupPolicy::WhenQuestion);
        assert!(!SkillPolicy::default().expects_reply("Done, Sir."));
        assert!(SkillPolicy::default().expects_reply("Which one, Sir? "));
    }

    #[test]
    fn test_policy_file_keeps_builtin_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skills.json");
        std::fs::write(&path, r#"{"conversation": {"followup": "always"}}"#).unwrap();
        let policies = SkillPolicies::load(&path).unwrap();
        assert_eq!(policies.get("conversation").followup, FollowupPolicy::Always);
        assert_eq!(policies.get("voice").followup, FollowupPolicy::Never);
    }

    #[test]
    fn test_bad_policy_file() {
        assert!(matches!(
            SkillPolicies::from_json(r#"{"clock": {"followup": "sometimes"}}"#),
            Err(PolicyError::Parse(_))
        ));
    }
}
