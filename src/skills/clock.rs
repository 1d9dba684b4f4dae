//! Local time and date

use super::{Skill, SkillError, SkillOutput};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const TIME_PHRASES: &[&str] = &[
    "what's the time",
    "whats the time",
    "what is the time",
    "tell me the time",
    "current time",
    "local time",
    "time is it",
];

const DATE_PHRASES: &[&str] = &["what's the date", "whats the date", "what is the date", "what day is it", "today's date"];

#[derive(Debug, Default)]
pub struct ClockSkill;

impl ClockSkill {
    fn answer<Tz: TimeZone>(text: &str, now: &DateTime<Tz>) -> SkillOutput
    where
        Tz::Offset: std::fmt::Display,
    {
        let lowered = text.to_lowercase();
        let reply = if DATE_PHRASES.iter().any(|p| lowered.contains(p)) {
            format!("Today is {}, Sir.", now.format("%A %-d %B"))
        } else {
            format!("It is {}, Sir.", now.format("%H:%M"))
        };
        SkillOutput::reply(reply).with_data(json!({ "now": now.to_rfc3339() }))
    }
}

#[async_trait]
impl Skill for ClockSkill {
    fn name(&self) -> &str {
        "clock"
    }

    fn matches(&self, lowered: &str) -> bool {
        TIME_PHRASES
            .iter()
            .chain(DATE_PHRASES)
            .any(|p| lowered.contains(p))
    }

    async fn handle(&self, text: &str, _cancel: CancellationToken) -> Result<SkillOutput, SkillError> {
        Ok(Self::answer(text, &Local::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 5, 0).unwrap()
    }

    #[test]
    fn test_time_reply() {
        let out = ClockSkill::answer("What time is it?", &fixed());
        assert_eq!(out.reply, "It is 09:05, Sir.");
        assert!(!out.tool_called);
    }

    #[test]
    fn test_date_reply() {
        let out = ClockSkill::answer("what day is it", &fixed());
        assert_eq!(out.reply, "Today is Monday 2 March, Sir.");
    }

    #[test]
    fn test_matching() {
        let clock = ClockSkill;
        assert!(clock.matches("rico, what's the time"));
        assert!(clock.matches("what time is it"));
        assert!(!clock.matches("time to go"));
    }
}
