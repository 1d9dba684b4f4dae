//! Response gating and follow-up timing
//!
//! Decides whether an utterance deserves a reply at all before any skill is
//! consulted. Follow-up windows are held to a stricter bar than manual input:
//! background chatter picked up after the assistant spoke should not trigger
//! another answer.

use crate::turn::GateReason;
use regex::Regex;
use std::sync::LazyLock;

/// Window for the first follow-up capture
pub const FOLLOWUP_TIMEOUT_MS: u64 = 6000;
/// Window for the single retry after a silent follow-up
pub const SECOND_CHANCE_TIMEOUT_MS: u64 = 3000;
/// Window for push-to-talk and wake captures
pub const DEFAULT_MANUAL_TIMEOUT_MS: u64 = 20000;

pub const EXIT_REPLY: &str = "Very well, Sir.";
pub const NO_SPEECH_MESSAGE: &str = "Didn't catch that, Sir.";
pub const APOLOGY: &str = "My apologies, Sir. Something went wrong with that request.";

const ACKNOWLEDGEMENTS: &[&str] = &[
    "ok", "okay", "yeah", "yep", "nah", "nice", "cool", "cheers", "thanks", "thank you", "lol",
    "haha", "alright", "sound", "safe", "right",
];

const GREETINGS: &[&str] = &[
    "hallo",
    "hello",
    "hi",
    "hey",
    "hiya",
    "good morning",
    "good afternoon",
    "good evening",
];

const QUESTION_STARTERS: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "can", "could", "should", "would", "do", "did",
    "is", "are",
];

const EXIT_PHRASES: &[&str] = &["rico, stop listening", "that's all, rico", "that\u{2019}s all, rico"];

/// Replies that only make sense against whatever was just said
const VAGUE_REPLIES: &[&str] = &[
    "yes", "no", "yeah", "nope", "ok", "okay", "sure", "probably", "maybe", "alright",
    "alright perfect", "thats good", "that is good", "what about now", "i guess that means no",
    "yup", "yep", "uhuh", "k", "cool", "fine",
];

const FOLLOWUP_PREFIXES: &[&str] = &["and ", "what about", "how about", "what if"];

const FOLLOWUP_WORDS: &[&str] = &[
    "tomorrow", "later", "tonight", "today", "again", "umbrella", "coat", "jacket",
];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));
static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("static regex"));

/// Collapse whitespace, trim, lowercase and drop punctuation
pub fn normalize_text(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text, " ");
    let lowered = collapsed.trim().to_lowercase();
    PUNCTUATION.replace_all(&lowered, "").into_owned()
}

pub fn is_acknowledgement(text: &str) -> bool {
    ACKNOWLEDGEMENTS.contains(&normalize_text(text).as_str())
}

/// Phrases that end a conversation without consulting any skill
pub fn is_exit_phrase(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    EXIT_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

/// Whether a follow-up utterance warrants a reply, and why not if it doesn't.
///
/// Greetings always pass. Anything of two words or fewer without a question
/// mark is treated as noise; longer text passes only when it is phrased as a
/// question.
pub fn should_respond_with_reason(text: &str) -> Result<(), GateReason> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Err(GateReason::Empty);
    }
    if ACKNOWLEDGEMENTS.contains(&normalized.as_str()) {
        return Err(GateReason::Ack);
    }
    if GREETINGS.contains(&normalized.as_str()) {
        return Ok(());
    }

    let asks = text.contains('?');
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.len() <= 2 && !asks {
        return Err(GateReason::ShortNonQuestion);
    }
    if asks {
        return Ok(());
    }
    match words.first() {
        Some(first) if QUESTION_STARTERS.contains(first) => Ok(()),
        _ => Err(GateReason::ShortNonQuestion),
    }
}

pub fn should_respond(text: &str) -> bool {
    should_respond_with_reason(text).is_ok()
}

/// Whether `text` leans on the previous exchange ("and tomorrow?", "what
/// about the kitchen", "sure") rather than standing on its own
pub fn is_vague(text: &str) -> bool {
    let normalized = normalize_text(text);
    if normalized.is_empty() || VAGUE_REPLIES.contains(&normalized.as_str()) {
        return true;
    }
    let len = normalized.chars().count();
    if len <= 50
        && (FOLLOWUP_PREFIXES.iter().any(|p| normalized.starts_with(p))
            || FOLLOWUP_WORDS.iter().any(|w| normalized.contains(w)))
    {
        return true;
    }
    len < 10
}
