//! Tolerant parsing of LLM-returned JSON.
//!
//! Per spec §9: "the core never trusts the LLM to return valid structured output: every
//! LLM-returned JSON is parsed with a tolerant pass (strip code fences, remove trailing commas);
//! malformed output degrades to a conservative default rather than crashing the turn."
//!
//! Grounded on `original_source/backend/app/agents/cv_tailor.py`'s `_strip_json()` (markdown
//! fence stripping) and `email_sender.py`'s inline `"```json" in content` handling.

use regex::Regex;
use std::sync::OnceLock;

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").unwrap())
}

/// Strip a leading ```json / ``` fence and a trailing ``` fence, if present, then remove any
/// trailing commas before a closing brace/bracket. Returns the cleaned string regardless of
/// whether it turns out to be valid JSON — callers still need to call `serde_json::from_str`.
pub fn strip_json_fences(raw: &str) -> String {
    let trimmed = raw.trim();

    let without_fence = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    };

    trailing_comma_re().replace_all(without_fence, "$1").into_owned()
}

/// Parse `raw` as a JSON value, tolerating markdown fences and trailing commas. Returns `None`
/// (never panics or propagates a parse error) on failure — callers degrade to a conservative
/// default, per spec §9.
pub fn parse_tolerant(raw: &str) -> Option<serde_json::Value> {
    let cleaned = strip_json_fences(raw);
    serde_json::from_str(&cleaned).ok()
}
