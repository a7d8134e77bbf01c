//! Prompt text and model-output parsing.
//!
//! Models often wrap JSON in markdown fences or add a sentence around it,
//! so analysis parsing looks for the fenced block first and then for the
//! outermost `{...}` span.

use once_cell::sync::Lazy;
use regex::Regex;

use nexus_core::defaults;
use nexus_core::{Analysis, Error, Result};

/// System prompt for note analysis.
pub fn analyze_system_prompt() -> String {
    format!(
        "You are an AI assistant that helps analyze notes. For the given note content, provide:\n\
         1. A brief summary (max {} words)\n\
         2. Suggested tags/labels (max {})\n\
         3. Action items/todos if any (max {})\n\
         4. Productivity suggestions (max {})\n\n\
         Respond in JSON format with keys: summary, tags, todos, suggestions",
        defaults::AI_SUMMARY_MAX_WORDS,
        defaults::AI_MAX_TAGS,
        defaults::AI_MAX_TODOS,
        defaults::AI_MAX_SUGGESTIONS,
    )
}

/// System prompt for content generation.
pub const GENERATE_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that generates content for notes based on user prompts.";

static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("valid fence regex"));

/// Locate the JSON object in raw model output.
pub fn extract_json(raw: &str) -> Option<&str> {
    if let Some(inner) = FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    {
        if inner.trim_start().starts_with('{') {
            return Some(inner);
        }
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Parse model output into a clamped analysis.
pub fn parse_analysis(raw: &str) -> Result<Analysis> {
    let json = extract_json(raw)
        .ok_or_else(|| Error::Assistant("model response contained no JSON object".to_string()))?;
    let analysis: Analysis = serde_json::from_str(json)
        .map_err(|e| Error::Assistant(format!("model returned malformed analysis: {}", e)))?;
    Ok(analysis.truncated())
}
