// src/llm/parsing.rs
// Tolerant parsing of LLM output: accept raw JSON, JSON fenced in a code
// block, or a literal null/none (case-insensitive) meaning "no result".
//
// Grounded in the original `LLM._parse_llm_json`. The strict JSON-schema
// constraint on the LLM side is advisory, not trusted (§9).

use regex::Regex;
use serde_json::Value;

fn strip_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    // ```lang\n...\n``` or ```\n...\n```
    let fence = Regex::new(r"(?s)^```[a-zA-Z]*\s*\n?(.*?)\n?```$").unwrap();
    if let Some(caps) = fence.captures(trimmed) {
        return caps[1].trim().to_string();
    }
    trimmed.trim_matches('`').trim().to_string()
}

pub fn parse_llm_json(raw: &str) -> Option<Value> {
    let stripped = strip_fence(raw);
    if stripped.is_empty() {
        return None;
    }
    if matches!(stripped.to_lowercase().as_str(), "null" | "none") {
        return None;
    }

    if let Ok(v) = serde_json::from_str::<Value>(&stripped) {
        return Some(v);
    }

    // Fall back to extracting the first {...} block, the way the source's
    // classify_text falls back to a regex search over raw_content.
    let brace = Regex::new(r"(?s)\{.*\}").unwrap();
    brace
        .find(&stripped)
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
}
