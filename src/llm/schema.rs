// src/llm/schema.rs
// Default JSON schemas for the two LLM calls this controller makes, used
// when `configs/prompts.yaml` doesn't override them. Keeping them in code
// (rather than only in YAML) means a fresh deployment has a working default.

use serde_json::{json, Value};

pub fn default_classification_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "class": { "type": "integer", "enum": [0, 1] },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
        },
        "required": ["class", "confidence"],
        "additionalProperties": false
    })
}

/// Typed as `string|null` rather than the original source's `integer|null`
/// — real stream ids look like `"1700-0"`. See DESIGN.md.
pub fn default_qa_link_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "matched_message_id": { "type": ["string", "null"] }
        },
        "required": ["matched_message_id"],
        "additionalProperties": false
    })
}
