// src/config/prompts.rs
// `configs/prompts.yaml` — system prompts and JSON schemas for the two LLM
// calls the classification/matching controller makes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::schema::{default_classification_schema, default_qa_link_schema};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    pub system_prompt: String,
    #[serde(default = "default_classification_schema")]
    pub classification_schema: Value,
    pub qa_link_system_prompt: String,
    #[serde(default = "default_qa_link_schema")]
    pub qa_link_schema: Value,
}

impl PromptsConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        serde_yaml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
    }
}
