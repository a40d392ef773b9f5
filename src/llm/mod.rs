// src/llm/mod.rs
// Component F (LLM half) — classification and answer-matching calls against
// an OpenAI-compatible `chat/completions` endpoint.
//
// Grounded in the original `LLM` class (classify_text / match_answer_to_question
// / _parse_llm_json) for the call shapes and retry/parsing policy, and in the
// teacher's `llm/provider/openai/mod.rs` for the reqwest request/response
// plumbing.

pub mod parsing;
pub mod schema;

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::PromptsConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub class: u8,
    pub confidence: f64,
}

impl Classification {
    pub fn needs_response(&self) -> bool {
        self.class == 1
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("LLM returned an error response ({status}): {body}")]
    ErrorResponse { status: u16, body: String },
    #[error("LLM response could not be parsed as the expected schema")]
    UnparsableResponse,
}

pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    prompts: PromptsConfig,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(base_url: String, api_key: String, model: String, prompts: PromptsConfig) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
            prompts,
            timeout: Duration::from_secs(30),
        }
    }

    async fn chat_completion(&self, messages: Vec<Value>, schema_name: &str, schema: &Value) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": schema_name, "schema": schema }
            }
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ErrorResponse { status, body });
        }

        let parsed: Value = response.json().await?;
        let content = parsed
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(content)
    }

    /// §4.F `classify`. Returns `Err` on a hard transport/parse failure —
    /// the failure semantics table (§4.G) has this propagate so ingress
    /// can respond 5xx.
    pub async fn classify(&self, text: &str) -> Result<Classification, LlmError> {
        let messages = vec![
            json!({ "role": "system", "content": self.prompts.system_prompt }),
            json!({ "role": "user", "content": text }),
        ];
        let result = self.classify_inner(messages).await;
        crate::metrics::record_llm_call("classify", result.is_ok());
        result
    }

    async fn classify_inner(&self, messages: Vec<Value>) -> Result<Classification, LlmError> {
        let raw = self
            .chat_completion(messages, "classification", &self.prompts.classification_schema)
            .await?;

        let parsed = parsing::parse_llm_json(&raw).ok_or(LlmError::UnparsableResponse)?;
        let class = parsed
            .get("class")
            .and_then(Value::as_u64)
            .ok_or(LlmError::UnparsableResponse)? as u8;
        let confidence = parsed.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(Classification { class, confidence })
    }

    /// §4.F `match_answer`. Never propagates — after 3 attempts it falls
    /// back to a null match, per the original's silent-degradation policy.
    pub async fn match_answer(&self, candidates: &[(String, String)], answer: &str) -> Option<String> {
        let matched = self.match_answer_inner(candidates, answer).await;
        crate::metrics::record_llm_call("match_answer", matched.is_some());
        matched
    }

    async fn match_answer_inner(&self, candidates: &[(String, String)], answer: &str) -> Option<String> {
        let candidates_str = candidates
            .iter()
            .map(|(id, text)| format!("{id}: merchant: {text}"))
            .collect::<Vec<_>>()
            .join("\n");
        let answer_str = format!("PP: {answer}");

        let mut last_user_msg = format!("{candidates_str}\n\n{answer_str}");
        let mut last_parsed: Option<String> = None;

        for attempt in 0..3 {
            let user_msg = if attempt == 0 {
                last_user_msg.clone()
            } else {
                format!("Last attempt failed. Try again:\n\n{last_user_msg}")
            };
            let messages = vec![
                json!({ "role": "system", "content": self.prompts.qa_link_system_prompt }),
                json!({ "role": "user", "content": user_msg }),
            ];

            let raw = match self
                .chat_completion(messages, "qa_link", &self.prompts.qa_link_schema)
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "match_answer LLM call failed");
                    continue;
                }
            };

            let Some(parsed) = parsing::parse_llm_json(&raw) else {
                continue;
            };

            match parsed.get("matched_message_id") {
                None => return None,
                Some(Value::Null) => return None,
                Some(Value::String(id)) => return Some(id.clone()),
                // Tolerate the original schema's integer typing too.
                Some(Value::Number(n)) => return Some(n.to_string()),
                Some(_) => {
                    last_parsed = None;
                    last_user_msg = candidates_str.clone() + "\n\n" + &answer_str;
                }
            }
        }

        last_parsed
    }
}
