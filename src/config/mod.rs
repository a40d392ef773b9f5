// src/config/mod.rs
// Central configuration for the aggregation-and-escalation engine.

pub mod chats;
pub mod helpers;
pub mod prompts;
pub mod redis;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use chats::{ChatConfig, ChatId, ChatsConfig, PingerConfig, SilencerConfig};
pub use prompts::PromptsConfig;
pub use redis::RedisConfig;

lazy_static! {
    pub static ref CONFIG: EngineConfig = EngineConfig::from_env();
}

/// Root configuration, composed from required env vars plus the three YAML
/// files the original service reads from its `configs/` directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub bearer_token: String,
    pub default_user_id_bot: String,
    pub kafka_sender_url: String,
    pub llm_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub check_interval: u64,

    pub bind_address: String,
    pub log_level: String,

    pub chats: ChatsConfig,
    pub redis: RedisConfig,
    pub prompts: PromptsConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let configs_dir = helpers::env_or("CONFIGS_DIR", "configs");
        let configs_dir = PathBuf::from(configs_dir);

        let chats = ChatsConfig::load(&configs_dir.join("config_chats.yaml"))
            .unwrap_or_else(|e| panic!("failed to load config_chats.yaml: {e}"));
        let redis = RedisConfig::load(&configs_dir.join("config_redis.yaml"))
            .unwrap_or_else(|e| panic!("failed to load config_redis.yaml: {e}"));
        let prompts = PromptsConfig::load(&configs_dir.join("prompts.yaml"))
            .unwrap_or_else(|e| panic!("failed to load prompts.yaml: {e}"));

        Self {
            bearer_token: helpers::require_env("BEARER_TOKEN"),
            default_user_id_bot: helpers::require_env("DEFAULT_USER_ID_BOT"),
            kafka_sender_url: helpers::require_env("KAFKA_SENDER_URL"),
            llm_url: helpers::require_env("LLM_URL"),
            llm_api_key: helpers::require_env("LLM_API_KEY"),
            llm_model: helpers::require_env("LLM_MODEL"),
            check_interval: helpers::require_env_parsed("CHECK_INTERVAL"),

            bind_address: helpers::env_or("BIND_ADDRESS", "0.0.0.0:8080"),
            log_level: helpers::env_or("RUST_LOG", "info"),

            chats,
            redis,
            prompts,
        }
    }

    /// Fail fast on startup rather than surface malformed config deep inside
    /// a background task.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bearer_token.is_empty() {
            anyhow::bail!("BEARER_TOKEN must not be empty");
        }
        if self.chats.chats.is_empty() {
            tracing::warn!("config_chats.yaml has no chats configured");
        }
        Ok(())
    }

    pub fn chat(&self, chat_id: &str) -> Option<&ChatConfig> {
        self.chats.get(chat_id)
    }
}
