// src/config/chats.rs
// `configs/config_chats.yaml` — per-chat moderation policy.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub type ChatId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingerConfig {
    #[serde(default)]
    pub whitelist: HashSet<String>,
    #[serde(default = "default_true")]
    pub bot_enabled: bool,
    #[serde(default = "default_message_timeout")]
    pub message_timeout: u64,
    #[serde(default = "default_buffer_window")]
    pub redis_buffer_window: u64,
    pub output_chat_id: Option<ChatId>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default)]
    pub days: Option<HashSet<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilencerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_silence_timeout")]
    pub silence_timeout: u64,
    pub output_chat_id: Option<ChatId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub input_chat_name: String,
    pub pinger: PingerConfig,
    #[serde(default)]
    pub silencer: SilencerConfig,
}

fn default_true() -> bool {
    true
}

fn default_message_timeout() -> u64 {
    30
}

fn default_buffer_window() -> u64 {
    2
}

fn default_silence_timeout() -> u64 {
    90
}

impl Default for SilencerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            silence_timeout: default_silence_timeout(),
            output_chat_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatsConfig {
    #[serde(flatten)]
    pub chats: HashMap<ChatId, ChatConfig>,
}

impl ChatsConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        let chats: HashMap<ChatId, ChatConfig> = serde_yaml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?;
        Ok(Self { chats })
    }

    pub fn get(&self, chat_id: &str) -> Option<&ChatConfig> {
        self.chats.get(chat_id)
    }
}
