// src/config/redis.rs
// `configs/config_redis.yaml` — store connection, key templates, and the
// tunables for the worker/scheduler loops.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConnection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub db: u8,
    pub password: Option<String>,
}

fn default_port() -> u16 {
    6379
}

impl RedisConnection {
    pub fn to_url(&self) -> String {
        match &self.password {
            Some(pw) if !pw.is_empty() => {
                format!("redis://:{}@{}:{}/{}", pw, self.host, self.port, self.db)
            }
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyTemplates {
    pub raw_stream: String,
    pub final_stream: String,
    pub agg_hash: String,
    pub sched_zset: String,
    pub conf_hash: String,
    pub metrics_hash: String,
}

impl KeyTemplates {
    pub fn raw_stream(&self, chat_id: &str) -> String {
        self.raw_stream.replace("{chat_id}", chat_id)
    }

    pub fn final_stream(&self, chat_id: &str) -> String {
        self.final_stream.replace("{chat_id}", chat_id)
    }

    pub fn agg_hash(&self, chat_id: &str) -> String {
        self.agg_hash.replace("{chat_id}", chat_id)
    }

    pub fn conf_hash(&self, chat_id: &str) -> String {
        self.conf_hash.replace("{chat_id}", chat_id)
    }

    pub fn metrics_hash(&self, chat_id: &str) -> String {
        self.metrics_hash.replace("{chat_id}", chat_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_window")]
    pub window_seconds_default: u64,
    #[serde(default = "default_group_name")]
    pub group_name: String,
}

fn default_window() -> u64 {
    2
}

fn default_group_name() -> String {
    "pinokio-workers".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    #[serde(default = "default_block_ms")]
    pub block_ms: usize,
}

fn default_max_batch() -> usize {
    64
}

fn default_block_ms() -> usize {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub connection: RedisConnection,
    pub keys: KeyTemplates,
    pub aggregation: AggregationConfig,
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
}

impl RedisConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        let mut config: Self =
            serde_yaml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?;

        config.scheduler.interval_ms = crate::config::helpers::env_usize(
            "SCHEDULER_INTERVAL_MS",
            config.scheduler.interval_ms as usize,
        ) as u64;

        Ok(config)
    }
}
