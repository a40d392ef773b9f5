// src/persistence/mod.rs
// Component A — typed façade over the four key families the engine keeps
// in the stream store (raw stream, final stream, aggregation hash,
// deadline zset), plus the per-chat config and metrics hashes.
//
// Grounded in the original `RedisClient` and, for the concrete Redis Streams
// usage (XADD/XREADGROUP/XACK/ZADD/ZRANGEBYSCORE), in the async redis-worker
// reference implementation retrieved alongside the teacher.

pub mod memory_store;
pub mod redis_store;
pub mod types;

pub use types::{ChatStatus, FinalMessage, RawEvent, Series, SeriesView, UserType};

use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn append_raw(&self, chat: &str, event: &RawEvent) -> anyhow::Result<String>;
    async fn read_new_raw(
        &self,
        chat: &str,
        consumer: &str,
        max: usize,
        block_ms: usize,
    ) -> anyhow::Result<Vec<(String, RawEvent)>>;
    async fn ack_raw(&self, chat: &str, id: &str) -> anyhow::Result<()>;
    async fn delete_raw(&self, chat: &str, id: &str) -> anyhow::Result<()>;
    async fn ensure_consumer_group(&self, chat: &str) -> anyhow::Result<()>;

    async fn get_series(&self, chat: &str) -> anyhow::Result<Option<Series>>;
    async fn put_series(&self, chat: &str, series: &Series) -> anyhow::Result<()>;
    async fn delete_series(&self, chat: &str) -> anyhow::Result<()>;

    async fn append_final(&self, chat: &str, msg: &FinalMessage) -> anyhow::Result<String>;
    /// Newest-first, at most `n` entries.
    async fn list_final(&self, chat: &str, n: usize) -> anyhow::Result<Vec<FinalMessage>>;
    async fn delete_final(&self, chat: &str, id: &str) -> anyhow::Result<()>;

    async fn set_deadline(&self, chat: &str, ts: f64) -> anyhow::Result<()>;
    /// Chats whose deadline is `<= now`, oldest first, capped at `max`. Does
    /// not remove the entries — removal happens via `remove_deadline` once a
    /// flush actually succeeds, mirroring the original `scheduler_tick`.
    async fn pop_expired(&self, now: f64, max: usize) -> anyhow::Result<Vec<String>>;
    async fn remove_deadline(&self, chat: &str) -> anyhow::Result<()>;
    async fn list_deadlined_chats(&self) -> anyhow::Result<Vec<String>>;
    /// This chat's own pending deadline, if any. Used only by `chat_status`.
    async fn get_deadline(&self, chat: &str) -> anyhow::Result<Option<f64>>;

    async fn get_window(&self, chat: &str) -> anyhow::Result<Option<u64>>;
    async fn set_window(&self, chat: &str, seconds: u64) -> anyhow::Result<()>;

    async fn increment_metric(&self, chat: &str, name: &str) -> anyhow::Result<()>;
    async fn get_metrics(&self, chat: &str) -> anyhow::Result<HashMap<String, u64>>;

    /// Stops the chat's worker, force-flushes its series, deletes every
    /// chat-scoped key. Never called from the hot path.
    async fn cleanup_chat(&self, chat: &str) -> anyhow::Result<()>;

    async fn ping(&self) -> anyhow::Result<bool>;
}
