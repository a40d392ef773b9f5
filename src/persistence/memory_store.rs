// src/persistence/memory_store.rs
// An in-process fake of the persistence façade, so the aggregator, scheduler,
// monitor, and ingress router can be exercised in tests without a live
// Redis instance.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::types::{FinalMessage, RawEvent, Series};
use super::Persistence;

#[derive(Default)]
struct ChatState {
    raw: Vec<(String, RawEvent)>,
    series: Option<Series>,
    finals: Vec<FinalMessage>,
    window: Option<u64>,
    metrics: HashMap<String, u64>,
}

#[derive(Default)]
pub struct MemoryPersistence {
    chats: Mutex<HashMap<String, ChatState>>,
    deadlines: Mutex<HashMap<String, f64>>,
    next_id: Mutex<u64>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_stream_id(&self) -> String {
        let mut n = self.next_id.lock().unwrap();
        *n += 1;
        format!("{}-0", *n)
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn append_raw(&self, chat: &str, event: &RawEvent) -> anyhow::Result<String> {
        let id = self.next_stream_id();
        let mut chats = self.chats.lock().unwrap();
        chats
            .entry(chat.to_string())
            .or_default()
            .raw
            .push((id.clone(), event.clone()));
        Ok(id)
    }

    async fn read_new_raw(
        &self,
        chat: &str,
        _consumer: &str,
        max: usize,
        _block_ms: usize,
    ) -> anyhow::Result<Vec<(String, RawEvent)>> {
        let mut chats = self.chats.lock().unwrap();
        let state = chats.entry(chat.to_string()).or_default();
        let take = state.raw.len().min(max);
        Ok(state.raw.drain(..take).collect())
    }

    async fn ack_raw(&self, _chat: &str, _id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn delete_raw(&self, chat: &str, id: &str) -> anyhow::Result<()> {
        let mut chats = self.chats.lock().unwrap();
        if let Some(state) = chats.get_mut(chat) {
            state.raw.retain(|(entry_id, _)| entry_id != id);
        }
        Ok(())
    }

    async fn ensure_consumer_group(&self, _chat: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_series(&self, chat: &str) -> anyhow::Result<Option<Series>> {
        let chats = self.chats.lock().unwrap();
        Ok(chats.get(chat).and_then(|s| s.series.clone()))
    }

    async fn put_series(&self, chat: &str, series: &Series) -> anyhow::Result<()> {
        let mut chats = self.chats.lock().unwrap();
        chats.entry(chat.to_string()).or_default().series = Some(series.clone());
        Ok(())
    }

    async fn delete_series(&self, chat: &str) -> anyhow::Result<()> {
        let mut chats = self.chats.lock().unwrap();
        if let Some(state) = chats.get_mut(chat) {
            state.series = None;
        }
        Ok(())
    }

    async fn append_final(&self, chat: &str, msg: &FinalMessage) -> anyhow::Result<String> {
        let id = if msg.stream_id.is_empty() {
            self.next_stream_id()
        } else {
            msg.stream_id.clone()
        };
        let mut msg = msg.clone();
        msg.stream_id = id.clone();
        let mut chats = self.chats.lock().unwrap();
        chats.entry(chat.to_string()).or_default().finals.push(msg);
        Ok(id)
    }

    async fn list_final(&self, chat: &str, n: usize) -> anyhow::Result<Vec<FinalMessage>> {
        let chats = self.chats.lock().unwrap();
        let Some(state) = chats.get(chat) else {
            return Ok(vec![]);
        };
        let mut out: Vec<FinalMessage> = state.finals.clone();
        out.reverse();
        out.truncate(n);
        Ok(out)
    }

    async fn delete_final(&self, chat: &str, id: &str) -> anyhow::Result<()> {
        let mut chats = self.chats.lock().unwrap();
        if let Some(state) = chats.get_mut(chat) {
            state.finals.retain(|m| m.stream_id != id);
        }
        Ok(())
    }

    async fn set_deadline(&self, chat: &str, ts: f64) -> anyhow::Result<()> {
        self.deadlines.lock().unwrap().insert(chat.to_string(), ts);
        Ok(())
    }

    async fn pop_expired(&self, now: f64, max: usize) -> anyhow::Result<Vec<String>> {
        let deadlines = self.deadlines.lock().unwrap();
        let mut expired: Vec<(String, f64)> = deadlines
            .iter()
            .filter(|(_, ts)| **ts <= now)
            .map(|(c, ts)| (c.clone(), *ts))
            .collect();
        expired.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        expired.truncate(max);
        Ok(expired.into_iter().map(|(c, _)| c).collect())
    }

    async fn remove_deadline(&self, chat: &str) -> anyhow::Result<()> {
        self.deadlines.lock().unwrap().remove(chat);
        Ok(())
    }

    async fn list_deadlined_chats(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.deadlines.lock().unwrap().keys().cloned().collect())
    }

    async fn get_deadline(&self, chat: &str) -> anyhow::Result<Option<f64>> {
        Ok(self.deadlines.lock().unwrap().get(chat).copied())
    }

    async fn get_window(&self, chat: &str) -> anyhow::Result<Option<u64>> {
        let chats = self.chats.lock().unwrap();
        Ok(chats.get(chat).and_then(|s| s.window))
    }

    async fn set_window(&self, chat: &str, seconds: u64) -> anyhow::Result<()> {
        let mut chats = self.chats.lock().unwrap();
        chats.entry(chat.to_string()).or_default().window = Some(seconds);
        Ok(())
    }

    async fn increment_metric(&self, chat: &str, name: &str) -> anyhow::Result<()> {
        let mut chats = self.chats.lock().unwrap();
        *chats
            .entry(chat.to_string())
            .or_default()
            .metrics
            .entry(name.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn get_metrics(&self, chat: &str) -> anyhow::Result<HashMap<String, u64>> {
        let chats = self.chats.lock().unwrap();
        Ok(chats.get(chat).map(|s| s.metrics.clone()).unwrap_or_default())
    }

    async fn cleanup_chat(&self, chat: &str) -> anyhow::Result<()> {
        self.chats.lock().unwrap().remove(chat);
        self.deadlines.lock().unwrap().remove(chat);
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}
