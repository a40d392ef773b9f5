// src/aggregator/mod.rs
// Component B — same-author burst fusion, window-based flush, series
// lifecycle. Grounded in the original `RedisClient.process_message` /
// `_flush_series` / the "append to last long" extension.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;

use crate::persistence::{FinalMessage, Persistence, RawEvent, Series, UserType};
use crate::utils::now_ts;

/// Owns the per-chat flush mutexes (Invariant 4 / §5's "per-chat flush mutex
/// is the only cross-component lock").
pub struct Aggregator {
    store: Arc<dyn Persistence>,
    flush_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self {
            store,
            flush_locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, chat: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.flush_locks.lock().unwrap();
        locks
            .entry(chat.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// §4.B algorithm. `window_s` is the chat's effective burst window
    /// (per-chat override if set, else the configured default).
    pub async fn process_message(
        &self,
        chat: &str,
        event: RawEvent,
        window_s: u64,
    ) -> anyhow::Result<()> {
        let now = now_ts();
        let existing = self.store.get_series(chat).await?;

        match existing {
            None => self.start_series(chat, event, now, window_s).await,
            Some(s) if s.user_id == event.user_id && now - s.last_ts <= window_s as f64 => {
                self.extend_series(chat, s, event, now, window_s).await
            }
            Some(_) => {
                self.flush(chat, now).await?;
                self.start_series(chat, event, now, window_s).await
            }
        }
    }

    async fn start_series(
        &self,
        chat: &str,
        event: RawEvent,
        now: f64,
        window_s: u64,
    ) -> anyhow::Result<()> {
        let series = Series {
            user_id: event.user_id,
            messages_id: event.messages_id,
            username: event.username,
            user_type: event.user_type,
            text: event.text,
            start_ts: now,
            last_ts: now,
            count: 1,
        };
        self.store.put_series(chat, &series).await?;
        self.store.set_deadline(chat, now + window_s as f64).await?;
        self.store.increment_metric(chat, "messages_received").await.ok();
        crate::metrics::record_message_received();
        Ok(())
    }

    async fn extend_series(
        &self,
        chat: &str,
        mut series: Series,
        event: RawEvent,
        now: f64,
        window_s: u64,
    ) -> anyhow::Result<()> {
        series.text = if series.text.is_empty() {
            event.text
        } else {
            format!("{}\n{}", series.text, event.text)
        };
        series.last_ts = now;
        series.count += 1;
        self.store.put_series(chat, &series).await?;
        self.store.set_deadline(chat, now + window_s as f64).await?;
        self.store.increment_metric(chat, "messages_received").await.ok();
        crate::metrics::record_message_received();
        Ok(())
    }

    /// §4.B `flush`. Returns the final stream id, or `None` if there was no
    /// series to flush (e.g. a scheduler tick racing a concurrent flush).
    pub async fn flush(&self, chat: &str, now: f64) -> anyhow::Result<Option<String>> {
        let lock = self.lock_for(chat);
        let _guard = lock.lock().await;
        self.flush_locked(chat, now).await
    }

    async fn flush_locked(&self, chat: &str, _now: f64) -> anyhow::Result<Option<String>> {
        let Some(series) = self.store.get_series(chat).await? else {
            return Ok(None);
        };
        // end_ts is the series' own last_ts, not "now" — the flush may run
        // well after the last event (scheduler tick, author-change flush).
        let final_msg = FinalMessage {
            stream_id: String::new(),
            user_id: series.user_id,
            messages_id: series.messages_id,
            username: series.username,
            user_type: series.user_type,
            text: series.text,
            start_ts: series.start_ts,
            end_ts: series.last_ts,
            count: series.count,
        };
        let id = self.store.append_final(chat, &final_msg).await?;
        self.store.delete_series(chat).await?;
        self.store.remove_deadline(chat).await?;
        self.store.increment_metric(chat, "series_flushed").await.ok();
        self.store.increment_metric(chat, "messages_aggregated").await.ok();
        crate::metrics::record_series_flushed();
        Ok(Some(id))
    }

    /// §4.B "append to last long for merchant" extension. Routed through the
    /// per-chat flush mutex — the distilled spec's §9 open-question fix
    /// (the original calls this synchronously from ingress with no lock).
    pub async fn append_to_last_long(
        &self,
        chat: &str,
        user_id: &str,
        username: &str,
        text: &str,
    ) -> anyhow::Result<Option<String>> {
        let lock = self.lock_for(chat);
        let _guard = lock.lock().await;

        let finals = self.store.list_final(chat, 100).await?;
        let Some(old) = finals
            .into_iter()
            .find(|m| m.user_type == UserType::Merchant && m.user_id == user_id)
        else {
            return Ok(None);
        };

        let now = now_ts();
        let combined = FinalMessage {
            stream_id: String::new(),
            user_id: user_id.to_string(),
            messages_id: old.messages_id.clone(),
            username: username.to_string(),
            user_type: UserType::Merchant,
            text: format!("{}\n{}", old.text, text),
            start_ts: old.start_ts,
            end_ts: now,
            count: old.count + 1,
        };
        let id = self.store.append_final(chat, &combined).await?;
        self.store.delete_final(chat, &old.stream_id).await?;
        Ok(Some(id))
    }

    /// Flushes every chat with a pending deadline. Used by the shutdown
    /// sequence. Named for what it does rather than carrying over the
    /// source's corrupted method name.
    pub async fn force_flush_all(&self) -> anyhow::Result<usize> {
        let chats = self.store.list_deadlined_chats().await?;
        let now = now_ts();
        let mut flushed = 0;
        for chat in chats {
            if self.flush(&chat, now).await?.is_some() {
                flushed += 1;
            }
        }
        Ok(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory_store::MemoryPersistence;

    fn merchant_event(user_id: &str, text: &str) -> RawEvent {
        RawEvent {
            messages_id: format!("m-{text}"),
            user_id: user_id.to_string(),
            username: "merchant1".to_string(),
            user_type: UserType::Merchant,
            text: text.to_string(),
            timestamp: now_ts(),
        }
    }

    #[tokio::test]
    async fn burst_fusion_joins_text_and_counts(){
        let store = Arc::new(MemoryPersistence::new());
        let agg = Aggregator::new(store.clone());

        agg.process_message("chat1", merchant_event("U1", "a"), 2).await.unwrap();
        agg.process_message("chat1", merchant_event("U1", "b"), 2).await.unwrap();
        agg.process_message("chat1", merchant_event("U1", "c"), 2).await.unwrap();

        let series = store.get_series("chat1").await.unwrap().unwrap();
        assert_eq!(series.count, 3);
        assert_eq!(series.text, "a\nb\nc");

        let id = agg.flush("chat1", now_ts()).await.unwrap();
        assert!(id.is_some());
        let finals = store.list_final("chat1", 10).await.unwrap();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].count, 3);
        assert_eq!(finals[0].text, "a\nb\nc");
        assert!(store.get_series("chat1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn author_switch_flushes_the_prior_series(){
        let store = Arc::new(MemoryPersistence::new());
        let agg = Aggregator::new(store.clone());

        agg.process_message("chat1", merchant_event("M1", "q1"), 2).await.unwrap();
        // A different author arrives — the prior series for M1 is flushed
        // before a fresh series for M2 is started (§4.B step 5).
        let mut m2 = merchant_event("M2", "q2");
        m2.username = "merchant2".to_string();
        agg.process_message("chat1", m2, 2).await.unwrap();

        let finals = store.list_final("chat1", 10).await.unwrap();
        assert_eq!(finals.len(), 1, "M1's series should already be flushed");
        assert_eq!(finals[0].user_id, "M1");
        assert_eq!(finals[0].count, 1);

        let series = store.get_series("chat1").await.unwrap().unwrap();
        assert_eq!(series.user_id, "M2");
        assert_eq!(series.count, 1);
    }

    #[tokio::test]
    async fn append_to_last_long_merges_and_replaces(){
        let store = Arc::new(MemoryPersistence::new());
        let agg = Aggregator::new(store.clone());

        let old = FinalMessage {
            stream_id: String::new(),
            user_id: "U1".to_string(),
            messages_id: "m-old".to_string(),
            username: "merchant1".to_string(),
            user_type: UserType::Merchant,
            text: "when is payment?".to_string(),
            start_ts: 100.0,
            end_ts: 100.0,
            count: 1,
        };
        let old_id = store.append_final("chat1", &old).await.unwrap();

        let new_id = agg
            .append_to_last_long("chat1", "U1", "merchant1", "still waiting")
            .await
            .unwrap()
            .expect("should find a matching merchant final");

        assert_ne!(new_id, old_id);
        let finals = store.list_final("chat1", 10).await.unwrap();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].text, "when is payment?\nstill waiting");
        assert_eq!(finals[0].count, 2);
    }

    #[tokio::test]
    async fn append_to_last_long_returns_none_without_a_match(){
        let store = Arc::new(MemoryPersistence::new());
        let agg = Aggregator::new(store.clone());

        let result = agg
            .append_to_last_long("chat1", "U1", "merchant1", "hello")
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
