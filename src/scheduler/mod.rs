// src/scheduler/mod.rs
// Component C — the global deadline scheduler. Grounded in the original
// `_scheduler_loop` / `scheduler_tick`, structured as a `tokio` interval
// task the way the teacher's `tasks::TaskManager` spawns its background
// loops.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::aggregator::Aggregator;
use crate::persistence::Persistence;
use crate::utils::now_ts;

pub struct DeadlineScheduler {
    store: Arc<dyn Persistence>,
    aggregator: Arc<Aggregator>,
    interval_ms: u64,
    max_batch: usize,
}

impl DeadlineScheduler {
    pub fn new(store: Arc<dyn Persistence>, aggregator: Arc<Aggregator>, interval_ms: u64, max_batch: usize) -> Self {
        Self {
            store,
            aggregator,
            interval_ms,
            max_batch,
        }
    }

    /// One tick of §4.C: pop expired chats and flush each. Deadlines for a
    /// chat with no series are silently dropped (the flush itself is a
    /// no-op when `get_series` returns `None`).
    pub async fn tick(&self) -> anyhow::Result<usize> {
        let now = now_ts();
        let expired = self.store.pop_expired(now, self.max_batch).await?;
        let mut flushed = 0;
        for chat in expired {
            crate::metrics::record_deadline_fired();
            match self.aggregator.flush(&chat, now).await {
                Ok(Some(_)) => flushed += 1,
                Ok(None) => {}
                Err(e) => tracing::error!(chat = %chat, error = %e, "scheduler flush failed"),
            }
        }
        Ok(flushed)
    }

    /// Runs the scheduler loop until `stop` fires. Cooperative shutdown,
    /// mirroring the teacher's `watcher::WatcherService` stop-signal idiom.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut interval = time::interval(Duration::from_millis(self.interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop.changed() => {
                    tracing::info!("deadline scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory_store::MemoryPersistence;
    use crate::persistence::Series;
    use crate::persistence::UserType;

    #[tokio::test]
    async fn tick_flushes_expired_chats_only() {
        let store = Arc::new(MemoryPersistence::new());
        let aggregator = Arc::new(Aggregator::new(store.clone()));
        let scheduler = DeadlineScheduler::new(store.clone(), aggregator.clone(), 200, 100);

        let now = now_ts();
        store
            .put_series(
                "expired-chat",
                &Series {
                    user_id: "U1".into(),
                    messages_id: "m1".into(),
                    username: "merchant1".into(),
                    user_type: UserType::Merchant,
                    text: "hi".into(),
                    start_ts: now - 10.0,
                    last_ts: now - 10.0,
                    count: 1,
                },
            )
            .await
            .unwrap();
        store.set_deadline("expired-chat", now - 1.0).await.unwrap();

        store
            .put_series(
                "fresh-chat",
                &Series {
                    user_id: "U2".into(),
                    messages_id: "m2".into(),
                    username: "merchant2".into(),
                    user_type: UserType::Merchant,
                    text: "hi".into(),
                    start_ts: now,
                    last_ts: now,
                    count: 1,
                },
            )
            .await
            .unwrap();
        store.set_deadline("fresh-chat", now + 60.0).await.unwrap();

        let flushed = scheduler.tick().await.unwrap();
        assert_eq!(flushed, 1);
        assert!(store.get_series("expired-chat").await.unwrap().is_none());
        assert!(store.get_series("fresh-chat").await.unwrap().is_some());
    }
}
