// src/worker/registry.rs
// Tracks one `ChatWorker` per chat seen so far, spawned on demand by the
// ingress router (§4.G step 5). Modeled on the teacher's
// `tasks::TaskManager` handle bookkeeping, but keyed dynamically by chat_id
// instead of being a fixed set of tasks started at startup.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::aggregator::Aggregator;
use crate::config::RedisConfig;
use crate::persistence::{ChatStatus, Persistence, SeriesView};

use super::ChatWorker;

struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

pub struct WorkerRegistry {
    store: Arc<dyn Persistence>,
    aggregator: Arc<Aggregator>,
    redis_config: RedisConfig,
    workers: RwLock<HashMap<String, WorkerHandle>>,
}

impl WorkerRegistry {
    pub fn new(store: Arc<dyn Persistence>, aggregator: Arc<Aggregator>, redis_config: RedisConfig) -> Self {
        Self {
            store,
            aggregator,
            redis_config,
            workers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn is_running(&self, chat_id: &str) -> bool {
        self.workers.read().await.contains_key(chat_id)
    }

    /// Diagnostics snapshot (§3, §4.A `chat_status`): composes the store's
    /// series/deadline/metrics state with this registry's worker bookkeeping.
    /// Not on the hot path; never called per-message.
    pub async fn chat_status(&self, chat_id: &str, now: f64) -> anyhow::Result<ChatStatus> {
        let series = self.store.get_series(chat_id).await?;
        let deadline_ts = self.store.get_deadline(chat_id).await?;
        let metrics = self.store.get_metrics(chat_id).await?;
        let worker_running = self.is_running(chat_id).await;

        Ok(ChatStatus {
            has_active_series: series.is_some(),
            active_series: series.as_ref().map(SeriesView::from),
            deadline_ts,
            deadline_seconds_left: deadline_ts.map(|ts| ts - now),
            metrics,
            worker_running,
        })
    }

    /// Idempotent: a no-op if the chat's worker is already running.
    pub async fn ensure_running(&self, chat_id: &str) {
        let mut workers = self.workers.write().await;
        if workers.contains_key(chat_id) {
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = ChatWorker::new(
            chat_id.to_string(),
            self.store.clone(),
            self.aggregator.clone(),
            self.redis_config.clone(),
        );
        let join = tokio::spawn(worker.run(stop_rx));
        workers.insert(chat_id.to_string(), WorkerHandle { stop_tx, join });
        tracing::info!(chat = %chat_id, "worker started");
    }

    /// §5 shutdown: signal every worker's stop flag and await its join
    /// handle. Called only after `flush_all` has run.
    pub async fn stop_all(&self) {
        let mut workers = self.workers.write().await;
        let handles: Vec<WorkerHandle> = workers.drain().map(|(_, h)| h).collect();
        drop(workers);

        for handle in &handles {
            let _ = handle.stop_tx.send(true);
        }
        for handle in handles {
            let _ = handle.join.await;
        }
    }
}
