// src/worker/mod.rs
// Component D — one consumer-group reader per active chat, draining the raw
// stream into the aggregator. Grounded in the original `_chat_worker` /
// `start_worker` / `stop_worker`, with the teacher's cooperative
// mpsc-stop-signal idiom (`watcher::WatcherService`) in place of a Python
// `threading.Event`.

pub mod registry;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::aggregator::Aggregator;
use crate::config::RedisConfig;
use crate::persistence::Persistence;

pub struct ChatWorker {
    chat_id: String,
    store: Arc<dyn Persistence>,
    aggregator: Arc<Aggregator>,
    redis_config: RedisConfig,
}

impl ChatWorker {
    pub fn new(chat_id: String, store: Arc<dyn Persistence>, aggregator: Arc<Aggregator>, redis_config: RedisConfig) -> Self {
        Self {
            chat_id,
            store,
            aggregator,
            redis_config,
        }
    }

    fn window_for(&self, override_window: Option<u64>) -> u64 {
        override_window.unwrap_or(self.redis_config.aggregation.window_seconds_default)
    }

    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        if let Err(e) = self.store.ensure_consumer_group(&self.chat_id).await {
            tracing::error!(chat = %self.chat_id, error = %e, "failed to ensure consumer group");
        }

        let consumer_name = format!("worker-{}", self.chat_id);

        loop {
            if *stop.borrow() {
                break;
            }

            let read = tokio::select! {
                _ = stop.changed() => break,
                read = self.store.read_new_raw(
                    &self.chat_id,
                    &consumer_name,
                    self.redis_config.worker.max_batch,
                    self.redis_config.worker.block_ms,
                ) => read,
            };

            match read {
                Ok(entries) => {
                    for (id, event) in entries {
                        let window_override = self.store.get_window(&self.chat_id).await.ok().flatten();
                        let window_s = self.window_for(window_override);
                        match self
                            .aggregator
                            .process_message(&self.chat_id, event, window_s)
                            .await
                        {
                            Ok(()) => {
                                if let Err(e) = self.store.ack_raw(&self.chat_id, &id).await {
                                    tracing::error!(chat = %self.chat_id, id = %id, error = %e, "ack failed");
                                }
                            }
                            Err(e) => {
                                // Leave the entry unacked so it's redelivered (§7: at-least-once).
                                tracing::error!(chat = %self.chat_id, id = %id, error = %e, "process_message failed, will retry");
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(chat = %self.chat_id, error = %e, "raw stream read failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        tracing::info!(chat = %self.chat_id, "worker stopped");
    }
}
