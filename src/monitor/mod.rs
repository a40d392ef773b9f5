// src/monitor/mod.rs
// Component E — the global escalation monitor: silence detection and
// message-timeout reminders. Grounded in the original monitor loop's
// silence/reminder branches, structured as a second `tokio::select!`-based
// background task alongside the deadline scheduler (§4.E).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{self, MissedTickBehavior};

use crate::config::{ChatsConfig, EngineConfig};
use crate::outbound::{render_reminder, render_silence_notification, KafkaSenderClient};
use crate::persistence::{Persistence, UserType};
use crate::utils::{now_ts, should_process_by_time};
use crate::worker::registry::WorkerRegistry;

/// `chat_id -> last time activity (or a silence notification) was observed`.
/// Process-local and intentionally unpersisted (§9): a restart resets
/// silence detection. Shared between this monitor and ingress, which is why
/// it lives behind its own lock rather than inside either component.
pub type SilenceClock = Arc<RwLock<HashMap<String, f64>>>;

pub struct EscalationMonitor {
    store: Arc<dyn Persistence>,
    outbound: Arc<KafkaSenderClient>,
    chats: Arc<ChatsConfig>,
    registry: Arc<WorkerRegistry>,
    silence_clock: SilenceClock,
    check_interval_secs: u64,
}

impl EscalationMonitor {
    pub fn new(
        store: Arc<dyn Persistence>,
        outbound: Arc<KafkaSenderClient>,
        chats: Arc<ChatsConfig>,
        registry: Arc<WorkerRegistry>,
        silence_clock: SilenceClock,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            outbound,
            chats,
            registry,
            silence_clock,
            check_interval_secs: config.check_interval,
        }
    }

    /// One tick of §4.E: iterate every configured chat whose worker is
    /// running and run the silence and reminder branches.
    pub async fn tick(&self) {
        let now = now_ts();
        for (chat_id, chat_config) in self.chats.chats.iter() {
            if !self.registry.is_running(chat_id).await {
                continue;
            }

            let merchant_finals = match self.store.list_final(chat_id, 50).await {
                Ok(finals) => finals
                    .into_iter()
                    .filter(|m| m.user_type == UserType::Merchant)
                    .collect::<Vec<_>>(),
                Err(e) => {
                    tracing::error!(chat = %chat_id, error = %e, "monitor failed to list finals");
                    continue;
                }
            };

            if chat_config.silencer.enabled {
                self.silence_branch(chat_id, &chat_config.silencer, &chat_config.pinger, &merchant_finals, now)
                    .await;
            }

            self.reminder_branch(chat_id, &chat_config.pinger, &merchant_finals, now).await;
        }
    }

    async fn silence_branch(
        &self,
        chat_id: &str,
        silencer: &crate::config::SilencerConfig,
        pinger: &crate::config::PingerConfig,
        merchant_finals: &[crate::persistence::FinalMessage],
        now: f64,
    ) {
        // Reuse the ingress gate; silence notifications only fire during
        // working hours (§4.E step 2).
        let message_time = chrono::DateTime::<chrono::Utc>::from_timestamp(now as i64, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        if !should_process_by_time(&message_time, pinger) {
            return;
        }

        let mut clock = self.silence_clock.write().await;
        if !merchant_finals.is_empty() {
            clock.insert(chat_id.to_string(), now);
            return;
        }

        let last = clock.get(chat_id).copied();
        if let Some(last) = last {
            if now - last > silencer.silence_timeout as f64 {
                let input_chat_name = self
                    .chats
                    .get(chat_id)
                    .map(|c| c.input_chat_name.clone())
                    .unwrap_or_else(|| chat_id.to_string());
                let text = render_silence_notification(&input_chat_name, silencer.silence_timeout);
                if let Err(e) = self.outbound.send("silence", chat_id, text).await {
                    tracing::error!(chat = %chat_id, error = %e, "silence notification delivery failed");
                }
                clock.insert(chat_id.to_string(), now);
            }
        }
    }

    /// Unconditional even outside working hours (§9, preserved deliberately).
    async fn reminder_branch(
        &self,
        chat_id: &str,
        pinger: &crate::config::PingerConfig,
        merchant_finals: &[crate::persistence::FinalMessage],
        now: f64,
    ) {
        let input_chat_name = self
            .chats
            .get(chat_id)
            .map(|c| c.input_chat_name.clone())
            .unwrap_or_else(|| chat_id.to_string());
        let whitelist: Vec<String> = pinger.whitelist.iter().cloned().collect();

        for m in merchant_finals {
            let age = now - m.end_ts;
            if age <= pinger.message_timeout as f64 {
                continue;
            }
            let text = render_reminder(
                &input_chat_name,
                &whitelist,
                &m.username,
                age as u64,
                pinger.message_timeout,
                &m.text,
            );
            if let Err(e) = self.outbound.send("reminder", chat_id, text).await {
                tracing::error!(chat = %chat_id, error = %e, "reminder delivery failed");
            }
            // At-most-once reminder per final message (§7): the message is
            // removed regardless of delivery outcome.
            if let Err(e) = self.store.delete_final(chat_id, &m.stream_id).await {
                tracing::error!(chat = %chat_id, id = %m.stream_id, error = %e, "failed to delete reminded final");
            }
        }
    }

    /// Runs until `stop` fires, mirroring the deadline scheduler's
    /// cooperative shutdown idiom.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut interval = time::interval(Duration::from_secs(self.check_interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop.changed() => {
                    tracing::info!("escalation monitor stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}
