// src/state.rs
// Application state: the wiring point for every component, built once at
// startup and shared behind an `Arc` across the axum router and the
// background tasks. Grounded in the teacher's `AppState::new` sequencing
// (construct the store first, then the services layered on top).

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::aggregator::Aggregator;
use crate::config::EngineConfig;
use crate::ingress::IngressRouter;
use crate::llm::LlmClient;
use crate::monitor::SilenceClock;
use crate::outbound::KafkaSenderClient;
use crate::persistence::redis_store::RedisPersistence;
use crate::persistence::Persistence;
use crate::worker::registry::WorkerRegistry;

/// Application state shared across HTTP handlers and background tasks.
pub struct AppState {
    pub config: &'static EngineConfig,
    pub store: Arc<dyn Persistence>,
    pub aggregator: Arc<Aggregator>,
    pub llm: Arc<LlmClient>,
    pub outbound: Arc<KafkaSenderClient>,
    pub registry: Arc<WorkerRegistry>,
    pub silence_clock: SilenceClock,
    pub ingress: IngressRouter,
}

impl AppState {
    pub async fn new(config: &'static EngineConfig) -> anyhow::Result<Self> {
        info!("connecting to redis");
        let store: Arc<dyn Persistence> = Arc::new(RedisPersistence::connect(config.redis.clone()).await?);

        let aggregator = Arc::new(Aggregator::new(store.clone()));
        let llm = Arc::new(LlmClient::new(
            config.llm_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            config.prompts.clone(),
        ));
        let outbound = Arc::new(KafkaSenderClient::new(
            config.kafka_sender_url.clone(),
            config.bearer_token.clone(),
            config.default_user_id_bot.clone(),
        ));
        let registry = Arc::new(WorkerRegistry::new(store.clone(), aggregator.clone(), config.redis.clone()));
        let silence_clock: SilenceClock = Arc::new(RwLock::new(std::collections::HashMap::new()));

        let ingress = IngressRouter::new(
            store.clone(),
            aggregator.clone(),
            llm.clone(),
            registry.clone(),
            silence_clock.clone(),
            config,
        );

        info!("application state ready");
        Ok(Self {
            config,
            store,
            aggregator,
            llm,
            outbound,
            registry,
            silence_clock,
            ingress,
        })
    }
}
