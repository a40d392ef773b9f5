// src/ingress/mod.rs
// Component G — the inbound event dispatcher. Grounded in the original
// `process_request` handler's step sequence, with the HTTP shell left to
// `api::http` (component H) and this module owning only the decision logic.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::config::{ChatsConfig, EngineConfig};
use crate::llm::{LlmClient, LlmError};
use crate::monitor::SilenceClock;
use crate::persistence::{Persistence, RawEvent, UserType};
use crate::utils::{now_ts, should_process_by_time};
use crate::worker::registry::WorkerRegistry;

/// Inbound event body (§6). Field names mirror the upstream source's
/// `table__column` flattening; unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingFromMsRequest {
    #[serde(rename = "messages__id")]
    pub messages_id: String,
    #[serde(rename = "messages__user_id")]
    pub user_id: String,
    #[serde(rename = "messages__date")]
    pub date: String,
    #[serde(rename = "text_histories__id")]
    pub text_histories_id: String,
    #[serde(rename = "messages__chat_id")]
    pub chat_id: String,
    #[serde(rename = "messages__parent_message_id", default)]
    pub parent_message_id: Option<String>,
    #[serde(rename = "messages__username", default)]
    pub username: Option<String>,
    #[serde(rename = "text_histories__text", default)]
    pub text: Option<String>,
    #[serde(rename = "text_histories__change_id", default)]
    pub change_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IngressResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl IngressResponse {
    fn in_processing(id: String) -> Self {
        Self { status: "in_processing", reason: None, message_id: Some(id) }
    }

    fn ignored(reason: &'static str) -> Self {
        Self { status: "ignored", reason: Some(reason), message_id: None }
    }

    fn blocked(reason: &'static str) -> Self {
        Self { status: "blocked", reason: Some(reason), message_id: None }
    }
}

impl IntoResponse for IngressResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum IngressError {
    #[error("classification failed: {0}")]
    Classification(#[from] LlmError),
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "ingress request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub struct IngressRouter {
    store: Arc<dyn Persistence>,
    aggregator: Arc<Aggregator>,
    llm: Arc<LlmClient>,
    chats: Arc<ChatsConfig>,
    registry: Arc<WorkerRegistry>,
    silence_clock: SilenceClock,
    default_user_id_bot: String,
}

impl IngressRouter {
    pub fn new(
        store: Arc<dyn Persistence>,
        aggregator: Arc<Aggregator>,
        llm: Arc<LlmClient>,
        registry: Arc<WorkerRegistry>,
        silence_clock: SilenceClock,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            aggregator,
            llm,
            chats: Arc::new(config.chats.clone()),
            registry,
            silence_clock,
            default_user_id_bot: config.default_user_id_bot.clone(),
        }
    }

    /// §4.G, steps 1-8.
    pub async fn dispatch(&self, req: IncomingFromMsRequest) -> Result<IngressResponse, IngressError> {
        // 1. Chat known?
        let Some(chat) = self.chats.get(&req.chat_id).cloned() else {
            return Ok(IngressResponse::ignored("chat_not_found"));
        };

        // 2. Time window?
        if !should_process_by_time(&req.date, &chat.pinger) {
            return Ok(IngressResponse::blocked("time_blocked"));
        }

        // 3. Edit event?
        if req.change_id.is_some() {
            return Ok(IngressResponse::ignored("change_message"));
        }

        let now = now_ts();

        // 4. Silence clock refresh.
        if chat.silencer.enabled {
            self.silence_clock.write().await.insert(req.chat_id.clone(), now);
        }

        // 5. Ensure worker + window.
        self.store
            .set_window(&req.chat_id, chat.pinger.redis_buffer_window)
            .await?;
        self.registry.ensure_running(&req.chat_id).await;

        // 6. Classify user type.
        let is_whitelisted = req
            .username
            .as_deref()
            .map(|u| chat.pinger.whitelist.contains(&format!("@{u}")))
            .unwrap_or(false);
        let is_bot = req.user_id == self.default_user_id_bot;

        let user_type = if is_whitelisted || is_bot {
            if is_bot && !chat.pinger.bot_enabled {
                return Ok(IngressResponse::ignored("bot_disabled"));
            }
            UserType::Pp
        } else {
            UserType::Merchant
        };

        let text = req.text.clone().unwrap_or_default();
        let username = req.username.clone().unwrap_or_default();

        let _ = chat;
        match user_type {
            UserType::Merchant => self.merchant_path(&req, username, text).await,
            UserType::Pp => self.pp_path(&req, username, text).await,
        }
    }

    /// §4.G step 7.
    async fn merchant_path(
        &self,
        req: &IncomingFromMsRequest,
        username: String,
        text: String,
    ) -> Result<IngressResponse, IngressError> {
        if let Some(series) = self.store.get_series(&req.chat_id).await? {
            if series.user_id == req.user_id {
                let id = self.append_raw(req, UserType::Merchant, username, text).await?;
                return Ok(IngressResponse::in_processing(id));
            }
        }

        if let Some(id) = self
            .aggregator
            .append_to_last_long(&req.chat_id, &req.user_id, &username, &text)
            .await?
        {
            return Ok(IngressResponse::in_processing(id));
        }

        let classification = self.llm.classify(&text).await?;
        if !classification.needs_response() {
            return Ok(IngressResponse::ignored("no_response_needed"));
        }

        let id = self.append_raw(req, UserType::Merchant, username, text).await?;
        Ok(IngressResponse::in_processing(id))
    }

    /// §4.G step 8.
    async fn pp_path(
        &self,
        req: &IncomingFromMsRequest,
        username: String,
        text: String,
    ) -> Result<IngressResponse, IngressError> {
        let raw_id = self.append_raw(req, UserType::Pp, username, text.clone()).await?;

        if let Some(parent_id) = &req.parent_message_id {
            let finals = self.store.list_final(&req.chat_id, 100).await?;
            if let Some(parent) = finals.into_iter().find(|m| &m.messages_id == parent_id) {
                self.store.delete_final(&req.chat_id, &parent.stream_id).await?;
            }
            // Deleted unconditionally even if no matching parent was found
            // (§9, preserved deliberately).
            self.store.delete_raw(&req.chat_id, &raw_id).await?;
            return Ok(IngressResponse::in_processing(raw_id));
        }

        self.store.delete_raw(&req.chat_id, &raw_id).await?;

        let finals = self.store.list_final(&req.chat_id, 50).await?;
        let candidates: Vec<(String, String)> = finals
            .into_iter()
            .filter(|m| m.user_type == UserType::Merchant)
            .map(|m| (m.stream_id, m.text))
            .collect();

        if let Some(matched_id) = self.llm.match_answer(&candidates, &text).await {
            self.store.delete_final(&req.chat_id, &matched_id).await?;
        }

        Ok(IngressResponse::in_processing(raw_id))
    }

    async fn append_raw(
        &self,
        req: &IncomingFromMsRequest,
        user_type: UserType,
        username: String,
        text: String,
    ) -> anyhow::Result<String> {
        let event = RawEvent {
            messages_id: req.messages_id.clone(),
            user_id: req.user_id.clone(),
            username,
            user_type,
            text,
            timestamp: now_ts(),
        };
        self.store.append_raw(&req.chat_id, &event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChatConfig, PingerConfig, PromptsConfig, SilencerConfig};
    use crate::persistence::memory_store::MemoryPersistence;
    use std::collections::{HashMap as StdHashMap, HashSet};

    fn prompts() -> PromptsConfig {
        PromptsConfig {
            system_prompt: "classify".into(),
            classification_schema: crate::llm::schema::default_classification_schema(),
            qa_link_system_prompt: "match".into(),
            qa_link_schema: crate::llm::schema::default_qa_link_schema(),
        }
    }

    fn router(chats: StdHashMap<String, ChatConfig>) -> (IngressRouter, Arc<MemoryPersistence>) {
        let store = Arc::new(MemoryPersistence::new());
        let aggregator = Arc::new(Aggregator::new(store.clone()));
        // Never exercised on the paths under test here (whitelist/bot/time
        // gates all short-circuit before an LLM call).
        let llm = Arc::new(LlmClient::new(
            "http://127.0.0.1:1".into(),
            "key".into(),
            "model".into(),
            prompts(),
        ));
        let registry = Arc::new(WorkerRegistry::new(store.clone(), aggregator.clone(), test_redis_config()));
        let silence_clock: SilenceClock = Arc::new(tokio::sync::RwLock::new(StdHashMap::new()));

        let r = IngressRouter {
            store: store.clone(),
            aggregator,
            llm,
            chats: Arc::new(ChatsConfig { chats }),
            registry,
            silence_clock,
            default_user_id_bot: "BOT".into(),
        };
        (r, store)
    }

    fn test_redis_config() -> crate::config::RedisConfig {
        crate::config::RedisConfig {
            connection: crate::config::redis::RedisConnection {
                host: "localhost".into(),
                port: 6379,
                db: 0,
                password: None,
            },
            keys: crate::config::redis::KeyTemplates {
                raw_stream: "raw:{chat_id}".into(),
                final_stream: "final:{chat_id}".into(),
                agg_hash: "agg:{chat_id}".into(),
                sched_zset: "sched".into(),
                conf_hash: "conf:{chat_id}".into(),
                metrics_hash: "metrics:{chat_id}".into(),
            },
            aggregation: crate::config::redis::AggregationConfig {
                window_seconds_default: 2,
                group_name: "pinokio-workers".into(),
            },
            worker: crate::config::redis::WorkerConfig { max_batch: 64, block_ms: 5000 },
            scheduler: crate::config::redis::SchedulerConfig { interval_ms: 200 },
        }
    }

    fn whitelisted_chat() -> ChatConfig {
        ChatConfig {
            input_chat_name: "Shop A".into(),
            pinger: PingerConfig {
                whitelist: HashSet::from(["@opA".to_string()]),
                bot_enabled: true,
                message_timeout: 30,
                redis_buffer_window: 2,
                output_chat_id: None,
                enabled: true,
                start_time: None,
                end_time: None,
                days: None,
            },
            silencer: SilencerConfig::default(),
        }
    }

    fn req(chat_id: &str, user_id: &str, username: Option<&str>) -> IncomingFromMsRequest {
        IncomingFromMsRequest {
            messages_id: "m1".into(),
            user_id: user_id.into(),
            date: "2025-01-20 10:00:00".into(),
            text_histories_id: "t1".into(),
            chat_id: chat_id.into(),
            parent_message_id: None,
            username: username.map(|s| s.to_string()),
            text: Some("hello".into()),
            change_id: None,
        }
    }

    #[tokio::test]
    async fn scenario_whitelist_classification() {
        let mut chats = StdHashMap::new();
        chats.insert("chat1".to_string(), whitelisted_chat());
        let (router, _store) = router(chats);

        let response = router
            .dispatch(req("chat1", "U1", Some("opA")))
            .await
            .unwrap();
        assert_eq!(response.status, "in_processing");
        assert!(response.message_id.is_some());
    }

    #[tokio::test]
    async fn scenario_bot_disabled() {
        let mut chat = whitelisted_chat();
        chat.pinger.bot_enabled = false;
        let mut chats = StdHashMap::new();
        chats.insert("chat1".to_string(), chat);
        let (router, _store) = router(chats);

        let response = router
            .dispatch(req("chat1", "BOT", None))
            .await
            .unwrap();
        assert_eq!(response.status, "ignored");
        assert_eq!(response.reason, Some("bot_disabled"));
    }

    #[tokio::test]
    async fn scenario_time_blocked() {
        let mut chat = whitelisted_chat();
        chat.pinger.start_time = Some("09:00".into());
        chat.pinger.end_time = Some("17:00".into());
        chat.pinger.days = Some(HashSet::from(["mon".into(), "tue".into(), "wed".into(), "thu".into(), "fri".into()]));
        let mut chats = StdHashMap::new();
        chats.insert("chat1".to_string(), chat);
        let (router, _store) = router(chats);

        let mut r = req("chat1", "U1", Some("opA"));
        r.date = "2025-01-18 10:00:00".into(); // Saturday
        let response = router.dispatch(r).await.unwrap();
        assert_eq!(response.status, "blocked");
        assert_eq!(response.reason, Some("time_blocked"));
    }

    #[tokio::test]
    async fn chat_unknown_is_ignored() {
        let (router, _store) = router(StdHashMap::new());
        let response = router.dispatch(req("missing", "U1", None)).await.unwrap();
        assert_eq!(response.status, "ignored");
        assert_eq!(response.reason, Some("chat_not_found"));
    }

    #[tokio::test]
    async fn edit_event_is_ignored() {
        let mut chats = StdHashMap::new();
        chats.insert("chat1".to_string(), whitelisted_chat());
        let (router, _store) = router(chats);

        let mut r = req("chat1", "U1", Some("opA"));
        r.change_id = Some("edit-1".into());
        let response = router.dispatch(r).await.unwrap();
        assert_eq!(response.status, "ignored");
        assert_eq!(response.reason, Some("change_message"));
    }

    #[tokio::test]
    async fn pp_reply_deletes_parent_final_even_with_no_match() {
        let mut chats = StdHashMap::new();
        chats.insert("chat1".to_string(), whitelisted_chat());
        let (router, store) = router(chats);

        store
            .append_final(
                "chat1",
                &crate::persistence::FinalMessage {
                    stream_id: String::new(),
                    user_id: "U1".into(),
                    messages_id: "parent-1".into(),
                    username: "merchant1".into(),
                    user_type: UserType::Merchant,
                    text: "when is payment?".into(),
                    start_ts: 0.0,
                    end_ts: 0.0,
                    count: 1,
                },
            )
            .await
            .unwrap();

        let mut r = req("chat1", "U1", Some("opA"));
        r.parent_message_id = Some("parent-1".into());
        let response = router.dispatch(r).await.unwrap();
        assert_eq!(response.status, "in_processing");

        let finals = store.list_final("chat1", 10).await.unwrap();
        assert!(finals.is_empty(), "replying to the parent resolves its question");
        let raw = store.read_new_raw("chat1", "c", 10, 0).await.unwrap();
        assert!(raw.is_empty(), "the PP raw is deleted once the reply is processed");
    }

    #[tokio::test]
    async fn pp_reply_to_missing_parent_still_deletes_raw() {
        let mut chats = StdHashMap::new();
        chats.insert("chat1".to_string(), whitelisted_chat());
        let (router, store) = router(chats);

        let mut r = req("chat1", "U1", Some("opA"));
        r.parent_message_id = Some("does-not-exist".into());
        let response = router.dispatch(r).await.unwrap();
        assert_eq!(response.status, "in_processing");

        let raw = store.read_new_raw("chat1", "c", 10, 0).await.unwrap();
        assert!(raw.is_empty(), "§9: the raw is deleted unconditionally, even without a matching parent");
    }
}
