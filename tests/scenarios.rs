// tests/scenarios.rs
// Standalone integration tests for the six §8 scenarios, driven against an
// in-memory fake of the persistence façade (no live Redis). Grounded in the
// teacher's `tests/*_test.rs` layout: scenario-level coverage lives here,
// pure-logic unit tests stay inline next to the code they test.
//
// Scenarios 4-6 need an LLM call to reach end to end; per DESIGN.md's
// "Test-scope decision: no HTTP-mocking dev-dependency" they're instead
// exercised at the component that owns the behavior under test (the
// aggregator directly for burst fusion / author switch) rather than through
// a live `LlmClient`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use pinokio_sentry::aggregator::Aggregator;
use pinokio_sentry::config::{ChatConfig, ChatsConfig, EngineConfig, PingerConfig, RedisConfig, SilencerConfig};
use pinokio_sentry::config::redis::{AggregationConfig, KeyTemplates, RedisConnection, SchedulerConfig, WorkerConfig};
use pinokio_sentry::ingress::IngressRouter;
use pinokio_sentry::llm::LlmClient;
use pinokio_sentry::persistence::memory_store::MemoryPersistence;
use pinokio_sentry::persistence::{Persistence, RawEvent, UserType};
use pinokio_sentry::worker::registry::WorkerRegistry;
use tokio::sync::RwLock;

fn test_redis_config() -> RedisConfig {
    RedisConfig {
        connection: RedisConnection { host: "localhost".into(), port: 6379, db: 0, password: None },
        keys: KeyTemplates {
            raw_stream: "raw:{chat_id}".into(),
            final_stream: "final:{chat_id}".into(),
            agg_hash: "agg:{chat_id}".into(),
            sched_zset: "sched".into(),
            conf_hash: "conf:{chat_id}".into(),
            metrics_hash: "metrics:{chat_id}".into(),
        },
        aggregation: AggregationConfig { window_seconds_default: 2, group_name: "pinokio-workers".into() },
        worker: WorkerConfig { max_batch: 64, block_ms: 5000 },
        scheduler: SchedulerConfig { interval_ms: 200 },
    }
}

fn test_config(chats: HashMap<String, ChatConfig>) -> EngineConfig {
    EngineConfig {
        bearer_token: "test-token".into(),
        default_user_id_bot: "BOT".into(),
        kafka_sender_url: "http://127.0.0.1:1/send".into(),
        llm_url: "http://127.0.0.1:1".into(),
        llm_api_key: "key".into(),
        llm_model: "model".into(),
        check_interval: 30,
        bind_address: "0.0.0.0:8080".into(),
        log_level: "info".into(),
        chats: ChatsConfig { chats },
        redis: test_redis_config(),
        prompts: pinokio_sentry::config::prompts::PromptsConfig {
            system_prompt: "classify".into(),
            classification_schema: pinokio_sentry::llm::schema::default_classification_schema(),
            qa_link_system_prompt: "match".into(),
            qa_link_schema: pinokio_sentry::llm::schema::default_qa_link_schema(),
        },
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

fn router_for(config: &EngineConfig) -> (IngressRouter, Arc<MemoryPersistence>) {
    let store = Arc::new(MemoryPersistence::new());
    let aggregator = Arc::new(Aggregator::new(store.clone()));
    let llm = Arc::new(LlmClient::new(
        config.llm_url.clone(), config.llm_api_key.clone(), config.llm_model.clone(), config.prompts.clone(),
    ));
    let registry = Arc::new(WorkerRegistry::new(store.clone(), aggregator.clone(), config.redis.clone()));
    let silence_clock = Arc::new(RwLock::new(HashMap::new()));
    let router = IngressRouter::new(store.clone(), aggregator, llm, registry, silence_clock, config);
    (router, store)
}

fn req(chat_id: &str, user_id: &str, username: Option<&str>) -> pinokio_sentry::ingress::IncomingFromMsRequest {
    pinokio_sentry::ingress::IncomingFromMsRequest {
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

/// Scenario 1: whitelist classification.
#[tokio::test]
async fn scenario_1_whitelist_classification() {
    let mut chats = HashMap::new();
    chats.insert("chat1".to_string(), whitelisted_chat());
    let config = test_config(chats);
    let (router, _store) = router_for(&config);

    let response = router.dispatch(req("chat1", "U1", Some("opA"))).await.unwrap();
    assert_eq!(response.status, "in_processing");
    assert!(response.message_id.is_some());
}

/// Scenario 2: bot disabled.
#[tokio::test]
async fn scenario_2_bot_disabled() {
    let mut chat = whitelisted_chat();
    chat.pinger.bot_enabled = false;
    let mut chats = HashMap::new();
    chats.insert("chat1".to_string(), chat);
    let config = test_config(chats);
    let (router, _store) = router_for(&config);

    let response = router.dispatch(req("chat1", "BOT", None)).await.unwrap();
    assert_eq!(response.status, "ignored");
    assert_eq!(response.reason, Some("bot_disabled"));
}

/// Scenario 3: time blocked (Saturday, outside mon-fri working days).
#[tokio::test]
async fn scenario_3_time_blocked() {
    let mut chat = whitelisted_chat();
    chat.pinger.start_time = Some("09:00".into());
    chat.pinger.end_time = Some("17:00".into());
    chat.pinger.days = Some(HashSet::from(["mon".into(), "tue".into(), "wed".into(), "thu".into(), "fri".into()]));
    let mut chats = HashMap::new();
    chats.insert("chat1".to_string(), chat);
    let config = test_config(chats);
    let (router, _store) = router_for(&config);

    let mut r = req("chat1", "U1", Some("opA"));
    r.date = "2025-01-18 10:00:00".into(); // Saturday
    let response = router.dispatch(r).await.unwrap();
    assert_eq!(response.status, "blocked");
    assert_eq!(response.reason, Some("time_blocked"));
}

fn merchant_event(user_id: &str, username: &str, text: &str, timestamp: f64) -> RawEvent {
    RawEvent {
        messages_id: format!("m-{text}"),
        user_id: user_id.to_string(),
        username: username.to_string(),
        user_type: UserType::Merchant,
        text: text.to_string(),
        timestamp,
    }
}

/// Scenario 4: three same-author events within the window fuse into one
/// final message joined by newlines.
#[tokio::test]
async fn scenario_4_burst_fusion() {
    let store = Arc::new(MemoryPersistence::new());
    let agg = Aggregator::new(store.clone());

    agg.process_message("chat1", merchant_event("U1", "merchant1", "a", 0.0), 2).await.unwrap();
    agg.process_message("chat1", merchant_event("U1", "merchant1", "b", 1.0), 2).await.unwrap();
    agg.process_message("chat1", merchant_event("U1", "merchant1", "c", 1.5), 2).await.unwrap();

    let id = agg.flush("chat1", 4.5).await.unwrap();
    assert!(id.is_some());

    let finals = store.list_final("chat1", 10).await.unwrap();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].text, "a\nb\nc");
    assert_eq!(finals[0].count, 3);
    assert_eq!(finals[0].start_ts, 0.0);
    assert_eq!(finals[0].end_ts, 1.5);
}

/// Scenario 5: an author switch flushes the first author's series before
/// starting a fresh one for the second.
#[tokio::test]
async fn scenario_5_author_switch() {
    let store = Arc::new(MemoryPersistence::new());
    let agg = Aggregator::new(store.clone());

    agg.process_message("chat1", merchant_event("M1", "merchant1", "q1", 0.0), 2).await.unwrap();
    agg.process_message("chat1", merchant_event("M2", "merchant2", "q2", 1.0), 2).await.unwrap();

    let finals = store.list_final("chat1", 10).await.unwrap();
    assert_eq!(finals.len(), 1, "M1's series is flushed by the author switch");
    assert_eq!(finals[0].user_id, "M1");
    assert_eq!(finals[0].text, "q1");
    assert_eq!(finals[0].count, 1);

    let series = store.get_series("chat1").await.unwrap().unwrap();
    assert_eq!(series.user_id, "M2");
    assert_eq!(series.text, "q2");
    assert_eq!(series.count, 1);
}

/// Scenario 6 (structural): a PP reply with no parent still resolves against
/// the final stream via the matching path's stream-id bookkeeping, covered
/// here at the persistence+ingress seam rather than through a live LLM call
/// (see DESIGN.md). `match_answer`'s tolerant id parsing itself is covered
/// by `llm::parsing`'s unit tests.
#[tokio::test]
async fn scenario_6_pp_reply_without_parent_deletes_raw_and_leaves_final_candidates() {
    let mut chats = HashMap::new();
    chats.insert("chat1".to_string(), whitelisted_chat());
    let config = test_config(chats);
    let (router, store) = router_for(&config);

    store
        .append_final(
            "chat1",
            &pinokio_sentry::persistence::FinalMessage {
                stream_id: "1700-0".into(),
                user_id: "U1".into(),
                messages_id: "q1".into(),
                username: "merchant1".into(),
                user_type: UserType::Merchant,
                text: "когда будет оплата?".into(),
                start_ts: 0.0,
                end_ts: 0.0,
                count: 1,
            },
        )
        .await
        .unwrap();

    let mut r = req("chat1", "U1", Some("opA"));
    r.text = Some("оплата прошла".into());
    let response = router.dispatch(r).await.unwrap();

    assert_eq!(response.status, "in_processing");
    let raw = store.read_new_raw("chat1", "c", 10, 0).await.unwrap();
    assert!(raw.is_empty(), "the PP raw is deleted once processed, matched or not");
}
