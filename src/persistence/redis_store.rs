// src/persistence/redis_store.rs
// Concrete Persistence façade backed by Redis Streams/Hashes/Sorted-Sets.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Value};
use std::collections::HashMap;

use crate::config::RedisConfig;

use super::types::{FinalMessage, RawEvent, Series, UserType};
use super::Persistence;

pub struct RedisPersistence {
    manager: ConnectionManager,
    config: RedisConfig,
}

impl RedisPersistence {
    pub async fn connect(config: RedisConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(config.connection.to_url())?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager, config })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn field(v: &Value) -> anyhow::Result<String> {
    redis::from_redis_value(v).map_err(|e| anyhow::anyhow!("decoding stream field: {e}"))
}

fn raw_event_from_fields(map: &HashMap<String, Value>) -> anyhow::Result<RawEvent> {
    Ok(RawEvent {
        messages_id: map
            .get("messages_id")
            .map(field)
            .transpose()?
            .unwrap_or_default(),
        user_id: map.get("user_id").map(field).transpose()?.unwrap_or_default(),
        username: map.get("username").map(field).transpose()?.unwrap_or_default(),
        user_type: map
            .get("user_type")
            .map(field)
            .transpose()?
            .unwrap_or_else(|| "merchant".to_string())
            .parse()?,
        text: map.get("text").map(field).transpose()?.unwrap_or_default(),
        timestamp: map
            .get("timestamp")
            .map(field)
            .transpose()?
            .unwrap_or_else(|| "0".to_string())
            .parse()
            .unwrap_or(0.0),
    })
}

fn raw_event_items(event: &RawEvent) -> Vec<(&'static str, String)> {
    vec![
        ("messages_id", event.messages_id.clone()),
        ("user_id", event.user_id.clone()),
        ("username", event.username.clone()),
        ("user_type", event.user_type.to_string()),
        ("text", event.text.clone()),
        ("timestamp", event.timestamp.to_string()),
        ("type", "short".to_string()),
    ]
}

fn series_from_hash(h: &HashMap<String, String>) -> anyhow::Result<Option<Series>> {
    if h.is_empty() {
        return Ok(None);
    }
    Ok(Some(Series {
        user_id: h.get("user_id").cloned().unwrap_or_default(),
        messages_id: h.get("messages_id").cloned().unwrap_or_default(),
        username: h.get("username").cloned().unwrap_or_default(),
        user_type: h
            .get("user_type")
            .cloned()
            .unwrap_or_else(|| "merchant".to_string())
            .parse()?,
        text: h.get("text").cloned().unwrap_or_default(),
        start_ts: h
            .get("start_ts")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0),
        last_ts: h.get("last_ts").and_then(|v| v.parse().ok()).unwrap_or(0.0),
        count: h.get("count").and_then(|v| v.parse().ok()).unwrap_or(0),
    }))
}

fn series_items(s: &Series) -> Vec<(&'static str, String)> {
    vec![
        ("user_id", s.user_id.clone()),
        ("messages_id", s.messages_id.clone()),
        ("username", s.username.clone()),
        ("user_type", s.user_type.to_string()),
        ("text", s.text.clone()),
        ("start_ts", s.start_ts.to_string()),
        ("last_ts", s.last_ts.to_string()),
        ("count", s.count.to_string()),
    ]
}

fn final_from_fields(stream_id: String, map: &HashMap<String, Value>) -> anyhow::Result<FinalMessage> {
    Ok(FinalMessage {
        stream_id,
        user_id: map.get("user_id").map(field).transpose()?.unwrap_or_default(),
        messages_id: map
            .get("messages_id")
            .map(field)
            .transpose()?
            .unwrap_or_default(),
        username: map.get("username").map(field).transpose()?.unwrap_or_default(),
        user_type: map
            .get("user_type")
            .map(field)
            .transpose()?
            .unwrap_or_else(|| "merchant".to_string())
            .parse()?,
        text: map.get("text").map(field).transpose()?.unwrap_or_default(),
        start_ts: map
            .get("start_ts")
            .map(field)
            .transpose()?
            .unwrap_or_else(|| "0".to_string())
            .parse()
            .unwrap_or(0.0),
        end_ts: map
            .get("end_ts")
            .map(field)
            .transpose()?
            .unwrap_or_else(|| "0".to_string())
            .parse()
            .unwrap_or(0.0),
        count: map
            .get("count")
            .map(field)
            .transpose()?
            .unwrap_or_else(|| "0".to_string())
            .parse()
            .unwrap_or(0),
    })
}

fn final_items(m: &FinalMessage) -> Vec<(&'static str, String)> {
    vec![
        ("user_id", m.user_id.clone()),
        ("messages_id", m.messages_id.clone()),
        ("username", m.username.clone()),
        ("user_type", m.user_type.to_string()),
        ("text", m.text.clone()),
        ("start_ts", m.start_ts.to_string()),
        ("end_ts", m.end_ts.to_string()),
        ("count", m.count.to_string()),
        ("type", "long".to_string()),
    ]
}

#[async_trait]
impl Persistence for RedisPersistence {
    async fn append_raw(&self, chat: &str, event: &RawEvent) -> anyhow::Result<String> {
        let key = self.config.keys.raw_stream(chat);
        let items = raw_event_items(event);
        let id: String = self.conn().xadd(&key, "*", &items).await?;
        Ok(id)
    }

    async fn read_new_raw(
        &self,
        chat: &str,
        consumer: &str,
        max: usize,
        block_ms: usize,
    ) -> anyhow::Result<Vec<(String, RawEvent)>> {
        let key = self.config.keys.raw_stream(chat);
        let opts = StreamReadOptions::default()
            .group(&self.config.aggregation.group_name, consumer)
            .count(max)
            .block(block_ms);
        let reply: StreamReadReply = self.conn().xread_options(&[&key], &[">"], &opts).await?;

        let mut out = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                let event = raw_event_from_fields(&entry.map)?;
                out.push((entry.id, event));
            }
        }
        Ok(out)
    }

    async fn ack_raw(&self, chat: &str, id: &str) -> anyhow::Result<()> {
        let key = self.config.keys.raw_stream(chat);
        let _: () = self
            .conn()
            .xack(&key, &self.config.aggregation.group_name, &[id])
            .await?;
        Ok(())
    }

    async fn delete_raw(&self, chat: &str, id: &str) -> anyhow::Result<()> {
        let key = self.config.keys.raw_stream(chat);
        let _: () = self.conn().xdel(&key, &[id]).await?;
        Ok(())
    }

    async fn ensure_consumer_group(&self, chat: &str) -> anyhow::Result<()> {
        let key = self.config.keys.raw_stream(chat);
        let result: redis::RedisResult<()> = self
            .conn()
            .xgroup_create_mkstream(&key, &self.config.aggregation.group_name, "0-0")
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_series(&self, chat: &str) -> anyhow::Result<Option<Series>> {
        let key = self.config.keys.agg_hash(chat);
        let h: HashMap<String, String> = self.conn().hgetall(&key).await?;
        series_from_hash(&h)
    }

    async fn put_series(&self, chat: &str, series: &Series) -> anyhow::Result<()> {
        let key = self.config.keys.agg_hash(chat);
        let items = series_items(series);
        let _: () = self.conn().hset_multiple(&key, &items).await?;
        Ok(())
    }

    async fn delete_series(&self, chat: &str) -> anyhow::Result<()> {
        let key = self.config.keys.agg_hash(chat);
        let _: () = self.conn().del(&key).await?;
        Ok(())
    }

    async fn append_final(&self, chat: &str, msg: &FinalMessage) -> anyhow::Result<String> {
        let key = self.config.keys.final_stream(chat);
        let items = final_items(msg);
        let id: String = self.conn().xadd(&key, "*", &items).await?;
        Ok(id)
    }

    async fn list_final(&self, chat: &str, n: usize) -> anyhow::Result<Vec<FinalMessage>> {
        let key = self.config.keys.final_stream(chat);
        let reply: redis::streams::StreamRangeReply = self
            .conn()
            .xrevrange_count(&key, "+", "-", n)
            .await?;
        reply
            .ids
            .into_iter()
            .map(|entry| final_from_fields(entry.id, &entry.map))
            .collect()
    }

    async fn delete_final(&self, chat: &str, id: &str) -> anyhow::Result<()> {
        let key = self.config.keys.final_stream(chat);
        let _: () = self.conn().xdel(&key, &[id]).await?;
        Ok(())
    }

    async fn set_deadline(&self, chat: &str, ts: f64) -> anyhow::Result<()> {
        let _: () = self
            .conn()
            .zadd(&self.config.keys.sched_zset, chat, ts)
            .await?;
        Ok(())
    }

    async fn pop_expired(&self, now: f64, max: usize) -> anyhow::Result<Vec<String>> {
        let chats: Vec<String> = self
            .conn()
            .zrangebyscore_limit(&self.config.keys.sched_zset, 0.0, now, 0, max as isize)
            .await?;
        Ok(chats)
    }

    async fn remove_deadline(&self, chat: &str) -> anyhow::Result<()> {
        let _: () = self.conn().zrem(&self.config.keys.sched_zset, chat).await?;
        Ok(())
    }

    async fn list_deadlined_chats(&self) -> anyhow::Result<Vec<String>> {
        let chats: Vec<String> = self.conn().zrange(&self.config.keys.sched_zset, 0, -1).await?;
        Ok(chats)
    }

    async fn get_deadline(&self, chat: &str) -> anyhow::Result<Option<f64>> {
        let score: Option<f64> = self.conn().zscore(&self.config.keys.sched_zset, chat).await?;
        Ok(score)
    }

    async fn get_window(&self, chat: &str) -> anyhow::Result<Option<u64>> {
        let key = self.config.keys.conf_hash(chat);
        let v: Option<String> = self.conn().hget(&key, "window_seconds").await?;
        Ok(v.and_then(|s| s.parse().ok()))
    }

    async fn set_window(&self, chat: &str, seconds: u64) -> anyhow::Result<()> {
        let key = self.config.keys.conf_hash(chat);
        let _: () = self.conn().hset(&key, "window_seconds", seconds).await?;
        Ok(())
    }

    async fn increment_metric(&self, chat: &str, name: &str) -> anyhow::Result<()> {
        let key = self.config.keys.metrics_hash(chat);
        let _: i64 = self.conn().hincr(&key, name, 1).await?;
        Ok(())
    }

    async fn get_metrics(&self, chat: &str) -> anyhow::Result<HashMap<String, u64>> {
        let key = self.config.keys.metrics_hash(chat);
        let raw: HashMap<String, String> = self.conn().hgetall(&key).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(k, v)| v.parse().ok().map(|n| (k, n)))
            .collect())
    }

    async fn cleanup_chat(&self, chat: &str) -> anyhow::Result<()> {
        let keys = [
            self.config.keys.raw_stream(chat),
            self.config.keys.final_stream(chat),
            self.config.keys.agg_hash(chat),
            self.config.keys.conf_hash(chat),
            self.config.keys.metrics_hash(chat),
        ];
        for key in keys {
            let _: () = self.conn().del(&key).await?;
        }
        self.remove_deadline(chat).await?;
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<bool> {
        let pong: String = redis::cmd("PING").query_async(&mut self.conn()).await?;
        Ok(pong == "PONG")
    }
}
