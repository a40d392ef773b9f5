// src/outbound/mod.rs
// Outbound HTTP gateway client ("Kafka Sender") and its two text templates
// (§6). Grounded in the original `ProducerPinokIO.send_message` /
// `send_silence_notification` and `post_httpx_request`.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SendKafkaRequest<'a> {
    chats__id: &'a str,
    thread_id: Option<()>,
    text_histories__text: String,
    users__id: &'a str,
}

pub struct KafkaSenderClient {
    client: Client,
    base_url: String,
    bearer_token: String,
    default_user_id_bot: String,
}

impl KafkaSenderClient {
    pub fn new(base_url: String, bearer_token: String, default_user_id_bot: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            bearer_token,
            default_user_id_bot,
        }
    }

    /// Logged-only failure policy (§7): callers never retry and always
    /// proceed with their own bookkeeping (e.g. deleting the final message)
    /// regardless of whether delivery succeeded.
    pub async fn send(&self, kind: &'static str, chat_id: &str, text: String) -> anyhow::Result<()> {
        let result = self.send_inner(chat_id, text).await;
        crate::metrics::record_outbound_send(kind, result.is_ok());
        result
    }

    async fn send_inner(&self, chat_id: &str, text: String) -> anyhow::Result<()> {
        let body = SendKafkaRequest {
            chats__id: chat_id,
            thread_id: None,
            text_histories__text: text,
            users__id: &self.default_user_id_bot,
        };

        let response = self
            .client
            .post(format!("{}/send_kafka", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.bearer_token)
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("kafka-sender responded {status}: {body}");
        }
        Ok(())
    }
}

/// `"[PINOKIO] [{input_chat_name}] Напоминание для {whitelist}: \n..."`.
/// `whitelist` entries already carry their own `@` prefix (config stores
/// them that way, per Scenario 1's `whitelist=["@opA"]`).
pub fn render_reminder(
    input_chat_name: &str,
    whitelist: &[String],
    username: &str,
    age_seconds: u64,
    message_timeout: u64,
    text: &str,
) -> String {
    let mentions = whitelist.join(" ");
    format!(
        "[PINOKIO] [{input_chat_name}] Напоминание для {mentions}: \n\
         Сообщение от @{username} висит уже {age_seconds} секунд (таймаут {message_timeout}):\n\n\
         Текст сообщения:  \n{text}\n"
    )
}

/// `"[PINOKIO] [{input_chat_name}] Уведомление о тишине! \n..."`
pub fn render_silence_notification(input_chat_name: &str, silence_timeout: u64) -> String {
    format!(
        "[PINOKIO] [{input_chat_name}] Уведомление о тишине! \n\
         Во входящем чате нет сообщений в очереди уже {silence_timeout} секунд.\n\
         Возможно, стоит проверить активность в чате."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_template_matches_spec() {
        let rendered = render_reminder("Shop A", &["@opA".to_string()], "merchant1", 45, 30, "when will it ship?");
        assert!(rendered.starts_with("[PINOKIO] [Shop A] Напоминание для @opA: \n"));
        assert!(rendered.contains("Сообщение от @merchant1 висит уже 45 секунд (таймаут 30):"));
        assert!(rendered.ends_with("Текст сообщения:  \nwhen will it ship?\n"));
    }

    #[test]
    fn silence_template_matches_spec() {
        let rendered = render_silence_notification("Shop A", 90);
        assert!(rendered.starts_with("[PINOKIO] [Shop A] Уведомление о тишине! \n"));
        assert!(rendered.contains("уже 90 секунд"));
    }
}
