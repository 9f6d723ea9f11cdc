use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

mod types;

pub use types::{BotIdentity, Chat, Message, TitleAck, Update, WebhookInfo};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

// Padding added on top of the server-side long-poll timeout so the
// HTTP request never gives up before the server answers.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TelegramGateway {
    client: Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl TelegramGateway {
    pub fn new(token: &str, timeout_ms: u64) -> Result<Self> {
        Self::with_api_base(token, TELEGRAM_API_BASE, timeout_ms)
    }

    pub fn with_api_base(token: &str, api_base: &str, timeout_ms: u64) -> Result<Self> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            bail!("telegram bot token is empty");
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .default_headers(headers)
            .build()
            .with_context(|| "failed to build telegram HTTP client")?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: trimmed.to_string(),
        })
    }

    pub fn get_me(&self) -> Result<BotIdentity> {
        self.call("getMe", &json!({}))
    }

    pub fn get_chat(&self, chat_id: i64) -> Result<Chat> {
        self.call("getChat", &json!({ "chat_id": chat_id }))
    }

    pub fn get_chat_member_count(&self, chat_id: i64) -> Result<u64> {
        self.call("getChatMemberCount", &json!({ "chat_id": chat_id }))
    }

    pub fn set_chat_title(&self, chat_id: i64, title: &str) -> Result<TitleAck> {
        let result: Value = self.call(
            "setChatTitle",
            &json!({ "chat_id": chat_id, "title": title }),
        )?;
        Ok(TitleAck {
            applied: result == Value::Bool(true),
        })
    }

    pub fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<Value> {
        self.call(
            "deleteMessage",
            &json!({ "chat_id": chat_id, "message_id": message_id }),
        )
    }

    /// Blocking pull of pending updates. `timeout_secs` is the
    /// server-side long-poll timeout; zero means a short poll.
    pub fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call_with_timeout(
            "getUpdates",
            &json!({ "offset": offset, "timeout": timeout_secs }),
            Some(Duration::from_secs(timeout_secs) + LONG_POLL_GRACE),
        )
    }

    pub fn delete_webhook(&self, drop_pending_updates: bool) -> Result<Value> {
        self.call(
            "deleteWebhook",
            &json!({ "drop_pending_updates": drop_pending_updates }),
        )
    }

    pub fn set_webhook(&self, url: &str) -> Result<Value> {
        self.call("setWebhook", &json!({ "url": url }))
    }

    pub fn get_webhook_info(&self) -> Result<WebhookInfo> {
        self.call("getWebhookInfo", &json!({}))
    }

    /// Clears any previously registered webhook, registers
    /// `<base_url>/<token>` as the delivery endpoint, and validates the
    /// registration. Returns the local route path the listener must
    /// serve. Every failure here is a startup-fatal error.
    pub fn register_webhook(&self, base_url: &str) -> Result<String> {
        self.delete_webhook(false)
            .with_context(|| "failed to clear existing webhook")?;
        tracing::info!("cleared previously registered webhook");

        let mut endpoint = Url::parse(base_url)
            .with_context(|| format!("invalid webhook base url: {base_url}"))?;
        endpoint.set_path(&self.token);
        self.set_webhook(endpoint.as_str())
            .with_context(|| "failed to register webhook")?;

        let info = self.get_webhook_info()?;
        if info.last_error_date.unwrap_or(0) != 0 {
            bail!(
                "webhook registration reported an error: {}",
                info.last_error_message.unwrap_or_default()
            );
        }
        tracing::info!(url = %endpoint, "registered webhook");

        Ok(format!("/{}", self.token))
    }

    fn call<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T> {
        self.call_with_timeout(method, payload, None)
    }

    fn call_with_timeout<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let mut request = self
            .client
            .post(format!("{}/bot{}/{method}", self.api_base, self.token))
            .json(payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .with_context(|| format!("failed to call telegram {method}"))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("telegram {method} failed: {} {}", status.as_u16(), body);
        }
        let envelope = response
            .json::<ApiEnvelope<T>>()
            .with_context(|| format!("failed to parse telegram {method} response"))?;
        if !envelope.ok {
            bail!(
                "telegram {method} returned ok=false: {}",
                envelope.description.unwrap_or_default()
            );
        }
        envelope
            .result
            .ok_or_else(|| anyhow!("telegram {method} returned ok with no result"))
    }
}

#[cfg(test)]
mod tests {
    use super::TelegramGateway;

    #[test]
    fn rejects_empty_token() {
        assert!(TelegramGateway::new("", 1_000).is_err());
        assert!(TelegramGateway::new("   ", 1_000).is_err());
    }
}
