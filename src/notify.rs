//! Outbound delivery of formatted alerts.
//!
//! Delivery is at-most-once: a failed dispatch is reported to the caller and
//! never retried here.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

pub const GREEN_API_DEFAULT_URL: &str = "https://api.green-api.com";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch(&self, text: &str) -> Result<()>;

    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// WhatsApp via Green API
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GreenApiPayload<'a> {
    #[serde(rename = "chatId")]
    chat_id: &'a str,
    message: &'a str,
}

pub struct GreenApiNotifier {
    http: HttpClient,
    base_url: String,
    instance: String,
    token: String,
    chat_id: String,
}

impl GreenApiNotifier {
    /// `number` may be a bare phone number or a full chat id (`...@c.us`,
    /// `...@g.us` for groups).
    pub fn new(
        http: HttpClient,
        base_url: impl Into<String>,
        instance: impl Into<String>,
        token: impl Into<String>,
        number: &str,
    ) -> Self {
        let number = number.trim().trim_start_matches('+');
        let chat_id = if number.contains('@') {
            number.to_string()
        } else {
            format!("{number}@c.us")
        };
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            instance: instance.into(),
            token: token.into(),
            chat_id,
        }
    }
}

#[async_trait]
impl Notifier for GreenApiNotifier {
    async fn dispatch(&self, text: &str) -> Result<()> {
        let url = format!(
            "{}/waInstance{}/sendMessage/{}",
            self.base_url, self.instance, self.token
        );
        let body = GreenApiPayload {
            chat_id: &self.chat_id,
            message: text,
        };
        let resp = self
            .http
            .post(&url)
            .timeout(SEND_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let raw = resp.text().await.unwrap_or_default();
            return Err(anyhow!("sendMessage failed: {status} body={raw}"));
        }
        debug!("Delivered to {}", self.chat_id);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("whatsapp(instance={}, chat={})", self.instance, self.chat_id)
    }
}

// ---------------------------------------------------------------------------
// Telegram Bot API
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

pub struct TelegramNotifier {
    http: HttpClient,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(
        http: HttpClient,
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn dispatch(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let body = SendMessagePayload {
            chat_id: &self.chat_id,
            text,
            disable_web_page_preview: true,
        };
        let resp = self
            .http
            .post(&url)
            .timeout(SEND_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let raw = resp.text().await.unwrap_or_default();
            return Err(anyhow!("sendMessage failed: {status} body={raw}"));
        }
        debug!("Delivered to chat_id={}", self.chat_id);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("telegram(chat_id={})", self.chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn green_api_posts_chat_id_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/waInstance1101/sendMessage/secret"))
            .and(body_json(serde_json::json!({
                "chatId": "972501234567@c.us",
                "message": "hello"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"idMessage":"x"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let n = GreenApiNotifier::new(
            HttpClient::new(),
            server.uri(),
            "1101",
            "secret",
            "+972501234567",
        );
        n.dispatch("hello").await.unwrap();
    }

    #[tokio::test]
    async fn green_api_keeps_explicit_group_id() {
        let n = GreenApiNotifier::new(HttpClient::new(), "http://x/", "1", "t", "1203630@g.us");
        assert_eq!(n.chat_id, "1203630@g.us");
        assert_eq!(n.base_url, "http://x");
    }

    #[tokio::test]
    async fn green_api_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let n = GreenApiNotifier::new(HttpClient::new(), server.uri(), "1", "t", "1");
        let err = n.dispatch("hello").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn telegram_posts_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_json(serde_json::json!({
                "chat_id": "-100200",
                "text": "hello",
                "disable_web_page_preview": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let n = TelegramNotifier::new(HttpClient::new(), server.uri(), "TOKEN", "-100200");
        n.dispatch("hello").await.unwrap();
    }
}
