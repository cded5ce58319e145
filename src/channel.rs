//! Telegram channel delivery.
//!
//! Papers with a hero image go out through `sendPhoto` with the rendered body
//! as caption; everything else through `sendMessage`. Both use `MarkdownV2`.

use crate::models::Paper;
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::error::Error;
use std::fmt;
use tracing::{error, info, instrument};

pub const TELEGRAM_API: &str = "https://api.telegram.org";

/// Something that can announce one paper.
pub trait Messenger {
    /// `true` only when the announcement was accepted.
    async fn send(&self, paper: &Paper, body: &str, has_image: bool) -> bool;
}

#[derive(Clone)]
pub struct TelegramChannel {
    http: Client,
    api_base: String,
    token: String,
    channel_id: String,
}

impl TelegramChannel {
    pub fn new(token: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_base: TELEGRAM_API.to_string(),
            token: token.into(),
            channel_id: channel_id.into(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call(&self, method: &str, payload: serde_json::Value) -> Result<(), Box<dyn Error>> {
        let reply: TelegramReply = self
            .http
            .post(self.endpoint(method))
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;
        if reply.ok {
            Ok(())
        } else {
            Err(reply
                .description
                .unwrap_or_else(|| "Telegram rejected the request".to_string())
                .into())
        }
    }
}

impl fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("api_base", &self.api_base)
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    description: Option<String>,
}

/// Request body for `sendPhoto` or `sendMessage`, returned with the method name.
fn build_payload(
    channel_id: &str,
    paper: &Paper,
    body: &str,
    has_image: bool,
) -> (&'static str, serde_json::Value) {
    match paper.hero_image.as_deref().filter(|_| has_image) {
        Some(photo) => (
            "sendPhoto",
            json!({
                "chat_id": channel_id,
                "photo": photo,
                "caption": body,
                "parse_mode": "MarkdownV2",
            }),
        ),
        None => (
            "sendMessage",
            json!({
                "chat_id": channel_id,
                "text": body,
                "parse_mode": "MarkdownV2",
                "disable_web_page_preview": false,
            }),
        ),
    }
}

impl Messenger for TelegramChannel {
    #[instrument(level = "info", skip(self, paper, body), fields(id = %paper.id))]
    async fn send(&self, paper: &Paper, body: &str, has_image: bool) -> bool {
        let (method, payload) = build_payload(&self.channel_id, paper, body, has_image);
        match self.call(method, payload).await {
            Ok(()) => {
                info!(method, title = %truncate_for_log(&paper.title, 80), "Sent paper");
                true
            }
            Err(e) => {
                error!(method, error = %e, "Failed to send paper");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper() -> Paper {
        Paper::new("https://huggingface.co/papers/2510.01234", "Title")
    }

    #[test]
    fn test_payload_with_image() {
        let mut p = paper();
        p.hero_image = Some("https://cdn/thumb.png".to_string());

        let (method, payload) = build_payload("@papers", &p, "body", true);

        assert_eq!(method, "sendPhoto");
        assert_eq!(payload["photo"], "https://cdn/thumb.png");
        assert_eq!(payload["caption"], "body");
        assert_eq!(payload["parse_mode"], "MarkdownV2");
        assert_eq!(payload["chat_id"], "@papers");
    }

    #[test]
    fn test_payload_text_only() {
        let (method, payload) = build_payload("@papers", &paper(), "body", false);

        assert_eq!(method, "sendMessage");
        assert_eq!(payload["text"], "body");
        assert_eq!(payload["disable_web_page_preview"], false);
        assert!(payload.get("photo").is_none());
    }

    #[test]
    fn test_payload_without_image_url_falls_back_to_text() {
        let (method, _) = build_payload("@papers", &paper(), "body", true);
        assert_eq!(method, "sendMessage");
    }

    #[test]
    fn test_debug_hides_token() {
        let channel = TelegramChannel::new("123:secret", "@papers");
        let shown = format!("{channel:?}");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("@papers"));
        assert_eq!(
            channel.endpoint("sendMessage"),
            "https://api.telegram.org/bot123:secret/sendMessage"
        );
    }
}
