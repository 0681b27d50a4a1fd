//! Telegram Bot API channel.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{Message, Notifier, post_json};
use crate::error::Result;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram's hard limit on message length.
const MAX_MESSAGE_CHARS: usize = 4096;

pub struct TelegramNotifier {
    client: Client,
    token: String,
    chat_id: i64,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(client: Client, token: impl Into<String>, chat_id: i64) -> Self {
        Self {
            client,
            token: token.into(),
            chat_id,
            api_base: API_BASE.to_string(),
        }
    }

    /// Point at another Bot API server, e.g. a self-hosted one.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }

    fn payload(&self, message: &Message) -> serde_json::Value {
        json!({
            "chat_id": self.chat_id,
            "text": truncate(&message.html, MAX_MESSAGE_CHARS),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let request = self.client.post(self.endpoint());
        post_json(self.name(), request, &self.payload(message)).await
    }
}

/// Cut at a line boundary so HTML tags stay balanced.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out = String::new();
    for line in text.lines() {
        if out.chars().count() + line.chars().count() + 2 > max_chars {
            break;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::test_support::HttpStub;

    fn message(html: &str) -> Message {
        Message {
            title: "t".to_string(),
            html: html.to_string(),
            plain: String::new(),
        }
    }

    #[test]
    fn test_payload_uses_html_mode() {
        let notifier = TelegramNotifier::new(Client::new(), "abc", 7);
        let payload = notifier.payload(&message("<b>Demo</b>\nCh 1"));

        assert_eq!(payload["chat_id"], 7);
        assert_eq!(payload["parse_mode"], "HTML");
        assert_eq!(payload["text"], "<b>Demo</b>\nCh 1");
        assert_eq!(
            notifier.endpoint(),
            "https://api.telegram.org/botabc/sendMessage"
        );
    }

    #[tokio::test]
    async fn test_rejected_send_does_not_leak_token() {
        let stub = HttpStub::start(vec![(
            "/bot123:SECRET/sendMessage",
            401,
            br#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#.to_vec(),
        )])
        .await;
        let notifier =
            TelegramNotifier::new(Client::new(), "123:SECRET", 7).with_api_base(&stub.base_url);

        let err = notifier.send(&message("<b>Demo</b>")).await.unwrap_err();

        assert_eq!(stub.requests().len(), 1);
        assert!(matches!(err, AppError::NotifyFailed { .. }));
        let text = err.to_string();
        assert!(text.contains("telegram"));
        assert!(text.contains("Unauthorized"));
        assert!(!text.contains("SECRET"));
    }

    #[test]
    fn test_truncate_on_line_boundary() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(truncate(text, 100), text);
        assert_eq!(truncate(text, 12), "aaaa\nbbbb\n…");
    }
}
