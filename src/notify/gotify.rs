//! Gotify server channel.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{Message, Notifier, post_json};
use crate::error::Result;

/// Application token header; keeps the token out of the request URL.
const TOKEN_HEADER: &str = "X-Gotify-Key";

pub struct GotifyNotifier {
    client: Client,
    base_url: String,
    token: String,
    priority: u8,
}

impl GotifyNotifier {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        priority: u8,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            priority,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/message", self.base_url.trim_end_matches('/'))
    }

    fn payload(&self, message: &Message) -> serde_json::Value {
        json!({
            "title": message.title,
            "message": message.plain,
            "priority": self.priority,
        })
    }
}

#[async_trait]
impl Notifier for GotifyNotifier {
    fn name(&self) -> &str {
        "gotify"
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let request = self
            .client
            .post(self.endpoint())
            .header(TOKEN_HEADER, &self.token);
        post_json(self.name(), request, &self.payload(message)).await
    }
}
