//! Pushover messages API channel.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{Message, Notifier, post_json};
use crate::error::Result;

const API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Pushover rejects longer messages.
const MAX_MESSAGE_CHARS: usize = 1024;

pub struct PushoverNotifier {
    client: Client,
    token: String,
    user_key: String,
}

impl PushoverNotifier {
    pub fn new(client: Client, token: impl Into<String>, user_key: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
            user_key: user_key.into(),
        }
    }

    fn payload(&self, message: &Message) -> serde_json::Value {
        let text: String = message.html.chars().take(MAX_MESSAGE_CHARS).collect();
        json!({
            "token": self.token,
            "user": self.user_key,
            "title": message.title,
            "message": text,
            "html": 1,
        })
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    fn name(&self) -> &str {
        "pushover"
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let request = self.client.post(API_URL);
        post_json(self.name(), request, &self.payload(message)).await
    }
}
