//! Notification channels.
//!
//! - [`telegram`] - Telegram Bot API
//! - [`pushover`] - Pushover messages API
//! - [`gotify`] - self-hosted Gotify server
//! - [`dispatch`] - concurrent fan-out to every configured channel

pub mod dispatch;
pub mod gotify;
pub mod pushover;
pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};

use crate::error::{AppError, Result};
use crate::models::{NotificationEvent, NotifierConfig};
use crate::utils::http::body_excerpt;

pub use dispatch::{DispatchReport, Dispatcher};
pub use gotify::GotifyNotifier;
pub use pushover::PushoverNotifier;
pub use telegram::TelegramNotifier;

/// Title used by channels that show one.
pub const MESSAGE_TITLE: &str = "New chapters";

/// A rendered notification, produced once per event and shared by all
/// channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub title: String,
    pub html: String,
    pub plain: String,
}

impl Message {
    pub fn from_event(event: &NotificationEvent) -> Self {
        let title = if event.updates.is_empty() {
            "Downloads finished".to_string()
        } else {
            format!("{} ({})", MESSAGE_TITLE, event.chapter_count())
        };
        Self {
            title,
            html: event.render(),
            plain: event.render_plain(),
        }
    }
}

/// A delivery channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name used in logs and dispatch reports.
    fn name(&self) -> &str;

    async fn send(&self, message: &Message) -> Result<()>;
}

/// Build one notifier per configured channel.
pub fn build_notifiers(configs: &[NotifierConfig], client: &Client) -> Vec<Arc<dyn Notifier>> {
    configs
        .iter()
        .map(|config| -> Arc<dyn Notifier> {
            match config {
                NotifierConfig::Telegram { token, chat_id } => {
                    Arc::new(TelegramNotifier::new(client.clone(), token, *chat_id))
                }
                NotifierConfig::Pushover { token, user_key } => {
                    Arc::new(PushoverNotifier::new(client.clone(), token, user_key))
                }
                NotifierConfig::Gotify {
                    base_url,
                    token,
                    priority,
                } => Arc::new(GotifyNotifier::new(
                    client.clone(),
                    base_url,
                    token,
                    *priority,
                )),
            }
        })
        .collect()
}

/// Send a JSON body on a prepared request.
///
/// Any failure becomes `NotifyFailed` for `channel`. Endpoint URLs may
/// embed credentials, so the error names the status and the response
/// excerpt but never the URL.
pub(crate) async fn post_json(
    channel: &str,
    request: RequestBuilder,
    body: &serde_json::Value,
) -> Result<()> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| AppError::notify(channel, e.without_url()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let excerpt = body_excerpt(response).await;
    Err(AppError::notify(
        channel,
        format!("rejected with {}: {}", status, excerpt),
    ))
}
