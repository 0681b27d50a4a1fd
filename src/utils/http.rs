// src/utils/http.rs

//! HTTP client utilities.
//!
//! Request URLs may carry credentials (bot tokens in the path, API keys in
//! the query), so nothing here puts a full URL into an error.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::HttpConfig;

/// Longest response body excerpt kept in an error.
const EXCERPT_CHARS: usize = 200;

/// Create the shared asynchronous HTTP client.
pub fn create_async_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Send a request and check its status. Transport errors lose their URL.
pub async fn send_checked(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.map_err(AppError::http)?;
    check_status(response).await
}

/// Turn a non-success response into an error, keeping a short body excerpt.
///
/// 5xx and 429 become `DownloadTransient` so callers can retry them. The
/// URL in the message has no query string or user info.
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = redact_url(response.url());
    let excerpt = body_excerpt(response).await;
    let message = format!("{} returned {}: {}", url, status, excerpt);

    if status.is_server_error() || status.as_u16() == 429 {
        Err(AppError::DownloadTransient(message))
    } else {
        Err(AppError::DownloadFatal(message))
    }
}

/// First characters of a response body, trimmed.
pub async fn body_excerpt(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    body.chars()
        .take(EXCERPT_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Scheme, host, port and path only.
pub fn redact_url(url: &Url) -> String {
    let mut redacted = url.clone();
    redacted.set_query(None);
    redacted.set_fragment(None);
    // Fails only for URLs that cannot have credentials in the first place
    let _ = redacted.set_username("");
    let _ = redacted.set_password(None);
    redacted.to_string()
}
