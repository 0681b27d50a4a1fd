//! JSON-over-HTTP source described by a manifest file.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ChapterRef;
use crate::source::Source;
use crate::utils::fill_template;
use crate::utils::http::send_checked;

/// Source manifest as found in the plugin directory.
///
/// ```toml
/// id = "mangadex"
/// name = "MangaDex"
/// chapters_url = "https://api.example.com/manga/{manga}/chapters"
/// pages_url = "https://api.example.com/manga/{manga}/chapters/{chapter}/pages"
///
/// [headers]
/// Referer = "https://example.com/"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceManifest {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Chapter list endpoint; `{manga}` is replaced with the manga id
    pub chapters_url: String,

    /// Page list endpoint; `{manga}` and `{chapter}` are replaced
    pub pages_url: String,

    /// Extra request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl SourceManifest {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::config("source manifest has an empty id"));
        }
        if !self.chapters_url.contains("{manga}") {
            return Err(AppError::config(format!(
                "source {}: chapters_url must contain {{manga}}",
                self.id
            )));
        }
        if !self.pages_url.contains("{chapter}") {
            return Err(AppError::config(format!(
                "source {}: pages_url must contain {{chapter}}",
                self.id
            )));
        }
        url::Url::parse(&fill_template(&self.chapters_url, &[("manga", "x")]))?;
        Ok(())
    }
}

/// Chapter entry as returned by a source endpoint.
#[derive(Debug, Deserialize)]
struct ChapterEntry {
    id: String,
    #[serde(default)]
    number: Option<f64>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

impl ChapterEntry {
    fn into_chapter(self, manga_id: &str) -> ChapterRef {
        ChapterRef {
            manga_id: manga_id.to_string(),
            id: self.id,
            number: self.number,
            title: self.title,
            published_at: self.published_at,
            status: Default::default(),
        }
    }
}

/// Source backed by a manifest and the shared HTTP client.
pub struct HttpSource {
    manifest: SourceManifest,
    client: Client,
}

impl HttpSource {
    pub fn new(manifest: SourceManifest, client: Client) -> Self {
        Self { manifest, client }
    }

    pub fn manifest(&self) -> &SourceManifest {
        &self.manifest
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut request = self.client.get(url);
        for (name, value) in &self.manifest.headers {
            request = request.header(name, value);
        }
        let response = send_checked(request).await?;
        response.json().await.map_err(AppError::http)
    }
}

#[async_trait]
impl Source for HttpSource {
    fn id(&self) -> &str {
        &self.manifest.id
    }

    async fn fetch_chapters(&self, manga_id: &str) -> Result<Vec<ChapterRef>> {
        let url = fill_template(&self.manifest.chapters_url, &[("manga", manga_id)]);
        log::debug!("[{}] GET {}", self.manifest.id, url);

        let entries: Vec<ChapterEntry> = self
            .get_json(&url)
            .await
            .map_err(|e| AppError::source_unavailable(&self.manifest.id, manga_id, e))?;

        Ok(entries
            .into_iter()
            .map(|entry| entry.into_chapter(manga_id))
            .collect())
    }

    async fn fetch_pages(&self, chapter: &ChapterRef) -> Result<Vec<String>> {
        let url = fill_template(
            &self.manifest.pages_url,
            &[
                ("manga", chapter.manga_id.as_str()),
                ("chapter", chapter.id.as_str()),
            ],
        );
        log::debug!("[{}] GET {}", self.manifest.id, url);
        self.get_json(&url).await
    }
}
