//! Chapter content download.
//!
//! Pages are written into a hidden staging directory next to the final
//! location and the directory is renamed into place once every page is on
//! disk. A chapter directory therefore either holds all pages or does not
//! exist.
//!
//! ```text
//! {download_dir}/
//! └── {source}/
//!     └── {manga title}/
//!         ├── .{chapter}.part/   # Staging, removed on retry
//!         └── {chapter}/
//!             ├── 001.jpg
//!             └── 002.jpg
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ChapterRef, TrackedManga};
use crate::source::SourceRegistry;
use crate::utils::http::send_checked;
use crate::utils::sanitize_component;

/// Fetches and persists a chapter's content.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download a chapter and return the directory it was written to.
    async fn download(&self, manga: &TrackedManga, chapter: &ChapterRef) -> Result<PathBuf>;
}

/// Downloads chapter pages listed by the manga's source.
pub struct PageDownloader {
    registry: SourceRegistry,
    client: Client,
    root_dir: PathBuf,
}

impl PageDownloader {
    pub fn new(registry: SourceRegistry, client: Client, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            client,
            root_dir: root_dir.into(),
        }
    }

    /// Final directory for a chapter.
    pub fn chapter_dir(&self, manga: &TrackedManga, chapter: &ChapterRef) -> PathBuf {
        self.root_dir
            .join(sanitize_component(&manga.source_id))
            .join(sanitize_component(&manga.title))
            .join(chapter_dir_name(chapter))
    }

    async fn fetch_page(&self, url: &str, dest: &Path) -> Result<()> {
        let response = send_checked(self.client.get(url)).await?;
        let bytes = response.bytes().await.map_err(AppError::http)?;

        let mut file = tokio::fs::File::create(dest).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Downloader for PageDownloader {
    async fn download(&self, manga: &TrackedManga, chapter: &ChapterRef) -> Result<PathBuf> {
        let final_dir = self.chapter_dir(manga, chapter);
        if tokio::fs::try_exists(&final_dir).await? {
            log::info!("{} already on disk at {}", chapter.id, final_dir.display());
            return Ok(final_dir);
        }

        let source = self
            .registry
            .get(&manga.source_id)
            .map_err(|e| AppError::DownloadFatal(e.to_string()))?;

        let pages = source.fetch_pages(chapter).await.map_err(|e| {
            if e.is_transient() {
                AppError::DownloadTransient(e.to_string())
            } else {
                AppError::DownloadFatal(e.to_string())
            }
        })?;
        if pages.is_empty() {
            return Err(AppError::DownloadFatal(format!(
                "source {} returned no pages for chapter {}",
                manga.source_id, chapter.id
            )));
        }

        let staging = staging_dir(&final_dir);
        if tokio::fs::try_exists(&staging).await? {
            tokio::fs::remove_dir_all(&staging).await?;
        }
        tokio::fs::create_dir_all(&staging).await?;

        let width = pages.len().to_string().len().max(3);
        for (index, url) in pages.iter().enumerate() {
            let name = format!("{:0width$}.{}", index + 1, page_extension(url), width = width);
            self.fetch_page(url, &staging.join(name)).await?;
        }

        tokio::fs::rename(&staging, &final_dir).await?;
        log::info!(
            "Downloaded {} pages of {} / {} to {}",
            pages.len(),
            manga.title,
            chapter.label(),
            final_dir.display()
        );
        Ok(final_dir)
    }
}

fn chapter_dir_name(chapter: &ChapterRef) -> String {
    let title = chapter.title.trim();
    if title.is_empty() {
        sanitize_component(&chapter.id)
    } else {
        sanitize_component(&format!("{} - {}", chapter.id, title))
    }
}

fn staging_dir(final_dir: &Path) -> PathBuf {
    let name = final_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_dir.with_file_name(format!(".{}.part", name))
}

/// File extension of a page URL, defaulting to `jpg`.
fn page_extension(page_url: &str) -> String {
    url::Url::parse(page_url)
        .ok()
        .and_then(|u| {
            let path = u.path().to_string();
            Path::new(&path)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
        })
        .filter(|ext| ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "jpg".to_string())
}
