//! Local filesystem state store.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── tracked.json          # Tracked manga list
//! └── chapters/
//!     └── {source}~{manga}.json   # Chapter set for one manga
//! ```
//!
//! Source and manga ids are percent-encoded into the file name, so distinct
//! keys always map to distinct files.
//!
//! Every write goes to a temp file that is renamed over the target, so a
//! crash mid-write leaves the previous document intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ChapterRef, MangaKey, TrackedManga};
use crate::storage::StateStore;
use crate::utils::encode_component;

const TRACKED_KEY: &str = "tracked.json";

/// Chapter set document with update timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterSet {
    pub updated_at: DateTime<Utc>,
    pub count: usize,
    pub chapters: Vec<ChapterRef>,
}

impl ChapterSet {
    pub fn new(chapters: Vec<ChapterRef>) -> Self {
        Self {
            updated_at: Utc::now(),
            count: chapters.len(),
            chapters,
        }
    }
}

/// Local filesystem storage backend.
pub struct LocalStore {
    root_dir: PathBuf,
    /// Serializes read-modify-write of tracked.json
    tracked_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            tracked_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn chapters_key(key: &MangaKey) -> String {
        format!(
            "chapters/{}~{}.json",
            encode_component(&key.source_id),
            encode_component(&key.manga_id)
        )
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_tracked(&self) -> Result<Vec<TrackedManga>> {
        Ok(self.read_json(TRACKED_KEY).await?.unwrap_or_default())
    }
}

#[async_trait]
impl StateStore for LocalStore {
    async fn tracked(&self) -> Result<Vec<TrackedManga>> {
        self.load_tracked().await
    }

    async fn track(&self, manga: TrackedManga) -> Result<()> {
        let _guard = self.tracked_lock.lock().await;
        let mut tracked = self.load_tracked().await?;
        let key = manga.key();
        tracked.retain(|m| m.key() != key);
        log::info!("Tracking {} ({}) from {}", manga.title, manga.id, manga.source_id);
        tracked.push(manga);
        self.write_json(TRACKED_KEY, &tracked).await
    }

    async fn untrack(&self, key: &MangaKey) -> Result<bool> {
        let _guard = self.tracked_lock.lock().await;
        let mut tracked = self.load_tracked().await?;
        let before = tracked.len();
        tracked.retain(|m| &m.key() != key);
        if tracked.len() == before {
            return Ok(false);
        }
        self.write_json(TRACKED_KEY, &tracked).await?;

        match tokio::fs::remove_file(self.path(&Self::chapters_key(key))).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AppError::Io(e)),
        }
        Ok(true)
    }

    async fn get(&self, key: &MangaKey) -> Result<Vec<ChapterRef>> {
        match self.read_json::<ChapterSet>(&Self::chapters_key(key)).await? {
            Some(set) => Ok(set.chapters),
            None => {
                log::debug!("No chapter set stored for {}", key);
                Ok(Vec::new())
            }
        }
    }

    async fn put(&self, key: &MangaKey, chapters: &[ChapterRef]) -> Result<()> {
        let set = ChapterSet::new(chapters.to_vec());
        self.write_json(&Self::chapters_key(key), &set).await?;
        log::debug!("Stored {} chapters for {}", set.count, key);
        Ok(())
    }

    async fn touch(&self, key: &MangaKey, checked_at: DateTime<Utc>) -> Result<()> {
        let _guard = self.tracked_lock.lock().await;
        let mut tracked = self.load_tracked().await?;
        let Some(manga) = tracked.iter_mut().find(|m| &m.key() == key) else {
            return Ok(());
        };
        manga.last_checked = Some(checked_at);
        self.write_json(TRACKED_KEY, &tracked).await
    }
}
