//! In-memory state store.
//!
//! Used for one-shot checks and tests. State is lost on exit.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{ChapterRef, MangaKey, TrackedManga};
use crate::storage::StateStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tracked: RwLock<Vec<TrackedManga>>,
    chapters: RwLock<HashMap<MangaKey, Vec<ChapterRef>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with tracked manga.
    pub fn with_tracked(manga: Vec<TrackedManga>) -> Self {
        Self {
            tracked: RwLock::new(manga),
            chapters: RwLock::default(),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn tracked(&self) -> Result<Vec<TrackedManga>> {
        Ok(self.tracked.read().await.clone())
    }

    async fn track(&self, manga: TrackedManga) -> Result<()> {
        let mut tracked = self.tracked.write().await;
        let key = manga.key();
        tracked.retain(|m| m.key() != key);
        tracked.push(manga);
        Ok(())
    }

    async fn untrack(&self, key: &MangaKey) -> Result<bool> {
        let mut tracked = self.tracked.write().await;
        let before = tracked.len();
        tracked.retain(|m| &m.key() != key);
        let removed = tracked.len() != before;
        if removed {
            self.chapters.write().await.remove(key);
        }
        Ok(removed)
    }

    async fn get(&self, key: &MangaKey) -> Result<Vec<ChapterRef>> {
        Ok(self
            .chapters
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn put(&self, key: &MangaKey, chapters: &[ChapterRef]) -> Result<()> {
        self.chapters
            .write()
            .await
            .insert(key.clone(), chapters.to_vec());
        Ok(())
    }

    async fn touch(&self, key: &MangaKey, checked_at: DateTime<Utc>) -> Result<()> {
        let mut tracked = self.tracked.write().await;
        if let Some(manga) = tracked.iter_mut().find(|m| &m.key() == key) {
            manga.last_checked = Some(checked_at);
        }
        Ok(())
    }
}
