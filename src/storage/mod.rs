//! Storage abstractions for tracked manga state.
//!
//! The store keeps two kinds of documents:
//! - the list of tracked manga
//! - one chapter set per manga, replaced as a whole on every write
//!
//! ## Directory Structure (LocalStore)
//!
//! ```text
//! state/
//! ├── tracked.json             # Tracked manga list
//! └── chapters/
//!     ├── mangadex~abc.json    # Chapter set for one manga
//!     └── ...
//! ```
//!
//! Everything is keyed by [`MangaKey`]: the same manga id on two sources
//! is two different manga.

pub mod local;
pub mod lock;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{ChapterRef, DownloadStatus, MangaKey, TrackedManga};

// Re-export for convenience
pub use local::LocalStore;
pub use lock::MangaLocks;
pub use memory::MemoryStore;

/// Trait for state storage backends.
///
/// `put` replaces a manga's chapter set atomically: after a crash the
/// stored set is either the old one or the new one.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// All tracked manga.
    async fn tracked(&self) -> Result<Vec<TrackedManga>>;

    /// Start tracking a manga. Replaces an existing entry with the same key.
    async fn track(&self, manga: TrackedManga) -> Result<()>;

    /// Stop tracking a manga. Returns false if it was not tracked.
    async fn untrack(&self, key: &MangaKey) -> Result<bool>;

    /// Stored chapter set for a manga (empty if none).
    async fn get(&self, key: &MangaKey) -> Result<Vec<ChapterRef>>;

    /// Replace the chapter set for a manga.
    async fn put(&self, key: &MangaKey, chapters: &[ChapterRef]) -> Result<()>;

    /// Record a successful check.
    async fn touch(&self, key: &MangaKey, checked_at: DateTime<Utc>) -> Result<()>;
}

/// Move one chapter to a new download status under the manga's lock.
///
/// Returns `Ok(false)` if the chapter is unknown or the transition is not
/// allowed from its current status; nothing is written in that case.
pub async fn set_status(
    store: &dyn StateStore,
    locks: &MangaLocks,
    key: &MangaKey,
    chapter_id: &str,
    status: DownloadStatus,
) -> Result<bool> {
    let _guard = locks.lock(key).await;

    let mut chapters = store.get(key).await?;
    let Some(chapter) = chapters.iter_mut().find(|c| c.id == chapter_id) else {
        log::warn!(
            "Status update for unknown chapter {} of manga {}",
            chapter_id,
            key
        );
        return Ok(false);
    };

    if chapter.status == status {
        return Ok(true);
    }
    if !chapter.status.can_transition_to(status) {
        log::warn!(
            "Refusing status change {} -> {} for chapter {} of manga {}",
            chapter.status.as_str(),
            status.as_str(),
            chapter_id,
            key
        );
        return Ok(false);
    }

    chapter.status = status;
    store
        .put(key, &chapters)
        .await
        .map_err(|e| AppError::state_write(key.to_string(), e))?;
    Ok(true)
}
