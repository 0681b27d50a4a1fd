//! Chapter reconciliation.
//!
//! Computes which fetched chapters are new compared to the stored set,
//! persists the merged set and hands new chapters to the download queue.
//!
//! Stored chapters missing from a fetch are kept: a source that
//! temporarily omits a chapter never causes deletion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crate::download::DownloadQueue;
use crate::error::{AppError, Result};
use crate::models::{ChapterRef, DownloadJob, DownloadStatus, TrackedManga, UpdateDelta};
use crate::storage::{MangaLocks, StateStore};

/// Collapse duplicate chapter ids in a fetch. The last occurrence wins and
/// keeps the position of the first.
fn dedupe(manga: &TrackedManga, fetched: Vec<ChapterRef>) -> Vec<ChapterRef> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ChapterRef> = Vec::with_capacity(fetched.len());

    for chapter in fetched {
        match positions.get(&chapter.id) {
            Some(&index) => {
                log::warn!(
                    "Duplicate chapter id {} from source {} for {}, keeping the last one",
                    chapter.id,
                    manga.source_id,
                    manga.title
                );
                unique[index] = chapter;
            }
            None => {
                positions.insert(chapter.id.clone(), unique.len());
                unique.push(chapter);
            }
        }
    }
    unique
}

/// Fetched chapters whose ids are not in `stored`.
pub fn new_chapters(stored: &[ChapterRef], fetched: &[ChapterRef]) -> Vec<ChapterRef> {
    let known: HashSet<&str> = stored.iter().map(|c| c.id.as_str()).collect();
    fetched
        .iter()
        .filter(|c| !known.contains(c.id.as_str()))
        .cloned()
        .collect()
}

/// Result of reconciling one manga.
#[derive(Debug)]
pub struct Reconciled {
    pub delta: UpdateDelta,
    /// Download jobs actually accepted by the queue
    pub jobs_queued: usize,
}

/// Reconciles fetched chapter lists against the state store.
pub struct Reconciler {
    store: Arc<dyn StateStore>,
    locks: MangaLocks,
    /// Set when auto-download is enabled
    queue: Option<DownloadQueue>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn StateStore>, locks: MangaLocks) -> Self {
        Self {
            store,
            locks,
            queue: None,
        }
    }

    /// Queue every new chapter for download.
    #[must_use]
    pub fn with_auto_download(mut self, queue: DownloadQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn auto_download(&self) -> bool {
        self.queue.is_some()
    }

    /// Reconcile one manga.
    ///
    /// The merged chapter set is written in a single `put` under the
    /// manga's lock. If that write fails the previous state is untouched,
    /// no jobs are queued and `StateWriteFailed` is returned.
    pub async fn reconcile(
        &self,
        manga: &TrackedManga,
        fetched: Vec<ChapterRef>,
    ) -> Result<Reconciled> {
        let key = manga.key();
        let fetched: Vec<ChapterRef> = dedupe(manga, fetched)
            .into_iter()
            .map(|mut chapter| {
                chapter.manga_id = manga.id.clone();
                chapter
            })
            .collect();

        let initial_status = if self.auto_download() {
            DownloadStatus::Queued
        } else {
            DownloadStatus::NotDownloaded
        };

        let added = {
            let _guard = self.locks.lock(&key).await;

            let stored = self
                .store
                .get(&key)
                .await
                .map_err(|e| AppError::state_write(key.to_string(), e))?;

            let mut added = new_chapters(&stored, &fetched);
            if added.is_empty() {
                log::debug!("No new chapters for {}", manga.title);
            } else {
                for chapter in &mut added {
                    chapter.status = initial_status;
                }

                let mut merged = stored;
                merged.extend(added.iter().cloned());
                self.store
                    .put(&key, &merged)
                    .await
                    .map_err(|e| AppError::state_write(key.to_string(), e))?;

                log::info!("{} new chapters for {}", added.len(), manga.title);
            }
            added
        };

        if let Err(e) = self.store.touch(&key, Utc::now()).await {
            log::warn!("Failed to record check time for {}: {}", manga.title, e);
        }

        let mut jobs_queued = 0;
        if let Some(queue) = &self.queue {
            for chapter in &added {
                let job = DownloadJob::new(manga.clone(), chapter.clone());
                match queue.enqueue(job).await {
                    Ok(()) => jobs_queued += 1,
                    Err(e) => log::error!(
                        "Could not queue {} of {}: {}",
                        chapter.id,
                        manga.title,
                        e
                    ),
                }
            }
        }

        Ok(Reconciled {
            delta: UpdateDelta {
                manga: manga.clone(),
                chapters: added,
            },
            jobs_queued,
        })
    }
}
