//! Concurrent chapter fetching.

use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{ChapterRef, TrackedManga};
use crate::source::SourceRegistry;

/// Fetches chapter lists for many manga with bounded concurrency.
pub struct ChapterFetcher {
    registry: SourceRegistry,
    concurrency: usize,
    timeout: Duration,
}

impl ChapterFetcher {
    pub fn new(registry: SourceRegistry, concurrency: usize, timeout: Duration) -> Self {
        Self {
            registry,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Fetch one manga's chapter list.
    ///
    /// Every failure, including an unknown source or a timeout, comes back
    /// as `SourceUnavailable`.
    pub async fn fetch_one(&self, manga: &TrackedManga) -> Result<Vec<ChapterRef>> {
        let source = self
            .registry
            .get(&manga.source_id)
            .map_err(|e| AppError::source_unavailable(&manga.source_id, &manga.id, e))?;

        match tokio::time::timeout(self.timeout, source.fetch_chapters(&manga.id)).await {
            Ok(Ok(chapters)) => Ok(chapters),
            Ok(Err(e @ AppError::SourceUnavailable { .. })) => Err(e),
            Ok(Err(e)) => Err(AppError::source_unavailable(
                &manga.source_id,
                &manga.id,
                e,
            )),
            Err(_elapsed) => Err(AppError::source_unavailable(
                &manga.source_id,
                &manga.id,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }

    /// Fetch every manga, yielding results in completion order.
    pub fn fetch_all(
        &self,
        manga: Vec<TrackedManga>,
    ) -> impl Stream<Item = (TrackedManga, Result<Vec<ChapterRef>>)> + '_ {
        stream::iter(manga)
            .map(move |manga| async move {
                let result = self.fetch_one(&manga).await;
                (manga, result)
            })
            .buffer_unordered(self.concurrency)
    }
}
