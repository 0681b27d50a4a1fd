//! Source adapters.
//!
//! A source is anything that can list the chapters of a manga it hosts and
//! the page images of a chapter. Sources are discovered once at startup and
//! kept in a [`SourceRegistry`] keyed by source id.

mod http;
pub mod plugin;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::ChapterRef;

pub use http::{HttpSource, SourceManifest};

/// Capability exposed by a source plugin.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable source identifier (e.g. `mangadex`).
    fn id(&self) -> &str;

    /// Current chapter list for a manga. Read-only.
    async fn fetch_chapters(&self, manga_id: &str) -> Result<Vec<ChapterRef>>;

    /// Page image URLs of a chapter, in reading order.
    async fn fetch_pages(&self, chapter: &ChapterRef) -> Result<Vec<String>>;
}

/// Sources keyed by id.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source. A later registration with the same id wins.
    pub fn insert(&mut self, source: Arc<dyn Source>) {
        let id = source.id().to_string();
        if self.sources.insert(id.clone(), source).is_some() {
            log::warn!("Source {} registered twice, keeping the last one", id);
        }
    }

    pub fn get(&self, source_id: &str) -> Result<Arc<dyn Source>> {
        self.sources
            .get(source_id)
            .cloned()
            .ok_or_else(|| AppError::UnknownSource(source_id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl FromIterator<Arc<dyn Source>> for SourceRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Source>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for source in iter {
            registry.insert(source);
        }
        registry
    }
}
