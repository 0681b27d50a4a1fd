//! Per-manga write serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::MangaKey;

/// Registry of async locks keyed by manga.
///
/// Every read-modify-write of a manga's chapter set holds that manga's lock,
/// so the reconciler and download workers never interleave on one manga.
#[derive(Debug, Clone, Default)]
pub struct MangaLocks {
    inner: Arc<Mutex<HashMap<MangaKey, Arc<AsyncMutex<()>>>>>,
}

impl MangaLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a manga, waiting if another task holds it.
    pub async fn lock(&self, key: &MangaKey) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(map.entry(key.clone()).or_default())
        };
        entry.lock_owned().await
    }
}
