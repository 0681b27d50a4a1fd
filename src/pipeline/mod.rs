//! Update cycle.
//!
//! - [`fetch`]: concurrent, time-bounded chapter fetches
//! - [`reconcile`]: diff against stored state and persist
//! - [`scheduler`]: periodic driver that ties a cycle together

pub mod fetch;
pub mod reconcile;
pub mod scheduler;

pub use fetch::ChapterFetcher;
pub use reconcile::{Reconciled, Reconciler};
pub use scheduler::{Scheduler, SchedulerState};

use crate::notify::DispatchReport;

/// Outcome of one update cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Tracked manga considered
    pub checked: usize,
    pub new_chapters: usize,
    pub jobs_queued: usize,
    /// Manga whose source fetch failed or timed out
    pub failed_sources: Vec<String>,
    /// Manga whose reconciled state could not be written
    pub state_failures: Vec<String>,
    /// Download results folded into this cycle's notification
    pub downloads_reported: usize,
    /// `None` when there was nothing to send
    pub dispatch: Option<DispatchReport>,
}

impl CycleReport {
    /// True when any manga or channel was skipped.
    pub fn is_partial(&self) -> bool {
        !self.failed_sources.is_empty()
            || !self.state_failures.is_empty()
            || self
                .dispatch
                .as_ref()
                .is_some_and(|d| !d.all_succeeded())
    }
}
