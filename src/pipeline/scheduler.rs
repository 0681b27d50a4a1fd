//! Periodic update scheduler.
//!
//! ```text
//! Disabled (interval 0) ──trigger──▶ Running ──▶ Disabled
//! Idle ──tick / trigger──▶ Running ──▶ Idle
//! ```
//!
//! A cycle holds the cycle guard from start to finish. A tick or trigger
//! that finds the guard taken is skipped, so two cycles never reconcile the
//! same manga at once.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{ChapterFetcher, CycleReport, Reconciler};
use crate::models::{DownloadReport, NotificationEvent, SchedulerConfig};
use crate::notify::{DispatchReport, Dispatcher, Notifier};
use crate::storage::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Disabled,
    Idle,
    Running,
}

pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn StateStore>,
    fetcher: ChapterFetcher,
    reconciler: Reconciler,
    dispatcher: Dispatcher,
    notifiers: Vec<Arc<dyn Notifier>>,
    download_reports: Option<Mutex<mpsc::UnboundedReceiver<DownloadReport>>>,
    cycle_guard: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn StateStore>,
        fetcher: ChapterFetcher,
        reconciler: Reconciler,
        dispatcher: Dispatcher,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            reconciler,
            dispatcher,
            notifiers,
            download_reports: None,
            cycle_guard: Mutex::new(()),
        }
    }

    /// Fold finished downloads into the next cycle's notification.
    #[must_use]
    pub fn with_download_reports(
        mut self,
        reports: mpsc::UnboundedReceiver<DownloadReport>,
    ) -> Self {
        self.download_reports = Some(Mutex::new(reports));
        self
    }

    pub fn state(&self) -> SchedulerState {
        if self.cycle_guard.try_lock().is_err() {
            SchedulerState::Running
        } else if self.config.interval().is_none() {
            SchedulerState::Disabled
        } else {
            SchedulerState::Idle
        }
    }

    /// Run a cycle now, even when periodic runs are disabled.
    ///
    /// Returns `None` if a cycle is already in progress.
    pub async fn trigger(&self) -> Option<CycleReport> {
        log::info!("Manual update triggered");
        self.run_cycle().await
    }

    /// Tick until `cancel` fires.
    ///
    /// The first cycle runs right away, then once per interval. Ticks
    /// missed while a cycle runs are dropped, not queued.
    pub async fn run(&self, cancel: CancellationToken) {
        let Some(period) = self.config.interval() else {
            log::info!("Scheduler disabled (interval 0), waiting for manual triggers");
            cancel.cancelled().await;
            return;
        };

        log::info!("Scheduler running every {:?}", period);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
        log::info!("Scheduler stopped");
    }

    async fn run_cycle(&self) -> Option<CycleReport> {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            log::warn!("Update cycle already in progress, skipping");
            return None;
        };

        let started = Instant::now();
        let report = self.cycle().await;
        log::info!(
            "Update cycle finished in {:?}: {} checked, {} new chapters{}",
            started.elapsed(),
            report.checked,
            report.new_chapters,
            if report.is_partial() { " (partial)" } else { "" }
        );
        Some(report)
    }

    async fn cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let tracked = match self.store.tracked().await {
            Ok(tracked) => tracked,
            Err(e) => {
                log::error!("Could not list tracked manga: {}", e);
                report.state_failures.push("tracked".to_string());
                return report;
            }
        };
        report.checked = tracked.len();
        log::info!("Checking {} tracked manga", tracked.len());

        let mut deltas = Vec::new();
        let mut results = std::pin::pin!(self.fetcher.fetch_all(tracked));
        while let Some((manga, result)) = results.next().await {
            let chapters = match result {
                Ok(chapters) => chapters,
                Err(e) => {
                    log::warn!("Skipping {}: {}", manga.title, e);
                    report.failed_sources.push(manga.key().to_string());
                    continue;
                }
            };

            match self.reconciler.reconcile(&manga, chapters).await {
                Ok(reconciled) => {
                    report.new_chapters += reconciled.delta.chapters.len();
                    report.jobs_queued += reconciled.jobs_queued;
                    if !reconciled.delta.is_empty() {
                        deltas.push(reconciled.delta);
                    }
                }
                Err(e) => {
                    log::error!("{}", e);
                    report.state_failures.push(manga.key().to_string());
                }
            }
        }
        drop(results);

        let downloads = self.drain_download_reports().await;
        report.downloads_reported = downloads.len();

        let event = NotificationEvent::new(deltas, downloads);
        if !event.is_empty() {
            report.dispatch = Some(self.dispatcher.dispatch(&event, &self.notifiers).await);
        }
        report
    }

    /// Notify about downloads finished since the last cycle.
    ///
    /// Used on shutdown so results of drained jobs are not lost.
    pub async fn flush_downloads(&self) -> Option<DispatchReport> {
        let _guard = self.cycle_guard.lock().await;
        let downloads = self.drain_download_reports().await;
        if downloads.is_empty() {
            return None;
        }
        log::info!("Reporting {} finished downloads", downloads.len());
        let event = NotificationEvent::new(Vec::new(), downloads);
        Some(self.dispatcher.dispatch(&event, &self.notifiers).await)
    }

    async fn drain_download_reports(&self) -> Vec<DownloadReport> {
        let Some(receiver) = &self.download_reports else {
            return Vec::new();
        };
        let mut receiver = receiver.lock().await;
        let mut reports = Vec::new();
        while let Ok(report) = receiver.try_recv() {
            reports.push(report);
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::download::DownloadQueue;
    use crate::models::{DownloadJob, DownloadOutcome, TrackedManga};
    use crate::source::{Source, SourceRegistry};
    use crate::storage::{MangaLocks, MemoryStore};
    use crate::test_support::{FakeNotifier, FakeSource, chapters, demo_key};

    fn config(interval_secs: u64) -> SchedulerConfig {
        SchedulerConfig {
            interval_secs,
            ..SchedulerConfig::default()
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        source: Arc<FakeSource>,
        notifier: Arc<FakeNotifier>,
    }

    impl Harness {
        async fn new(source: FakeSource) -> Self {
            let store = Arc::new(MemoryStore::with_tracked(vec![TrackedManga::new(
                "m1", "demo", "Demo",
            )]));
            store
                .put(&demo_key("m1"), &chapters("m1", &["1", "2"]))
                .await
                .unwrap();
            Self {
                store,
                source: Arc::new(source),
                notifier: Arc::new(FakeNotifier::ok("fake")),
            }
        }

        fn scheduler(&self, config: SchedulerConfig, reconciler: Reconciler) -> Scheduler {
            let registry: SourceRegistry = [self.source.clone() as Arc<dyn Source>]
                .into_iter()
                .collect();
            Scheduler::new(
                config,
                self.store.clone(),
                ChapterFetcher::new(registry, 4, Duration::from_secs(5)),
                reconciler,
                Dispatcher::new(Duration::from_secs(1)),
                vec![self.notifier.clone() as Arc<dyn Notifier>],
            )
        }

        fn reconciler(&self) -> Reconciler {
            Reconciler::new(self.store.clone(), MangaLocks::new())
        }
    }

    fn ids(chapters: &[crate::models::ChapterRef]) -> Vec<String> {
        chapters.iter().map(|c| c.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_cycle_reports_new_chapter() {
        let h = Harness::new(FakeSource::new("demo").with_chapters("m1", &["1", "2", "3"])).await;
        let scheduler = h.scheduler(config(0), h.reconciler());

        let report = scheduler.trigger().await.unwrap();

        assert_eq!(report.checked, 1);
        assert_eq!(report.new_chapters, 1);
        assert!(!report.is_partial());
        assert_eq!(ids(&h.store.get(&demo_key("m1")).await.unwrap()), vec!["1", "2", "3"]);

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].html, "<b>Demo</b>\nChapter 3");
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_state_unchanged() {
        let h = Harness::new(FakeSource::new("demo").failing("m1")).await;
        let scheduler = h.scheduler(config(0), h.reconciler());

        let report = scheduler.trigger().await.unwrap();

        assert_eq!(report.failed_sources, vec!["demo:m1".to_string()]);
        assert!(report.is_partial());
        assert!(report.dispatch.is_none());
        assert_eq!(ids(&h.store.get(&demo_key("m1")).await.unwrap()), vec!["1", "2"]);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_auto_download_queues_one_job() {
        let h = Harness::new(FakeSource::new("demo").with_chapters("m1", &["1", "2", "3"])).await;
        let (tx, mut rx) = mpsc::channel::<DownloadJob>(8);
        let reconciler = h
            .reconciler()
            .with_auto_download(DownloadQueue::from_sender(tx));
        let scheduler = h.scheduler(config(0), reconciler);

        let report = scheduler.trigger().await.unwrap();

        assert_eq!(report.jobs_queued, 1);
        assert_eq!(rx.try_recv().unwrap().chapter.id, "3");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let h = Harness::new(
            FakeSource::new("demo")
                .with_chapters("m1", &["1", "2", "3"])
                .with_delay(Duration::from_millis(100)),
        )
        .await;
        let scheduler = h.scheduler(config(0), h.reconciler());

        let (first, second) = tokio::join!(scheduler.trigger(), scheduler.trigger());

        assert!(first.is_some() != second.is_some());
        assert_eq!(h.source.calls(), 1);
        assert_eq!(h.source.max_in_flight(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_interval_never_ticks() {
        let h = Harness::new(FakeSource::new("demo").with_chapters("m1", &["1", "2", "3"])).await;
        let scheduler = Arc::new(h.scheduler(config(0), h.reconciler()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            let cancel = cancel.clone();
            async move { scheduler.run(cancel).await }
        });
        tokio::time::sleep(Duration::from_secs(3 * 24 * 3600)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(h.source.calls(), 0);
    }

    #[tokio::test]
    async fn test_closed_download_queue_counts_no_jobs() {
        let h = Harness::new(FakeSource::new("demo").with_chapters("m1", &["1", "2", "3"])).await;
        let (tx, rx) = mpsc::channel::<DownloadJob>(8);
        drop(rx);
        let reconciler = h
            .reconciler()
            .with_auto_download(DownloadQueue::from_sender(tx));
        let scheduler = h.scheduler(config(0), reconciler);

        let report = scheduler.trigger().await.unwrap();

        assert_eq!(report.new_chapters, 1);
        assert_eq!(report.jobs_queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_runs_at_start() {
        let h = Harness::new(FakeSource::new("demo").with_chapters("m1", &["1", "2"])).await;
        let scheduler = Arc::new(h.scheduler(config(3600), h.reconciler()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            let cancel = cancel.clone();
            async move { scheduler.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.source.calls(), 1);
        tokio::time::sleep(Duration::from_secs(3598)).await;
        assert_eq!(h.source.calls(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.source.calls(), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_download_reports_join_next_notification() {
        let h = Harness::new(FakeSource::new("demo").with_chapters("m1", &["1", "2"])).await;
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = h
            .scheduler(config(0), h.reconciler())
            .with_download_reports(rx);

        let job = DownloadJob::new(
            TrackedManga::new("m1", "demo", "Demo"),
            crate::models::ChapterRef::new("m1", "2"),
        );
        tx.send(DownloadReport::from_job(&job, DownloadOutcome::Downloaded))
            .unwrap();

        let report = scheduler.trigger().await.unwrap();

        assert_eq!(report.new_chapters, 0);
        assert_eq!(report.downloads_reported, 1);
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].plain.starts_with("Downloads\nDemo - Chapter 2 (done)"));
    }
}
