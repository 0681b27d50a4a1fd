// src/service.rs

//! Service wiring.
//!
//! Builds every component from a validated [`Config`], resumes downloads
//! left unfinished by a previous run and shuts down in order: scheduler
//! first, then the download queue is drained, then the results of drained
//! jobs are notified.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::download::{DownloadCoordinator, Downloader, PageDownloader};
use crate::error::Result;
use crate::models::{Config, DownloadJob, DownloadStatus};
use crate::notify::{Dispatcher, Notifier, build_notifiers};
use crate::pipeline::{ChapterFetcher, CycleReport, Reconciler, Scheduler};
use crate::source::{SourceRegistry, plugin};
use crate::storage::{LocalStore, MangaLocks, StateStore, set_status};
use crate::utils::http::create_async_client;

pub struct Service {
    scheduler: Arc<Scheduler>,
    coordinator: Option<DownloadCoordinator>,
    store: Arc<dyn StateStore>,
    locks: MangaLocks,
    cancel: CancellationToken,
}

impl Service {
    /// Build the service from configuration: discover plugins, open the
    /// state directory and create the configured notifiers.
    pub fn build(config: &Config) -> Result<Self> {
        config.validate()?;

        let client = create_async_client(&config.http)?;
        let registry = plugin::discover(&config.paths.plugin_dir, &client)?;
        log::info!(
            "Loaded {} sources: {}",
            registry.len(),
            registry.ids().join(", ")
        );

        let store: Arc<dyn StateStore> = Arc::new(LocalStore::new(&config.paths.state_dir));
        let downloader: Arc<dyn Downloader> = Arc::new(PageDownloader::new(
            registry.clone(),
            client.clone(),
            &config.paths.download_dir,
        ));
        let notifiers = build_notifiers(&config.notifiers, &client);

        Ok(Self::with_components(
            config, store, registry, downloader, notifiers,
        ))
    }

    /// Assemble the service from ready-made components.
    ///
    /// The download pool is only started when auto-download is enabled.
    pub fn with_components(
        config: &Config,
        store: Arc<dyn StateStore>,
        registry: SourceRegistry,
        downloader: Arc<dyn Downloader>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        let locks = MangaLocks::new();
        let fetcher = ChapterFetcher::new(
            registry,
            config.scheduler.fetch_concurrency,
            config.scheduler.fetch_timeout(),
        );
        let mut reconciler = Reconciler::new(Arc::clone(&store), locks.clone());
        let dispatcher = Dispatcher::new(config.notify.timeout());

        let (coordinator, reports) = if config.scheduler.auto_download {
            let (coordinator, reports) = DownloadCoordinator::start(
                config.download.clone(),
                downloader,
                Arc::clone(&store),
                locks.clone(),
            );
            reconciler = reconciler.with_auto_download(coordinator.queue());
            (Some(coordinator), Some(reports))
        } else {
            (None, None)
        };

        let mut scheduler = Scheduler::new(
            config.scheduler.clone(),
            Arc::clone(&store),
            fetcher,
            reconciler,
            dispatcher,
            notifiers,
        );
        if let Some(reports) = reports {
            scheduler = scheduler.with_download_reports(reports);
        }

        Self {
            scheduler: Arc::new(scheduler),
            coordinator,
            store,
            locks,
            cancel: CancellationToken::new(),
        }
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Re-queue chapters left `Queued` or `Downloading` by a previous run.
    ///
    /// Returns the number of jobs queued. Does nothing without auto-download.
    pub async fn resume_pending(&self) -> Result<usize> {
        let Some(coordinator) = &self.coordinator else {
            return Ok(0);
        };
        let queue = coordinator.queue();
        let mut resumed = 0;

        for manga in self.store.tracked().await? {
            let key = manga.key();
            let pending: Vec<_> = self
                .store
                .get(&key)
                .await?
                .into_iter()
                .filter(|c| {
                    matches!(
                        c.status,
                        DownloadStatus::Queued | DownloadStatus::Downloading
                    )
                })
                .collect();

            for mut chapter in pending {
                if chapter.status == DownloadStatus::Downloading {
                    // Interrupted mid-download
                    set_status(
                        self.store.as_ref(),
                        &self.locks,
                        &key,
                        &chapter.id,
                        DownloadStatus::Queued,
                    )
                    .await?;
                    chapter.status = DownloadStatus::Queued;
                }
                queue.enqueue(DownloadJob::new(manga.clone(), chapter)).await?;
                resumed += 1;
            }
        }

        if resumed > 0 {
            log::info!("Resumed {} unfinished downloads", resumed);
        }
        Ok(resumed)
    }

    /// Run periodic cycles until the shutdown token fires.
    pub async fn run(self) -> Result<()> {
        self.resume_pending().await?;
        self.scheduler.run(self.cancel.clone()).await;
        self.shutdown().await;
        Ok(())
    }

    /// Run a single cycle, wait for queued downloads, then stop.
    pub async fn check_once(self) -> Result<Option<CycleReport>> {
        self.resume_pending().await?;
        let report = self.scheduler.trigger().await;
        self.shutdown().await;
        Ok(report)
    }

    async fn shutdown(self) {
        log::info!("Shutting down");
        if let Some(coordinator) = self.coordinator {
            coordinator.shutdown().await;
        }
        if let Some(dispatch) = self.scheduler.flush_downloads().await {
            log::info!(
                "Download summary sent to {} channels, {} failed",
                dispatch.successes.len(),
                dispatch.failures.len()
            );
        }
    }
}
