//! Download worker pool.
//!
//! A fixed number of workers share one bounded queue. `enqueue` waits while
//! the queue is full, so jobs are never dropped. Each attempt runs in its
//! own task: a panic inside the downloader fails that job and nothing else.
//!
//! Status flow per job:
//!
//! ```text
//! Queued -> Downloading -> Downloaded
//!                       -> Queued (transient, attempts left) -> Downloading ...
//!                       -> Failed (fatal or attempts exhausted)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::download::Downloader;
use crate::error::{AppError, Result};
use crate::models::{DownloadConfig, DownloadJob, DownloadOutcome, DownloadReport, DownloadStatus};
use crate::storage::{MangaLocks, StateStore, set_status};

/// Cloneable handle for submitting jobs.
#[derive(Clone)]
pub struct DownloadQueue {
    sender: mpsc::Sender<DownloadJob>,
}

impl DownloadQueue {
    pub fn from_sender(sender: mpsc::Sender<DownloadJob>) -> Self {
        Self { sender }
    }

    /// Submit a job, waiting for room if the queue is full.
    ///
    /// Fails only after the coordinator has shut down.
    pub async fn enqueue(&self, job: DownloadJob) -> Result<()> {
        log::debug!("Queueing {} of {}", job.chapter.id, job.manga.title);
        self.sender
            .send(job)
            .await
            .map_err(|e| AppError::DownloadFatal(format!("download queue closed, dropped {}", e.0.chapter.id)))
    }
}

/// Counters over the coordinator's lifetime.
#[derive(Debug, Default)]
pub struct DownloadStats {
    pub downloaded: AtomicUsize,
    pub failed: AtomicUsize,
    pub retried: AtomicUsize,
}

impl DownloadStats {
    pub fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.downloaded.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.retried.load(Ordering::Relaxed),
        )
    }
}

/// Everything a worker needs, shared by all workers.
struct WorkerContext {
    config: DownloadConfig,
    downloader: Arc<dyn Downloader>,
    store: Arc<dyn StateStore>,
    locks: MangaLocks,
    reports: mpsc::UnboundedSender<DownloadReport>,
    stats: Arc<DownloadStats>,
}

/// Bounded worker pool consuming download jobs.
pub struct DownloadCoordinator {
    queue: DownloadQueue,
    workers: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    stats: Arc<DownloadStats>,
}

impl DownloadCoordinator {
    /// Spawn the worker pool.
    ///
    /// Returns the coordinator and the receiver of completion reports.
    pub fn start(
        config: DownloadConfig,
        downloader: Arc<dyn Downloader>,
        store: Arc<dyn StateStore>,
        locks: MangaLocks,
    ) -> (Self, mpsc::UnboundedReceiver<DownloadReport>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let shutdown = CancellationToken::new();
        let stats = Arc::new(DownloadStats::default());
        let worker_count = config.workers.max(1);

        let context = Arc::new(WorkerContext {
            config,
            downloader,
            store,
            locks,
            reports: report_tx,
            stats: Arc::clone(&stats),
        });

        let workers = (0..worker_count)
            .map(|index| {
                let context = Arc::clone(&context);
                let receiver = Arc::clone(&receiver);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    worker_loop(index, context, receiver, shutdown).await;
                })
            })
            .collect();

        log::info!("Download coordinator started with {} workers", worker_count);

        let coordinator = Self {
            queue: DownloadQueue::from_sender(sender),
            workers,
            shutdown,
            stats,
        };
        (coordinator, report_rx)
    }

    /// Handle for submitting jobs.
    pub fn queue(&self) -> DownloadQueue {
        self.queue.clone()
    }

    pub fn stats(&self) -> Arc<DownloadStats> {
        Arc::clone(&self.stats)
    }

    /// Stop accepting jobs, finish everything already queued, then return.
    pub async fn shutdown(self) {
        log::info!("Download coordinator draining queue");
        self.shutdown.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                log::error!("Download worker ended abnormally: {}", e);
            }
        }
        let (downloaded, failed, retried) = self.stats.snapshot();
        log::info!(
            "Download coordinator stopped: {} downloaded, {} failed, {} retries",
            downloaded,
            failed,
            retried
        );
    }
}

async fn worker_loop(
    index: usize,
    context: Arc<WorkerContext>,
    receiver: Arc<Mutex<mpsc::Receiver<DownloadJob>>>,
    shutdown: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                job = rx.recv() => job,
                _ = shutdown.cancelled() => {
                    // Refuse new sends, still drain what is buffered.
                    rx.close();
                    rx.recv().await
                }
            }
        };

        let Some(job) = job else {
            log::debug!("Download worker {} exiting", index);
            break;
        };
        process_job(&context, job).await;
    }
}

/// Run one job to a terminal state.
async fn process_job(context: &WorkerContext, mut job: DownloadJob) {
    let max_attempts = context.config.max_attempts.max(1);

    loop {
        job.attempt += 1;
        if !transition(context, &job, DownloadStatus::Downloading).await {
            log::warn!(
                "Skipping download of {} / {}: not in a downloadable state",
                job.manga.title,
                job.chapter.id
            );
            return;
        }

        match attempt(context, &job).await {
            Ok(()) => {
                transition(context, &job, DownloadStatus::Downloaded).await;
                context.stats.downloaded.fetch_add(1, Ordering::Relaxed);
                report(context, &job, DownloadOutcome::Downloaded);
                return;
            }
            Err(e) if e.is_transient() && job.attempt < max_attempts => {
                let delay = context.config.backoff(job.attempt);
                log::warn!(
                    "Download of {} / {} failed (attempt {}/{}), retrying in {:?}: {}",
                    job.manga.title,
                    job.chapter.id,
                    job.attempt,
                    max_attempts,
                    delay,
                    e
                );
                context.stats.retried.fetch_add(1, Ordering::Relaxed);
                transition(context, &job, DownloadStatus::Queued).await;
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                log::error!(
                    "Download of {} / {} failed after {} attempts: {}",
                    job.manga.title,
                    job.chapter.id,
                    job.attempt,
                    e
                );
                transition(context, &job, DownloadStatus::Failed).await;
                context.stats.failed.fetch_add(1, Ordering::Relaxed);
                report(context, &job, DownloadOutcome::Failed(e.to_string()));
                return;
            }
        }
    }
}

/// One download attempt in its own task, bounded by the configured timeout.
async fn attempt(context: &WorkerContext, job: &DownloadJob) -> Result<()> {
    let downloader = Arc::clone(&context.downloader);
    let manga = job.manga.clone();
    let chapter = job.chapter.clone();
    let timeout: Duration = context.config.timeout();

    let handle = tokio::spawn(async move {
        tokio::time::timeout(timeout, downloader.download(&manga, &chapter)).await
    });

    match handle.await {
        Ok(Ok(Ok(_path))) => Ok(()),
        Ok(Ok(Err(e))) => Err(e),
        Ok(Err(_elapsed)) => Err(AppError::DownloadTransient(format!(
            "timed out after {:?}",
            timeout
        ))),
        Err(join_error) if join_error.is_panic() => Err(AppError::DownloadFatal(
            "downloader panicked".to_string(),
        )),
        Err(join_error) => Err(AppError::DownloadFatal(join_error.to_string())),
    }
}

/// Record a status change. Returns false only when the store refused it.
///
/// A failed write is logged and treated as applied: the download itself
/// does not depend on the stored status.
async fn transition(context: &WorkerContext, job: &DownloadJob, status: DownloadStatus) -> bool {
    let result = set_status(
        context.store.as_ref(),
        &context.locks,
        &job.manga.key(),
        &job.chapter.id,
        status,
    )
    .await;
    match result {
        Ok(applied) => applied,
        Err(e) => {
            log::warn!(
                "Could not mark {} of {} as {}: {}",
                job.chapter.id,
                job.manga.title,
                status.as_str(),
                e
            );
            true
        }
    }
}

fn report(context: &WorkerContext, job: &DownloadJob, outcome: DownloadOutcome) {
    // Receiver may be gone during shutdown; reports are informational.
    let _ = context.reports.send(DownloadReport::from_job(job, outcome));
}
