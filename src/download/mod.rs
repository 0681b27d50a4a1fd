//! Chapter downloads.
//!
//! - [`fetcher`] - `Downloader` trait and the page downloader
//! - [`coordinator`] - bounded worker pool with retry and backoff

pub mod coordinator;
pub mod fetcher;

pub use coordinator::{DownloadCoordinator, DownloadQueue, DownloadStats};
pub use fetcher::{Downloader, PageDownloader};
