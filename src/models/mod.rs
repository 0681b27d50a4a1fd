// src/models/mod.rs

//! Domain models for the update service.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod event;
mod manga;

// Re-export all public types
pub use config::{
    Config, DownloadConfig, HttpConfig, LoggingConfig, MIN_INTERVAL_SECS, NotifierConfig,
    NotifyConfig, PathsConfig, SchedulerConfig,
};
pub use event::{
    DownloadJob, DownloadOutcome, DownloadReport, NotificationEvent, UpdateDelta,
};
pub use manga::{ChapterRef, DownloadStatus, MangaKey, TrackedManga};
