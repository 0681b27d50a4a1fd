//! Tracked manga and chapter data structures.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a tracked manga. Manga ids are only unique within a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MangaKey {
    pub source_id: String,
    pub manga_id: String,
}

impl MangaKey {
    pub fn new(source_id: impl Into<String>, manga_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            manga_id: manga_id.into(),
        }
    }
}

impl fmt::Display for MangaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_id, self.manga_id)
    }
}

/// A manga the service monitors for new chapters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedManga {
    /// Source-specific manga identifier
    pub id: String,

    /// Identifier of the source that serves this manga
    pub source_id: String,

    /// Display title
    pub title: String,

    /// When the manga was last checked successfully
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

impl TrackedManga {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            title: title.into(),
            last_checked: None,
        }
    }

    pub fn key(&self) -> MangaKey {
        MangaKey::new(&self.source_id, &self.id)
    }
}

/// Download state of a single chapter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    #[default]
    NotDownloaded,
    Queued,
    Downloading,
    Downloaded,
    Failed,
}

impl DownloadStatus {
    /// Check whether moving from `self` to `next` is allowed.
    ///
    /// `Downloading -> Queued` is the retry edge. `Downloaded` and `Failed`
    /// accept no further automatic transitions.
    pub fn can_transition_to(self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;
        matches!(
            (self, next),
            (NotDownloaded, Queued)
                | (NotDownloaded, Downloading)
                | (Queued, Downloading)
                | (Downloading, Downloaded)
                | (Downloading, Failed)
                | (Downloading, Queued)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadStatus::Downloaded | DownloadStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::NotDownloaded => "not downloaded",
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Downloaded => "downloaded",
            DownloadStatus::Failed => "failed",
        }
    }
}

/// A chapter as reported by a source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChapterRef {
    /// Owning manga identifier
    pub manga_id: String,

    /// Source-specific chapter identifier
    pub id: String,

    /// Chapter number, if the source provides one
    #[serde(default)]
    pub number: Option<f64>,

    /// Chapter title
    #[serde(default)]
    pub title: String,

    /// Upload time reported by the source
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub status: DownloadStatus,
}

impl ChapterRef {
    pub fn new(manga_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            manga_id: manga_id.into(),
            id: id.into(),
            number: None,
            title: String::new(),
            published_at: None,
            status: DownloadStatus::NotDownloaded,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_number(mut self, number: f64) -> Self {
        self.number = Some(number);
        self
    }

    /// Human-readable label used in notifications and file names.
    pub fn label(&self) -> String {
        match (self.number, self.title.trim()) {
            (Some(n), "") => format!("Chapter {}", n),
            (_, "") => format!("Chapter {}", self.id),
            (_, title) => title.to_string(),
        }
    }
}
