//! Per-cycle transient values: deltas, download jobs and notification events.

use html_escape::encode_safe;
use serde::Serialize;

use super::{ChapterRef, TrackedManga};

/// Chapters newly observed for one manga during a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateDelta {
    pub manga: TrackedManga,
    pub chapters: Vec<ChapterRef>,
}

impl UpdateDelta {
    pub fn empty(manga: TrackedManga) -> Self {
        Self {
            manga,
            chapters: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}

/// A chapter waiting in the download queue.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub manga: TrackedManga,
    pub chapter: ChapterRef,
    /// Attempts made so far
    pub attempt: u32,
}

impl DownloadJob {
    pub fn new(manga: TrackedManga, chapter: ChapterRef) -> Self {
        Self {
            manga,
            chapter,
            attempt: 0,
        }
    }
}

/// Terminal result of a download job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DownloadOutcome {
    Downloaded,
    Failed(String),
}

/// Completion record emitted by the download coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub manga_id: String,
    pub manga_title: String,
    pub chapter_id: String,
    pub chapter_label: String,
    pub attempts: u32,
    pub outcome: DownloadOutcome,
}

impl DownloadReport {
    pub fn from_job(job: &DownloadJob, outcome: DownloadOutcome) -> Self {
        Self {
            manga_id: job.manga.id.clone(),
            manga_title: job.manga.title.clone(),
            chapter_id: job.chapter.id.clone(),
            chapter_label: job.chapter.label(),
            attempts: job.attempt,
            outcome,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == DownloadOutcome::Downloaded
    }
}

/// Everything worth telling the user about after one cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationEvent {
    pub updates: Vec<UpdateDelta>,
    pub downloads: Vec<DownloadReport>,
}

impl NotificationEvent {
    pub fn new(updates: Vec<UpdateDelta>, downloads: Vec<DownloadReport>) -> Self {
        Self {
            updates: updates.into_iter().filter(|d| !d.is_empty()).collect(),
            downloads,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.downloads.is_empty()
    }

    pub fn chapter_count(&self) -> usize {
        self.updates.iter().map(|d| d.chapters.len()).sum()
    }

    /// Render a single aggregated HTML message.
    ///
    /// One block per manga: the bold title followed by a line per chapter.
    /// Blocks are separated by a blank line. Download results follow in
    /// their own block. Text is HTML-escaped.
    pub fn render(&self) -> String {
        self.render_with(
            |title| format!("<b>{}</b>", encode_safe(title)),
            |text| encode_safe(text).into_owned(),
        )
    }

    /// Same layout as [`render`](Self::render) without markup.
    pub fn render_plain(&self) -> String {
        self.render_with(str::to_string, str::to_string)
    }

    fn render_with(
        &self,
        heading: impl Fn(&str) -> String,
        text: impl Fn(&str) -> String,
    ) -> String {
        let mut blocks = Vec::new();

        for delta in &self.updates {
            let mut block = heading(delta.manga.title.as_str());
            for chapter in &delta.chapters {
                block.push('\n');
                block.push_str(&text(chapter.label().as_str()));
            }
            blocks.push(block);
        }

        if !self.downloads.is_empty() {
            let mut block = heading("Downloads");
            for report in &self.downloads {
                let state = match &report.outcome {
                    DownloadOutcome::Downloaded => "done".to_string(),
                    DownloadOutcome::Failed(reason) => format!("failed: {}", reason),
                };
                block.push_str(&format!(
                    "\n{} - {} ({})",
                    text(report.manga_title.as_str()),
                    text(report.chapter_label.as_str()),
                    text(state.as_str())
                ));
            }
            blocks.push(block);
        }

        blocks.join("\n\n")
    }
}
