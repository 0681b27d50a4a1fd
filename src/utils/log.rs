// src/utils/log.rs

//! Console report formatting for cycle summaries.
//!
//! Diagnostics go through the `log` facade; this module only prints the
//! human-facing blocks the CLI shows after a check.

use chrono::Local;

use crate::pipeline::CycleReport;

/// Format a line with timestamp and tag
fn format_line(tag: &str, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] [{}] {}", timestamp, tag, message)
}

/// Print a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    println!("{}", format_line("INFO", &border));
    println!("{}", format_line("INFO", &format!("  {}", title)));
    println!("{}", format_line("INFO", &border));
}

/// Print a sub-item (indented)
pub fn sub_item(message: &str) {
    println!("{}", format_line("INFO", &format!("    {}", message)));
}

/// Print a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("{}", format_line("SUMMARY", title));
    for (key, value) in items {
        println!("{}", format_line("SUMMARY", &format!("    {}: {}", key, value)));
    }
}

/// Summary rows for a finished cycle.
pub fn cycle_items(report: &CycleReport) -> Vec<(&'static str, String)> {
    let mut items = vec![
        ("Checked", report.checked.to_string()),
        ("New chapters", report.new_chapters.to_string()),
        ("Jobs queued", report.jobs_queued.to_string()),
        ("Source failures", report.failed_sources.len().to_string()),
        ("State failures", report.state_failures.len().to_string()),
    ];
    if let Some(dispatch) = &report.dispatch {
        items.push((
            "Notifications",
            format!(
                "{} sent, {} failed",
                dispatch.successes.len(),
                dispatch.failures.len()
            ),
        ));
    }
    items.push((
        "Status",
        if report.is_partial() {
            "partial".to_string()
        } else {
            "complete".to_string()
        },
    ));
    items
}
