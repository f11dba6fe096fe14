//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Output is **chapter-centric, not file-centric**. Every chapter leads with
//! its label (volume, number, title) and the filesystem is secondary context
//! on indented lines. Chapter ids are shown in brackets because they are what
//! overrides and error messages refer to.
//!
//! # Output Format
//!
//! ## Plan
//!
//! ```text
//! Dungeon Diary (12 chapters)
//!     Library: library/Dungeon Diary
//!     publish   Ch.011 - Storm [c11]
//!     publish   Ch.003 [c3] (page count 18 → 20)
//!     relabel   Vol.1 Ch.001.5 - Omake [c1.5]
//!         From: Ch.099 - Omake [a01b77e9c4].cbz
//!     9 up to date
//! ```
//!
//! ## Sync progress
//!
//! ```text
//! Dungeon Diary: 2 to publish, 1 to relabel, 9 up to date
//!     published Ch.011 - Storm [c11] (20 pages)
//!     relabelled [c1.5] → Vol.1 Ch.001.5 - Omake [a01b77e9c4].cbz
//!     FAILED    [c3]: fetching chapter c3: permanent fault: HTTP 404
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::naming::chapter_label;
use crate::sync::{Plan, PublishReason, SyncEvent, SyncReport, Task};

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `Ch.001 - Arrival [c1]`
fn chapter_line(label: &str, id: &str) -> String {
    if label == id {
        format!("[{}]", id)
    } else {
        format!("{} [{}]", label, id)
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{} {}", n, if n == 1 { one } else { many })
}

// ============================================================================
// Plan
// ============================================================================

/// Format a plan as display lines.
pub fn format_plan(plan: &Plan) -> Vec<String> {
    let mut lines = vec![format!(
        "{} ({})",
        plan.series.title,
        plural(plan.series.chapters.len(), "chapter", "chapters")
    )];
    lines.push(format!("{}Library: {}", indent(1), plan.dir().display()));

    for task in &plan.tasks {
        let chapter = task.chapter();
        let line = chapter_line(&chapter_label(chapter), &chapter.id);
        match task {
            Task::Publish { reason, .. } => {
                let detail = match reason {
                    PublishReason::Missing => String::new(),
                    PublishReason::PageCountChanged { archived, declared } => {
                        format!(" (page count {} \u{2192} {})", archived, declared)
                    }
                };
                lines.push(format!("{}publish   {}{}", indent(1), line, detail));
            }
            Task::Relabel { record, .. } => {
                lines.push(format!("{}relabel   {}", indent(1), line));
                let from = record
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                lines.push(format!("{}From: {}", indent(2), from));
            }
        }
    }

    if plan.up_to_date > 0 || plan.tasks.is_empty() {
        lines.push(format!("{}{} up to date", indent(1), plan.up_to_date));
    }
    lines
}

/// Print a plan to stdout.
pub fn print_plan(plan: &Plan) {
    for line in format_plan(plan) {
        println!("{}", line);
    }
}

// ============================================================================
// Sync progress
// ============================================================================

/// Format a single sync progress event as display lines.
pub fn format_sync_event(event: &SyncEvent) -> Vec<String> {
    match event {
        SyncEvent::Planned {
            series,
            publish,
            relabel,
            up_to_date,
        } => {
            let mut parts = vec![format!("{} to publish", publish)];
            if *relabel > 0 {
                parts.push(format!("{} to relabel", relabel));
            }
            parts.push(format!("{} up to date", up_to_date));
            vec![format!("{}: {}", series, parts.join(", "))]
        }
        SyncEvent::Published {
            chapter,
            label,
            pages,
        } => vec![format!(
            "{}published {} ({})",
            indent(1),
            chapter_line(label, chapter),
            plural(*pages, "page", "pages")
        )],
        SyncEvent::Relabelled { chapter, to, .. } => {
            vec![format!("{}relabelled [{}] \u{2192} {}", indent(1), chapter, to)]
        }
        SyncEvent::Failed { chapter, error } => {
            vec![format!("{}FAILED    [{}]: {}", indent(1), chapter, error)]
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// One summary line per series, for the end of a run.
pub fn format_report(report: &SyncReport) -> Vec<String> {
    vec![format!("==> {}: {}", report.series, report)]
}

/// Print a report to stdout.
pub fn print_report(report: &SyncReport) {
    for line in format_report(report) {
        println!("{}", line);
    }
}
