//! Event rendering and sinks.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use colored::{ColoredString, Colorize};

use crate::provider::StatusEvent;

/// Column widths of the timestamp, group, logical id and status columns.
/// The reason column takes the rest of the line.
const COLUMNS: [usize; 4] = [24, 24, 32, 46];

/// Renders status events as aligned one-line records.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventPrinter;

impl EventPrinter {
    /// Creates a printer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the header line and its underline.
    #[must_use]
    pub fn header(&self) -> String {
        let line = Self::row(["Timestamp", "Stack", "Resource", "Status"], "Reason");
        let rule = "=".repeat(line.trim_end().chars().count());
        format!("{line}\n{rule}")
    }

    /// Renders one event.
    #[must_use]
    pub fn render(&self, event: &StatusEvent) -> String {
        let timestamp = event
            .timestamp
            .with_timezone(&Local)
            .format("%m/%d/%Y %I:%M:%S %p")
            .to_string();

        let status = fit(&event.status, COLUMNS[3]);
        let colored_status = status_color(&event.status, &status);

        format!(
            "{}{}{}{}{}",
            fit(&timestamp, COLUMNS[0]),
            fit(&event.group_name, COLUMNS[1]),
            fit(&event.logical_id, COLUMNS[2]),
            colored_status,
            event.reason.as_deref().unwrap_or_default()
        )
        .trim_end()
        .to_string()
    }

    fn row(cells: [&str; 4], last: &str) -> String {
        let mut line: String = cells
            .iter()
            .zip(COLUMNS)
            .map(|(cell, width)| fit(cell, width))
            .collect();
        line.push_str(last);
        line
    }
}

/// Pads or truncates `text` to `width` columns, leaving one space of gutter.
fn fit(text: &str, width: usize) -> String {
    let limit = width.saturating_sub(1);
    let count = text.chars().count();
    if count > limit {
        let truncated: String = text.chars().take(limit.saturating_sub(1)).collect();
        format!("{truncated}~ ")
    } else {
        format!("{text:<width$}")
    }
}

fn status_color(status: &str, padded: &str) -> ColoredString {
    if status == "DELETE_COMPLETE" {
        padded.bright_black()
    } else if status.ends_with("_COMPLETE") {
        padded.green()
    } else if status.ends_with("_FAILED") {
        padded.red()
    } else if status.ends_with("_IN_PROGRESS") {
        padded.blue()
    } else {
        padded.normal()
    }
}

/// Destination for live events and failure reports.
pub trait EventSink: Send + Sync {
    /// Called for every event a watcher yields, in chronological order.
    fn on_event(&self, event: &StatusEvent);

    /// Called with the rendered failure report of a stack.
    fn on_diagnosis(&self, group: &str, report: &str);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&self, _event: &StatusEvent) {}

    fn on_diagnosis(&self, _group: &str, _report: &str) {}
}

/// Sink that prints to stderr.
#[derive(Debug, Default)]
pub struct StderrSink {
    /// Line renderer.
    printer: EventPrinter,
    /// Whether the header is printed before the first event.
    show_header: bool,
    /// Set once the header has been printed.
    header_printed: AtomicBool,
}

impl StderrSink {
    /// Creates a stderr sink.
    #[must_use]
    pub const fn new(show_header: bool) -> Self {
        Self {
            printer: EventPrinter::new(),
            show_header,
            header_printed: AtomicBool::new(false),
        }
    }
}

impl EventSink for StderrSink {
    fn on_event(&self, event: &StatusEvent) {
        if self.show_header && !self.header_printed.swap(true, Ordering::Relaxed) {
            eprintln!("{}", self.printer.header());
        }
        eprintln!("{}", self.printer.render(event));
    }

    fn on_diagnosis(&self, group: &str, report: &str) {
        if report.is_empty() {
            eprintln!("{} no failure events recorded for {group}", "!".yellow());
            return;
        }
        eprintln!("\n{} {}\n", "Failures of".red().bold(), group.bold());
        eprint!("{report}");
    }
}
