//! Stack event history, live watching and failure diagnosis.
//!
//! - [`current_events`] reads the events of a stack's current operation.
//! - [`EventWatcher`] turns that into a cancellable chronological stream.
//! - [`EventMonitor`] runs an operation under a watcher and diagnoses
//!   failures with [`diagnose_failure`].
//! - [`EventSink`] implementations decide where events are shown.

mod diagnose;
mod history;
mod monitor;
mod printer;
mod watcher;

pub use diagnose::{diagnose_failure, is_failure_event, render_failure, wrap_text};
pub use history::current_events;
pub use monitor::EventMonitor;
pub use printer::{EventPrinter, EventSink, NullSink, StderrSink};
pub use watcher::{EventWatcher, WatchSettings};
