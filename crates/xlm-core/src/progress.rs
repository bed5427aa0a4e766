//! Progress events and cooperative cancellation
//!
//! The engine only ever writes events; whoever owns the sink decides how to
//! render them. An `mpsc::Sender` is a sink, so a UI thread can simply drain
//! the matching receiver.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One progress notification, delivered in completion order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    FileStarted {
        path: PathBuf,
    },
    FileCompleted {
        path: PathBuf,
        success: bool,
        elapsed: Duration,
    },
    FileFailed {
        path: PathBuf,
        reason: String,
    },
    GroupWritten {
        name: String,
        row_count: usize,
        shard_count: usize,
    },
    Done {
        output_path: PathBuf,
    },
    Failed {
        reason: String,
    },
}

/// Receiver side of engine progress.
///
/// Called from ingestion worker threads, hence `Send + Sync`.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

impl ProgressSink for Sender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // a closed receiver just means nobody is watching anymore
        let _ = self.send(event);
    }
}

impl ProgressSink for Mutex<Vec<ProgressEvent>> {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.lock() {
            events.push(event);
        }
    }
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn emit(&self, event: ProgressEvent) {
        (**self).emit(event);
    }
}

/// Shared stop flag, checked between file reads
#[derive(Debug, Default, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Reads already in flight still finish.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
