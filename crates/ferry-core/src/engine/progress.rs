//! Progress emission policy.

use std::time::Duration;

use tokio::time::Instant;

use super::ProgressSink;

/// Tracks transferred bytes and decides when to report them.
///
/// Reports on every chunk boundary crossing, on reaching the total, and
/// whenever `interval` has passed since the last report, whether bytes
/// moved or not. Counts never decrease.
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    total: u64,
    done: u64,
    chunk_size: u64,
    last_boundary: u64,
    interval: Duration,
    last_emit: Instant,
}

impl<'a> ProgressTracker<'a> {
    /// Tracker for a transfer of `total` bytes
    pub fn new(sink: &'a dyn ProgressSink, total: u64, chunk_size: usize, interval: Duration) -> Self {
        Self {
            sink,
            total,
            done: 0,
            chunk_size: chunk_size.max(1) as u64,
            last_boundary: 0,
            interval,
            last_emit: Instant::now(),
        }
    }

    /// Report the starting point
    pub fn start(&mut self) {
        self.emit();
    }

    /// Account for `n` more bytes
    pub fn advance(&mut self, n: u64) {
        self.done = self.done.saturating_add(n).min(self.total);
        let boundary = self.done / self.chunk_size;
        if boundary > self.last_boundary || self.done == self.total || self.is_due() {
            self.last_boundary = boundary;
            self.emit();
        }
    }

    /// Re-report the current count
    pub fn heartbeat(&mut self) {
        self.emit();
    }

    /// Bytes accounted so far
    pub fn done(&self) -> u64 {
        self.done
    }

    /// Total announced at header time
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Heartbeat interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the next report is owed if nothing else triggers one
    pub fn next_due(&self) -> Instant {
        self.last_emit + self.interval
    }

    fn is_due(&self) -> bool {
        self.last_emit.elapsed() >= self.interval
    }

    fn emit(&mut self) {
        self.last_emit = Instant::now();
        self.sink.progress(self.done, self.total);
    }
}
