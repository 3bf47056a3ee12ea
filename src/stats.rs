//! Ingestion statistics.
//!
//! Counters are shared between the ingestion thread, the renderer hand-off
//! and the CLI, so they are plain atomics behind an `Arc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Live counters for one ingestion run.
#[derive(Debug)]
pub struct IngestStats {
    /// Messages received from the peer
    messages_received: AtomicU64,
    /// Messages that could not be decoded
    malformed_messages: AtomicU64,
    /// Samples accepted into the pipeline
    samples_processed: AtomicU64,
    /// Sample messages rejected for a bad payload
    samples_skipped: AtomicU64,
    /// Keep-alive replies sent
    status_replies: AtomicU64,
    /// Write buffers handed to storage
    write_flushes: AtomicU64,
    /// Frame buffers handed to the renderer
    frame_flushes: AtomicU64,
    /// Frames discarded because the renderer queue was full
    frames_dropped: AtomicU64,
    /// Run start time
    started: DateTime<Utc>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            malformed_messages: AtomicU64::new(0),
            samples_processed: AtomicU64::new(0),
            samples_skipped: AtomicU64::new(0),
            status_replies: AtomicU64::new(0),
            write_flushes: AtomicU64::new(0),
            frame_flushes: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            started: Utc::now(),
        }
    }

    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample(&self) {
        self.samples_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.samples_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status_reply(&self) {
        self.status_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_flush(&self) {
        self.write_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_flush(&self) {
        self.frame_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            samples_processed: self.samples_processed.load(Ordering::Relaxed),
            samples_skipped: self.samples_skipped.load(Ordering::Relaxed),
            status_replies: self.status_replies.load(Ordering::Relaxed),
            write_flushes: self.write_flushes.load(Ordering::Relaxed),
            frame_flushes: self.frame_flushes.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            started: self.started,
            duration_secs: (Utc::now() - self.started).num_milliseconds() as f64 / 1000.0,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Messages received: {}\n\
             - Malformed messages: {}\n\
             - Samples processed: {}\n\
             - Samples skipped: {}\n\
             - Keep-alive replies: {}\n\
             - Write flushes: {}\n\
             - Frame flushes: {} ({} dropped)\n\
             - Duration: {:.1} seconds",
            stats.messages_received,
            stats.malformed_messages,
            stats.samples_processed,
            stats.samples_skipped,
            stats.status_replies,
            stats.write_flushes,
            stats.frame_flushes,
            stats.frames_dropped,
            stats.duration_secs
        )
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub messages_received: u64,
    pub malformed_messages: u64,
    pub samples_processed: u64,
    pub samples_skipped: u64,
    pub status_replies: u64,
    pub write_flushes: u64,
    pub frame_flushes: u64,
    pub frames_dropped: u64,
    pub started: DateTime<Utc>,
    pub duration_secs: f64,
}

/// Thread-safe shared statistics.
pub type SharedIngestStats = Arc<IngestStats>;

/// Create a new shared statistics block.
pub fn create_shared_stats() -> SharedIngestStats {
    Arc::new(IngestStats::new())
}
