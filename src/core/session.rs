//! Recording session lifecycle and render-path downsampling.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Where a recording session is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Output file is open but no sample has arrived yet
    Idle,
    /// Samples are being written
    Recording,
    /// Duration reached or shut down; the output file has been finalized
    Finished,
}

/// Duration-bounded lifetime of one output file.
#[derive(Debug)]
pub struct RecordingSession {
    id: Uuid,
    state: SessionState,
    duration: Duration,
    started: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
}

impl RecordingSession {
    pub fn new(duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            duration,
            started: None,
            started_at: None,
        }
    }

    /// Mark the first sample. Only has an effect while idle.
    pub fn begin(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Recording;
            self.started = Some(Instant::now());
            self.started_at = Some(Utc::now());
        }
    }

    /// Whether samples should still be routed to the write path.
    pub fn accepts_writes(&self) -> bool {
        self.state != SessionState::Finished
    }

    /// Time since the first sample, zero while idle.
    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Whether the configured recording duration has been reached.
    pub fn is_expired(&self) -> bool {
        self.state == SessionState::Recording && self.elapsed() >= self.duration
    }

    /// Transition to the terminal state. Returns `false` if already finished.
    pub fn finish(&mut self) -> bool {
        if self.state == SessionState::Finished {
            return false;
        }
        self.state = SessionState::Finished;
        true
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }
}

/// Forwards one sample in every `passes` to the render path.
#[derive(Debug)]
pub struct Downsampler {
    passes: usize,
    counter: usize,
}

impl Downsampler {
    /// `passes` of zero is treated as one (forward everything).
    pub fn new(passes: usize) -> Self {
        Self {
            passes: passes.max(1),
            counter: 0,
        }
    }

    /// Count one consumed sample; returns `true` when it should be forwarded.
    pub fn tick(&mut self) -> bool {
        self.counter += 1;
        if self.counter < self.passes {
            return false;
        }
        self.counter = 0;
        true
    }
}
