//! Terminal stand-in for the graphical renderer.
//!
//! Runs on its own thread, drains the frame queue into a circular history and
//! logs per-frame channel levels.

use crate::core::sample::Sample;
use crate::render::history::SignalHistory;
use crossbeam_channel::Receiver;
use std::thread::{self, JoinHandle};

/// What the renderer saw over its lifetime.
#[derive(Debug, Clone, Default)]
pub struct RenderSummary {
    pub frames: u64,
    pub samples: u64,
    /// Last reading per channel, if any frame arrived
    pub latest: Option<Vec<f64>>,
}

/// Consumes frames on the render thread.
pub struct ConsoleRenderer {
    history: SignalHistory,
    frames: u64,
    samples: u64,
}

impl ConsoleRenderer {
    pub fn new(channel_count: usize, history_capacity: usize) -> Self {
        Self {
            history: SignalHistory::new(channel_count, history_capacity),
            frames: 0,
            samples: 0,
        }
    }

    /// Add one frame to the history.
    pub fn render(&mut self, frame: &[Sample]) {
        for sample in frame {
            self.history.push(&sample.channels);
        }
        self.frames += 1;
        self.samples += frame.len() as u64;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let levels: Vec<String> = (0..self.history.channel_count())
                .map(|c| format!("{:.2}", mean_abs(frame, c)))
                .collect();
            tracing::debug!(frame = self.frames, "levels [{}]", levels.join(" "));
        }
    }

    /// Drain `receiver` until every sender has gone.
    pub fn run(mut self, receiver: Receiver<Vec<Sample>>) -> RenderSummary {
        for frame in receiver {
            self.render(&frame);
        }
        self.summary()
    }

    /// Run on a dedicated render thread.
    pub fn spawn(
        self,
        receiver: Receiver<Vec<Sample>>,
    ) -> std::io::Result<JoinHandle<RenderSummary>> {
        thread::Builder::new()
            .name("renderer".to_string())
            .spawn(move || self.run(receiver))
    }

    pub fn summary(&self) -> RenderSummary {
        RenderSummary {
            frames: self.frames,
            samples: self.samples,
            latest: self.history.latest(),
        }
    }

    pub fn history(&self) -> &SignalHistory {
        &self.history
    }
}

fn mean_abs(frame: &[Sample], channel: usize) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let total: f64 = frame
        .iter()
        .filter_map(|s| s.channels.get(channel))
        .map(|v| v.abs())
        .sum();
    total / frame.len() as f64
}
