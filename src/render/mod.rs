//! Hand-off of flushed frames to the live renderer.
//!
//! The ingestion thread never touches renderer state directly. Each full
//! frame buffer is moved through a bounded queue to the render thread; if the
//! renderer falls behind, frames are dropped rather than stalling ingestion.

pub mod console;
pub mod history;

use crate::core::sample::Sample;
use crate::stats::SharedIngestStats;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

// Re-export commonly used types
pub use console::{ConsoleRenderer, RenderSummary};
pub use history::SignalHistory;

/// Consumer of flushed frame buffers.
pub trait RendererSink {
    /// Accept one frame of `count` samples. The frame is owned by the sink.
    fn feed(&mut self, samples: Vec<Sample>, count: usize);
}

impl<T: RendererSink + ?Sized> RendererSink for &mut T {
    fn feed(&mut self, samples: Vec<Sample>, count: usize) {
        (**self).feed(samples, count)
    }
}

/// Sink that discards every frame.
#[derive(Debug, Default)]
pub struct NullSink;

impl RendererSink for NullSink {
    fn feed(&mut self, _samples: Vec<Sample>, _count: usize) {}
}

/// Sending half of the renderer queue.
pub struct FrameSender {
    sender: Sender<Vec<Sample>>,
    stats: Option<SharedIngestStats>,
    disconnected: bool,
}

/// Create a bounded frame queue holding at most `capacity` frames.
pub fn frame_channel(
    capacity: usize,
    stats: Option<SharedIngestStats>,
) -> (FrameSender, Receiver<Vec<Sample>>) {
    let (sender, receiver) = bounded(capacity.max(1));
    (
        FrameSender {
            sender,
            stats,
            disconnected: false,
        },
        receiver,
    )
}

impl RendererSink for FrameSender {
    fn feed(&mut self, mut samples: Vec<Sample>, count: usize) {
        samples.truncate(count);
        match self.sender.try_send(samples) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Renderer queue full, dropping frame");
                if let Some(stats) = &self.stats {
                    stats.record_frame_dropped();
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                if !self.disconnected {
                    tracing::warn!("Renderer has gone away, frames will be discarded");
                    self.disconnected = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::create_shared_stats;

    fn frame(n: usize) -> Vec<Sample> {
        (0..n).map(|i| Sample::new(vec![i as f64])).collect()
    }

    #[test]
    fn test_frames_arrive_in_order() {
        let (mut sender, receiver) = frame_channel(4, None);
        sender.feed(frame(3), 3);
        sender.feed(frame(2), 2);

        assert_eq!(receiver.try_recv().unwrap().len(), 3);
        assert_eq!(receiver.try_recv().unwrap().len(), 2);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let stats = create_shared_stats();
        let (mut sender, receiver) = frame_channel(1, Some(stats.clone()));

        sender.feed(frame(1), 1);
        sender.feed(frame(1), 1);
        sender.feed(frame(1), 1);

        assert_eq!(receiver.len(), 1);
        assert_eq!(stats.stats().frames_dropped, 2);
    }

    #[test]
    fn test_disconnected_renderer_is_tolerated() {
        let (mut sender, receiver) = frame_channel(1, None);
        drop(receiver);
        sender.feed(frame(1), 1);
        sender.feed(frame(1), 1);
        assert!(sender.disconnected);
    }
}
