//! The sample ingestion loop.
//!
//! One worker reads messages from the peer and routes every accepted sample
//! down two independent paths:
//!
//! ```text
//!                    ┌──────────────┐  full   ┌─────────────┐
//!               ┌──▶ │ Write Buffer │ ──────▶ │ SampleStore │ ──▶ disk
//! ┌─────────┐   │    └──────────────┘         └─────────────┘
//! │ Channel │ ──┤
//! └─────────┘   │    ┌─────────────┐   ┌──────────────┐  full  ┌──────────────┐
//!               └──▶ │ Downsampler │──▶│ Frame Buffer │ ─────▶ │ RendererSink │
//!                    └─────────────┘   └──────────────┘        └──────────────┘
//! ```
//!
//! The write path stops for good once the recording session has run for its
//! configured duration; the render path keeps going until shutdown.

use crate::config::Config;
use crate::core::buffer::SampleBuffer;
use crate::core::sample::Sample;
use crate::core::session::{Downsampler, RecordingSession};
use crate::ipc::channel::{IpcError, MessageChannel};
use crate::ipc::protocol::{decode, Inbound, ProtocolError, StatusMessage};
use crate::render::RendererSink;
use crate::stats::SharedIngestStats;
use crate::storage::{SampleStore, WriterError};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Tunables for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub channel_count: usize,
    pub write_buffer_size: usize,
    pub frame_buffer_size: usize,
    pub passes: usize,
    pub recording_duration: Duration,
    /// `None` blocks on each receive; shutdown is then only noticed after
    /// the next message.
    pub receive_timeout: Option<Duration>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for IngestSettings {
    fn from(config: &Config) -> Self {
        Self {
            channel_count: config.channel_count,
            write_buffer_size: config.write_buffer_size,
            frame_buffer_size: config.frame_buffer_size,
            passes: config.passes,
            recording_duration: config.recording_duration,
            receive_timeout: config.receive_timeout(),
        }
    }
}

/// Routing state for the ingestion loop.
pub struct Ingest {
    settings: IngestSettings,
    write_buffer: SampleBuffer,
    frame_buffer: SampleBuffer,
    downsampler: Downsampler,
    session: RecordingSession,
    stats: SharedIngestStats,
}

impl Ingest {
    pub fn new(settings: IngestSettings, stats: SharedIngestStats) -> Self {
        Self {
            write_buffer: SampleBuffer::new(settings.write_buffer_size),
            frame_buffer: SampleBuffer::new(settings.frame_buffer_size),
            downsampler: Downsampler::new(settings.passes),
            session: RecordingSession::new(settings.recording_duration),
            settings,
            stats,
        }
    }

    /// Process one raw message from the peer.
    ///
    /// Undecodable messages and bad sample payloads are logged and skipped.
    /// Only channel and storage failures are returned.
    pub fn handle_message<C, S, R>(
        &mut self,
        text: &str,
        channel: &mut C,
        store: &mut S,
        sink: &mut R,
    ) -> Result<(), IngestError>
    where
        C: MessageChannel + ?Sized,
        S: SampleStore + ?Sized,
        R: RendererSink + ?Sized,
    {
        self.stats.record_message();

        let inbound = match decode(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!("Skipping message: {e}");
                self.stats.record_malformed();
                return Ok(());
            }
        };

        match inbound {
            Inbound::StatusQuery => {
                channel.send(&StatusMessage::alive().to_json()?)?;
                self.stats.record_status_reply();
            }
            Inbound::Sample(payload) => self.handle_sample(payload, store, sink)?,
            Inbound::Other { command, action } => {
                tracing::debug!(?command, ?action, "Ignoring message");
            }
        }
        Ok(())
    }

    fn handle_sample<S, R>(
        &mut self,
        payload: Value,
        store: &mut S,
        sink: &mut R,
    ) -> Result<(), IngestError>
    where
        S: SampleStore + ?Sized,
        R: RendererSink + ?Sized,
    {
        let sample = match Sample::from_payload(payload, self.settings.channel_count) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!("Skipping sample: {e}");
                self.stats.record_skipped();
                return Ok(());
            }
        };
        self.stats.record_sample();
        tracing::trace!(sample_number = ?sample.sample_number, "Sample");

        if self.session.accepts_writes() {
            self.session.begin();
            if self.write_buffer.push(sample.clone()) {
                store.append(self.write_buffer.drain())?;
                self.stats.record_write_flush();

                if self.session.is_expired() {
                    self.session.finish();
                    store.finish()?;
                    tracing::info!(
                        session = %self.session.id(),
                        elapsed_secs = self.session.elapsed().as_secs_f64(),
                        "Recording session complete"
                    );
                }
            }
        }

        if self.downsampler.tick() && self.frame_buffer.push(sample) {
            let count = self.frame_buffer.capacity();
            sink.feed(self.frame_buffer.drain(), count);
            self.stats.record_frame_flush();
        }

        Ok(())
    }

    /// Finalize the recording if it is still open. Rows waiting in a partly
    /// filled write buffer are discarded.
    pub fn finalize<S>(&mut self, store: &mut S) -> Result<(), IngestError>
    where
        S: SampleStore + ?Sized,
    {
        if !self.session.finish() {
            return Ok(());
        }

        if !self.write_buffer.is_empty() {
            tracing::debug!(
                discarded = self.write_buffer.len(),
                "Discarding partial write buffer"
            );
            self.write_buffer.drain();
        }

        store.finish()?;
        tracing::info!(session = %self.session.id(), "Recording finalized at shutdown");
        Ok(())
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    /// Current write buffer index.
    pub fn write_index(&self) -> usize {
        self.write_buffer.len()
    }

    /// Current frame buffer index.
    pub fn frame_index(&self) -> usize {
        self.frame_buffer.len()
    }
}

/// Run the ingestion loop until `running` is cleared or an error occurs.
///
/// The flag is checked once per handled message and, when a receive timeout
/// is configured, after every timeout. Whatever way the loop ends, the
/// recording is finalized and the channel closed before returning.
pub fn run_ingest<C, S, R>(
    mut channel: C,
    mut store: S,
    mut sink: R,
    settings: IngestSettings,
    running: &AtomicBool,
    stats: SharedIngestStats,
) -> Result<(), IngestError>
where
    C: MessageChannel,
    S: SampleStore,
    R: RendererSink,
{
    let receive_timeout = settings.receive_timeout;
    let mut ingest = Ingest::new(settings, stats);
    let span = tracing::info_span!("ingest", session = %ingest.session().id());
    let _enter = span.enter();

    let result = (|| -> Result<(), IngestError> {
        while running.load(Ordering::SeqCst) {
            let text = match receive_timeout {
                Some(timeout) => match channel.receive_timeout(timeout)? {
                    Some(text) => text,
                    None => continue,
                },
                None => channel.receive()?,
            };
            ingest.handle_message(&text, &mut channel, &mut store, &mut sink)?;
        }
        tracing::info!("Stop requested");
        Ok(())
    })();

    if let Err(e) = &result {
        tracing::warn!("Ingestion stopped: {e}");
    }

    let finalized = ingest.finalize(&mut store);
    channel.close();

    result.and(finalized)
}

/// Run [`run_ingest`] on a dedicated worker thread.
pub fn spawn_ingest<C, S, R>(
    channel: C,
    store: S,
    sink: R,
    settings: IngestSettings,
    running: Arc<AtomicBool>,
    stats: SharedIngestStats,
) -> std::io::Result<JoinHandle<Result<(), IngestError>>>
where
    C: MessageChannel + Send + 'static,
    S: SampleStore + Send + 'static,
    R: RendererSink + Send + 'static,
{
    thread::Builder::new()
        .name("ingest".to_string())
        .spawn(move || run_ingest(channel, store, sink, settings, &running, stats))
}

/// Errors that end an ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    Channel(IpcError),
    Storage(WriterError),
    Protocol(ProtocolError),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Channel(e) => write!(f, "{e}"),
            IngestError::Storage(e) => write!(f, "Recording failed: {e}"),
            IngestError::Protocol(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<IpcError> for IngestError {
    fn from(e: IpcError) -> Self {
        IngestError::Channel(e)
    }
}

impl From<WriterError> for IngestError {
    fn from(e: WriterError) -> Self {
        IngestError::Storage(e)
    }
}

impl From<ProtocolError> for IngestError {
    fn from(e: ProtocolError) -> Self {
        IngestError::Protocol(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::protocol::{sample_message, status_query};
    use crate::stats::create_shared_stats;
    use std::collections::VecDeque;

    /// Replays scripted messages, then reports the peer as gone (or, with
    /// `stop`, clears the flag and times out).
    #[derive(Default)]
    struct ScriptedChannel {
        inbound: VecDeque<String>,
        sent: Vec<String>,
        closed: u32,
        stop: Option<Arc<AtomicBool>>,
    }

    impl ScriptedChannel {
        fn new(messages: impl IntoIterator<Item = String>) -> Self {
            Self {
                inbound: messages.into_iter().collect(),
                ..Default::default()
            }
        }
    }

    impl MessageChannel for ScriptedChannel {
        fn send(&mut self, text: &str) -> Result<(), IpcError> {
            self.sent.push(text.to_string());
            Ok(())
        }

        fn receive(&mut self) -> Result<String, IpcError> {
            self.inbound.pop_front().ok_or(IpcError::ChannelClosed)
        }

        fn receive_timeout(&mut self, _timeout: Duration) -> Result<Option<String>, IpcError> {
            match (self.inbound.pop_front(), &self.stop) {
                (Some(text), _) => Ok(Some(text)),
                (None, Some(stop)) => {
                    stop.store(false, Ordering::SeqCst);
                    Ok(None)
                }
                (None, None) => Err(IpcError::ChannelClosed),
            }
        }

        fn close(&mut self) {
            self.closed += 1;
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        appends: Vec<Vec<Sample>>,
        finishes: u32,
    }

    impl SampleStore for MemoryStore {
        fn append(&mut self, rows: Vec<Sample>) -> Result<(), WriterError> {
            if self.finishes > 0 {
                return Err(WriterError::NotOpen);
            }
            self.appends.push(rows);
            Ok(())
        }

        fn finish(&mut self) -> Result<(), WriterError> {
            self.finishes += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        frames: Vec<Vec<Sample>>,
    }

    impl RendererSink for CollectingSink {
        fn feed(&mut self, samples: Vec<Sample>, count: usize) {
            assert_eq!(samples.len(), count);
            self.frames.push(samples);
        }
    }

    fn samples(range: std::ops::Range<usize>, channels: usize) -> Vec<String> {
        range
            .map(|i| sample_message(i as i64, &vec![i as f64; channels], 0.0))
            .collect()
    }

    fn settings(write: usize, frame: usize, passes: usize, duration: Duration) -> IngestSettings {
        IngestSettings {
            channel_count: 8,
            write_buffer_size: write,
            frame_buffer_size: frame,
            passes,
            recording_duration: duration,
            receive_timeout: None,
        }
    }

    #[test]
    fn test_reference_scenario() {
        let mut channel = ScriptedChannel::new(samples(0..250, 8));
        let mut store = MemoryStore::default();
        let mut sink = CollectingSink::default();
        let stats = create_shared_stats();
        let running = AtomicBool::new(true);

        let result = run_ingest(
            &mut channel,
            &mut store,
            &mut sink,
            settings(100, 25, 1, Duration::from_secs(3600)),
            &running,
            stats.clone(),
        );

        assert_eq!(result, Err(IngestError::Channel(IpcError::ChannelClosed)));
        assert_eq!(store.appends.len(), 2);
        assert_eq!(store.appends[0][0].channels, vec![0.0; 8]);
        assert_eq!(store.appends[1][99].channels, vec![199.0; 8]);
        assert_eq!(store.finishes, 1);
        assert_eq!(sink.frames.len(), 10);
        assert_eq!(sink.frames[9][24].channels[0], 249.0);
        assert_eq!(channel.closed, 1);

        let snapshot = stats.stats();
        assert_eq!(snapshot.samples_processed, 250);
        assert_eq!(snapshot.write_flushes, 2);
        assert_eq!(snapshot.frame_flushes, 10);
    }

    #[test]
    fn test_zero_frame_size_feeds_single_sample_frames() {
        let mut channel = ScriptedChannel::new(samples(0..3, 8));
        let mut store = MemoryStore::default();
        let mut sink = CollectingSink::default();

        let _ = run_ingest(
            &mut channel,
            &mut store,
            &mut sink,
            settings(10, 0, 1, Duration::from_secs(60)),
            &AtomicBool::new(true),
            create_shared_stats(),
        );

        // The sink checks each frame's length against the announced count
        assert_eq!(sink.frames.len(), 3);
        assert!(sink.frames.iter().all(|f| f.len() == 1));
        assert_eq!(sink.frames[2][0].channels[0], 2.0);
    }

    #[test]
    fn test_status_query_gets_alive_reply_without_buffer_effects() {
        let mut ingest = Ingest::new(
            settings(10, 10, 1, Duration::from_secs(60)),
            create_shared_stats(),
        );
        let mut channel = ScriptedChannel::default();
        let mut store = MemoryStore::default();
        let mut sink = CollectingSink::default();

        ingest
            .handle_message(&status_query(), &mut channel, &mut store, &mut sink)
            .unwrap();

        assert_eq!(channel.sent.len(), 1);
        let reply: Value = serde_json::from_str(&channel.sent[0]).unwrap();
        assert_eq!(reply["action"], "alive");
        assert_eq!(reply["command"], "status");
        assert!(reply["message"].is_f64());
        assert_eq!(ingest.write_index(), 0);
        assert_eq!(ingest.frame_index(), 0);
        assert_eq!(ingest.session().state(), crate::core::SessionState::Idle);
    }

    #[test]
    fn test_malformed_messages_never_advance_indices() {
        let mut ingest = Ingest::new(
            settings(10, 10, 1, Duration::from_secs(60)),
            create_shared_stats(),
        );
        let mut channel = ScriptedChannel::default();
        let mut store = MemoryStore::default();
        let mut sink = CollectingSink::default();

        let junk = [
            "{not json".to_string(),
            "[1, 2, 3]".to_string(),
            r#"{"command":"sample","action":"process","message":"text"}"#.to_string(),
            r#"{"command":"sample","action":"process","message":{"sampleNumber":1}}"#.to_string(),
            sample_message(0, &[1.0, 2.0, 3.0], 0.0),
        ];

        for text in samples(0..9, 8) {
            ingest
                .handle_message(&text, &mut channel, &mut store, &mut sink)
                .unwrap();
        }
        for text in &junk {
            ingest
                .handle_message(text, &mut channel, &mut store, &mut sink)
                .unwrap();
            assert_eq!(ingest.write_index(), 9);
            assert_eq!(ingest.frame_index(), 9);
        }
        assert!(store.appends.is_empty());

        let last = sample_message(9, &[9.0; 8], 0.0);
        ingest
            .handle_message(&last, &mut channel, &mut store, &mut sink)
            .unwrap();
        assert_eq!(store.appends.len(), 1);
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(ingest.write_index(), 0);
    }

    #[test]
    fn test_no_writes_after_recording_duration() {
        let mut channel = ScriptedChannel::new(samples(0..55, 8));
        let mut store = MemoryStore::default();
        let mut sink = CollectingSink::default();
        let running = AtomicBool::new(true);

        let result = run_ingest(
            &mut channel,
            &mut store,
            &mut sink,
            settings(10, 5, 1, Duration::ZERO),
            &running,
            create_shared_stats(),
        );

        assert_eq!(result, Err(IngestError::Channel(IpcError::ChannelClosed)));
        assert_eq!(store.appends.len(), 1);
        assert_eq!(store.finishes, 1);
        // Render path is unaffected by the end of the recording
        assert_eq!(sink.frames.len(), 11);
    }

    #[test]
    fn test_downsampling_forwards_one_in_n() {
        let mut channel = ScriptedChannel::new(samples(0..20, 8));
        let mut sink = CollectingSink::default();
        let running = AtomicBool::new(true);

        let _ = run_ingest(
            &mut channel,
            MemoryStore::default(),
            &mut sink,
            settings(100, 5, 2, Duration::from_secs(60)),
            &running,
            create_shared_stats(),
        );

        assert_eq!(sink.frames.len(), 2);
        let forwarded: Vec<f64> = sink.frames[0].iter().map(|s| s.channels[0]).collect();
        assert_eq!(forwarded, vec![1.0, 3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_cleared_flag_still_finalizes_and_closes() {
        let mut channel = ScriptedChannel::new(samples(0..5, 8));
        let mut store = MemoryStore::default();
        let running = AtomicBool::new(false);

        let result = run_ingest(
            &mut channel,
            &mut store,
            CollectingSink::default(),
            settings(10, 10, 1, Duration::from_secs(60)),
            &running,
            create_shared_stats(),
        );

        assert!(result.is_ok());
        assert_eq!(channel.inbound.len(), 5);
        assert_eq!(store.finishes, 1);
        assert_eq!(channel.closed, 1);
    }

    #[test]
    fn test_timed_receive_observes_stop_flag() {
        let running = Arc::new(AtomicBool::new(true));
        let mut channel = ScriptedChannel::new(samples(0..3, 8));
        channel.stop = Some(running.clone());
        let mut store = MemoryStore::default();

        let mut settings = settings(2, 10, 1, Duration::from_secs(60));
        settings.receive_timeout = Some(Duration::from_millis(1));

        let result = run_ingest(
            &mut channel,
            &mut store,
            CollectingSink::default(),
            settings,
            &running,
            create_shared_stats(),
        );

        assert!(result.is_ok());
        assert_eq!(store.appends.len(), 1);
        assert_eq!(store.finishes, 1);
    }

    #[test]
    fn test_spawned_worker_returns_result() {
        let channel = ScriptedChannel::new(samples(0..3, 8));
        let handle = spawn_ingest(
            channel,
            MemoryStore::default(),
            crate::render::NullSink,
            settings(10, 10, 1, Duration::from_secs(60)),
            Arc::new(AtomicBool::new(true)),
            create_shared_stats(),
        )
        .unwrap();

        let result = handle.join().unwrap();
        assert_eq!(result, Err(IngestError::Channel(IpcError::ChannelClosed)));
    }
}
