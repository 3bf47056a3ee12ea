//! Core ingestion pipeline.
//!
//! This module contains:
//! - Sample decoding
//! - Fixed-capacity frame and write buffers
//! - Recording session and downsampling state
//! - The ingestion loop that ties them together

pub mod buffer;
pub mod ingest;
pub mod sample;
pub mod session;

// Re-export commonly used types
pub use buffer::SampleBuffer;
pub use ingest::{run_ingest, spawn_ingest, Ingest, IngestError, IngestSettings};
pub use sample::{Sample, SampleError};
pub use session::{Downsampler, RecordingSession, SessionState};
