//! Recording storage.
//!
//! This module contains:
//! - The delimited-text file writer
//! - A background writer that moves disk I/O off the ingestion thread

pub mod background;
pub mod writer;

use crate::core::sample::Sample;

// Re-export commonly used types
pub use background::BackgroundWriter;
pub use writer::{ensure_dir, list_recordings, FileWriter};

/// Destination for full write buffers.
pub trait SampleStore {
    /// Persist one drained write buffer. Calls are applied in order.
    fn append(&mut self, rows: Vec<Sample>) -> Result<(), WriterError>;

    /// Finalize and close the current recording.
    fn finish(&mut self) -> Result<(), WriterError>;
}

impl<T: SampleStore + ?Sized> SampleStore for &mut T {
    fn append(&mut self, rows: Vec<Sample>) -> Result<(), WriterError> {
        (**self).append(rows)
    }

    fn finish(&mut self) -> Result<(), WriterError> {
        (**self).finish()
    }
}

impl<T: SampleStore + ?Sized> SampleStore for Box<T> {
    fn append(&mut self, rows: Vec<Sample>) -> Result<(), WriterError> {
        (**self).append(rows)
    }

    fn finish(&mut self) -> Result<(), WriterError> {
        (**self).finish()
    }
}

/// Recording storage errors.
#[derive(Debug, Clone, PartialEq)]
pub enum WriterError {
    /// Output directory could not be created
    CreateDir(String),
    /// Read, write or truncate failed
    Io(String),
    /// No recording file is open
    NotOpen,
    /// A recording file is already open
    AlreadyOpen,
    /// The background writer thread has stopped
    WorkerStopped,
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::CreateDir(e) => write!(f, "Could not create output directory: {e}"),
            WriterError::Io(e) => write!(f, "IO error: {e}"),
            WriterError::NotOpen => write!(f, "No recording file is open"),
            WriterError::AlreadyOpen => write!(f, "A recording file is already open"),
            WriterError::WorkerStopped => write!(f, "Background writer has stopped"),
        }
    }
}

impl std::error::Error for WriterError {}
