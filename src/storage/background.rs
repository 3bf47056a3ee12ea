//! Dedicated writer thread fed through a bounded queue.
//!
//! The ingestion loop hands each full write buffer to the queue and moves on;
//! the writer thread owns the store and applies appends in queue order. When
//! the queue is full the ingestion thread waits, so no rows are ever dropped.

use crate::core::sample::Sample;
use crate::storage::{SampleStore, WriterError};
use crossbeam_channel::{bounded, Sender};
use std::thread::{self, JoinHandle};

enum WriterCommand {
    Append(Vec<Sample>),
    Finish,
}

/// [`SampleStore`] that forwards to a store running on its own thread.
pub struct BackgroundWriter {
    sender: Option<Sender<WriterCommand>>,
    handle: Option<JoinHandle<Result<(), WriterError>>>,
}

impl BackgroundWriter {
    /// Move `store` onto a new writer thread with a queue of `capacity` flushes.
    pub fn spawn<S>(mut store: S, capacity: usize) -> Result<Self, WriterError>
    where
        S: SampleStore + Send + 'static,
    {
        let (sender, receiver) = bounded::<WriterCommand>(capacity.max(1));

        let handle = thread::Builder::new()
            .name("recording-writer".to_string())
            .spawn(move || -> Result<(), WriterError> {
                for command in receiver {
                    match command {
                        WriterCommand::Append(rows) => store.append(rows)?,
                        WriterCommand::Finish => return store.finish(),
                    }
                }
                tracing::debug!("Writer queue closed without finish");
                Ok(())
            })
            .map_err(|e| WriterError::Io(format!("could not spawn writer thread: {e}")))?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Close the queue and wait for the writer thread to exit.
    fn join(&mut self) -> Result<(), WriterError> {
        self.sender = None;
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WriterError::WorkerStopped)?,
            None => Ok(()),
        }
    }
}

impl SampleStore for BackgroundWriter {
    fn append(&mut self, rows: Vec<Sample>) -> Result<(), WriterError> {
        let sender = self.sender.as_ref().ok_or(WriterError::NotOpen)?;
        if sender.send(WriterCommand::Append(rows)).is_ok() {
            return Ok(());
        }

        // The thread exited early; surface its error.
        self.join()?;
        Err(WriterError::WorkerStopped)
    }

    fn finish(&mut self) -> Result<(), WriterError> {
        let sender = self.sender.take().ok_or(WriterError::NotOpen)?;
        let _ = sender.send(WriterCommand::Finish);
        drop(sender);
        self.join()
    }
}

impl Drop for BackgroundWriter {
    fn drop(&mut self) {
        if self.sender.is_some() {
            if let Err(e) = self.finish() {
                tracing::warn!("Background writer did not finish cleanly: {e}");
            }
        }
    }
}
