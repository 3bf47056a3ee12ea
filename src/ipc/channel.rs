//! Bidirectional message channel to the peer process.
//!
//! The peer is reached over TCP. Inbound frames are decoded on a background
//! reader thread and queued on a bounded channel, so the ingestion loop can
//! either block on the next message or wait with a timeout and poll its
//! cancellation flag.

use crate::ipc::framing::{read_frame, write_frame};
use crate::ipc::protocol::StatusMessage;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::io::BufReader;
use std::net::{Shutdown, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Inbound messages buffered between the reader thread and the consumer.
const INBOUND_QUEUE_CAPACITY: usize = 10_000;

/// Message-passing connection used by the ingestion loop.
pub trait MessageChannel {
    /// Transmit one message verbatim.
    fn send(&mut self, text: &str) -> Result<(), IpcError>;

    /// Block until one message is available.
    fn receive(&mut self) -> Result<String, IpcError>;

    /// Wait up to `timeout` for one message; `Ok(None)` if none arrived.
    fn receive_timeout(&mut self, timeout: Duration) -> Result<Option<String>, IpcError>;

    /// Release the channel. Safe to call more than once.
    fn close(&mut self);
}

impl<T: MessageChannel + ?Sized> MessageChannel for &mut T {
    fn send(&mut self, text: &str) -> Result<(), IpcError> {
        (**self).send(text)
    }

    fn receive(&mut self) -> Result<String, IpcError> {
        (**self).receive()
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<Option<String>, IpcError> {
        (**self).receive_timeout(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// TCP implementation of [`MessageChannel`].
pub struct IpcChannel {
    endpoint: String,
    stream: Option<TcpStream>,
    receiver: Receiver<String>,
    reader: Option<JoinHandle<()>>,
}

impl IpcChannel {
    /// Connect to the peer and announce readiness.
    ///
    /// The handshake is sent before this returns, so it always precedes any
    /// other outbound message.
    pub fn connect(endpoint: &str) -> Result<Self, IpcError> {
        let stream = TcpStream::connect(endpoint)
            .map_err(|e| IpcError::Connection(format!("{endpoint}: {e}")))?;
        let _ = stream.set_nodelay(true);

        let read_half = stream
            .try_clone()
            .map_err(|e| IpcError::Connection(format!("{endpoint}: {e}")))?;

        let (sender, receiver) = bounded(INBOUND_QUEUE_CAPACITY);
        let reader = thread::Builder::new()
            .name("ipc-reader".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(read_half);
                loop {
                    match read_frame(&mut reader) {
                        Ok(Some(bytes)) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                if sender.send(text).is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!("Skipping non UTF-8 frame: {e}"),
                        },
                        Ok(None) => {
                            tracing::debug!("Peer closed the connection");
                            break;
                        }
                        Err(e) => {
                            tracing::debug!("IPC reader stopped: {e}");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| IpcError::Connection(format!("could not spawn reader: {e}")))?;

        let mut channel = Self {
            endpoint: endpoint.to_string(),
            stream: Some(stream),
            receiver,
            reader: Some(reader),
        };

        let handshake = StatusMessage::started()
            .to_json()
            .map_err(|e| IpcError::Transmit(e.to_string()))?;
        channel.send(&handshake)?;

        tracing::info!(endpoint, "Connected to peer");
        Ok(channel)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl MessageChannel for IpcChannel {
    fn send(&mut self, text: &str) -> Result<(), IpcError> {
        let stream = self.stream.as_mut().ok_or(IpcError::ChannelClosed)?;
        tracing::trace!("<- out {text}");
        write_frame(stream, text.as_bytes()).map_err(|e| IpcError::Transmit(e.to_string()))
    }

    fn receive(&mut self) -> Result<String, IpcError> {
        if self.stream.is_none() {
            return Err(IpcError::ChannelClosed);
        }
        self.receiver.recv().map_err(|_| IpcError::ChannelClosed)
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<Option<String>, IpcError> {
        if self.stream.is_none() {
            return Err(IpcError::ChannelClosed);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(text) => Ok(Some(text)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(IpcError::ChannelClosed),
        }
    }

    fn close(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        let _ = stream.shutdown(Shutdown::Both);

        // Dropping the receiver unblocks a reader stuck on a full queue.
        self.receiver = crossbeam_channel::never();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        tracing::info!(endpoint = %self.endpoint, "IPC channel closed");
    }
}

impl Drop for IpcChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// IPC channel errors.
#[derive(Debug, Clone, PartialEq)]
pub enum IpcError {
    /// The peer could not be reached
    Connection(String),
    /// A message could not be written
    Transmit(String),
    /// The peer disconnected or the channel was closed
    ChannelClosed,
}

impl std::fmt::Display for IpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpcError::Connection(e) => write!(f, "Connection error: {e}"),
            IpcError::Transmit(e) => write!(f, "Transmit error: {e}"),
            IpcError::ChannelClosed => write!(f, "Channel closed by peer"),
        }
    }
}

impl std::error::Error for IpcError {}
