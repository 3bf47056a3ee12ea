//! Synthetic peer process.
//!
//! Plays the part of the sample producer: listens on the endpoint, accepts a
//! single client, and streams sine-wave samples with periodic keep-alive
//! queries. Used by `vizzero simulate` and by the integration tests.

use crate::ipc::framing::{read_frame, write_frame};
use crate::ipc::protocol::{sample_message, status_query, unix_millis};
use std::f64::consts::TAU;
use std::io::{self, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// How the synthetic stream is generated.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub channel_count: usize,
    /// Samples per second
    pub rate_hz: f64,
    /// Stop after this many samples; `None` streams until stopped
    pub count: Option<u64>,
    /// Interval between keep-alive queries
    pub keepalive_interval: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            channel_count: 8,
            rate_hz: 250.0,
            count: None,
            keepalive_interval: Duration::from_secs(1),
        }
    }
}

/// Listening side of the synthetic peer.
pub struct SyntheticPeer {
    listener: TcpListener,
}

impl SyntheticPeer {
    pub fn bind(endpoint: &str) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(endpoint)?,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for one client.
    pub fn accept(&self) -> io::Result<PeerConnection> {
        let (stream, addr) = self.listener.accept()?;
        stream.set_nodelay(true)?;
        tracing::info!(client = %addr, "Client connected");
        Ok(PeerConnection { stream })
    }
}

/// One accepted client connection.
pub struct PeerConnection {
    stream: TcpStream,
}

impl PeerConnection {
    /// Read the next message; `None` once the client has disconnected.
    pub fn read_message(&mut self) -> io::Result<Option<String>> {
        match read_frame(&mut self.stream)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| io::Error::new(ErrorKind::InvalidData, e)),
            None => Ok(None),
        }
    }

    pub fn send_message(&mut self, text: &str) -> io::Result<()> {
        write_frame(&mut self.stream, text.as_bytes())
    }

    pub fn send_sample(&mut self, sample_number: i64, channel_data: &[f64]) -> io::Result<()> {
        self.send_message(&sample_message(sample_number, channel_data, unix_millis()))
    }

    pub fn send_status_query(&mut self) -> io::Result<()> {
        self.send_message(&status_query())
    }

    /// Stop sending; the client sees the channel close.
    pub fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Write);
    }

    /// Stream synthetic samples at the configured rate.
    ///
    /// Messages from the client (handshake, keep-alive replies) are logged on
    /// a background thread. Returns the number of samples sent. A client that
    /// hangs up ends the stream without error.
    pub fn stream(mut self, settings: &StreamSettings, running: &AtomicBool) -> io::Result<u64> {
        if !settings.rate_hz.is_finite() || settings.rate_hz <= 0.0 {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("sample rate must be positive, got {}", settings.rate_hz),
            ));
        }

        let mut replies = PeerConnection {
            stream: self.stream.try_clone()?,
        };
        let reply_reader = thread::Builder::new()
            .name("peer-replies".to_string())
            .spawn(move || {
                while let Ok(Some(text)) = replies.read_message() {
                    tracing::info!("-> in {text}");
                }
            })?;

        let period = Duration::from_secs_f64(1.0 / settings.rate_hz);
        let mut next_send = Instant::now();
        let mut last_keepalive = Instant::now();
        let mut sent: u64 = 0;

        let result = loop {
            if !running.load(Ordering::SeqCst) || settings.count.is_some_and(|c| sent >= c) {
                break Ok(sent);
            }

            if last_keepalive.elapsed() >= settings.keepalive_interval {
                if let Err(e) = self.send_status_query() {
                    break hangup_or_error(e, sent);
                }
                last_keepalive = Instant::now();
            }

            let values = synthetic_sample(sent, settings.channel_count, settings.rate_hz);
            if let Err(e) = self.send_sample(sent as i64, &values) {
                break hangup_or_error(e, sent);
            }
            sent += 1;

            next_send += period;
            let now = Instant::now();
            if next_send > now {
                thread::sleep(next_send - now);
            }
        };

        self.close();
        let _ = reply_reader.join();
        tracing::info!(sent, "Synthetic stream finished");
        result
    }
}

fn hangup_or_error(e: io::Error, sent: u64) -> io::Result<u64> {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            tracing::info!("Client hung up");
            Ok(sent)
        }
        _ => Err(e),
    }
}

/// Channel readings for sample `n` at a positive `rate_hz`: one sine per
/// channel at 1, 2, 3… Hz.
pub fn synthetic_sample(n: u64, channel_count: usize, rate_hz: f64) -> Vec<f64> {
    let t = n as f64 / rate_hz;
    (0..channel_count)
        .map(|c| {
            let freq = (c + 1) as f64;
            (100.0 * (TAU * freq * t).sin()).round() / 100.0
        })
        .collect()
}
