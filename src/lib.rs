//! Vizzero Agent - multi-channel sensor sample ingestion.
//!
//! This library receives a continuous stream of sensor samples from a peer
//! process and feeds two consumers at once: a live renderer that gets
//! downsampled frames, and a recording file that captures the first few
//! seconds of the session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Vizzero Agent                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────┐          │
//! │  │ IPC Channel │──▶│   Ingest    │──▶│ Write Buffer │──▶ disk  │
//! │  │   (TCP)     │◀──│    Loop     │   └──────────────┘          │
//! │  └─────────────┘   │             │   ┌──────────────┐          │
//! │     keep-alive     │             │──▶│ Frame Buffer │──▶ view  │
//! │                    └─────────────┘   └──────────────┘          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use vizzero_agent::{core, ipc, render, stats, storage};
//!
//! let channel = ipc::IpcChannel::connect("127.0.0.1:3004").expect("peer unreachable");
//! let mut writer = storage::FileWriter::new("data");
//! writer.start().expect("could not open recording");
//!
//! let running = AtomicBool::new(true);
//! let result = core::run_ingest(
//!     channel,
//!     writer,
//!     render::NullSink,
//!     core::IngestSettings::default(),
//!     &running,
//!     stats::create_shared_stats(),
//! );
//! ```

pub mod config;
pub mod core;
pub mod ipc;
pub mod peer;
pub mod render;
pub mod stats;
pub mod storage;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{run_ingest, spawn_ingest, IngestError, IngestSettings, Sample};
pub use ipc::{IpcChannel, IpcError, MessageChannel};
pub use render::{frame_channel, ConsoleRenderer, RendererSink};
pub use stats::{IngestStats, SharedIngestStats, StatsSnapshot};
pub use storage::{BackgroundWriter, FileWriter, SampleStore, WriterError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
