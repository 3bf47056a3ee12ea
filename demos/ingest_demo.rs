//! End-to-end demonstration of the ingestion pipeline in one process.
//!
//! This example:
//! 1. Starts a synthetic peer on a local port
//! 2. Connects the IPC channel and opens a recording
//! 3. Runs the ingestion loop with the console renderer
//! 4. Prints statistics and the recording size
//!
//! Run with: cargo run --example ingest_demo

use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use vizzero_agent::{
    core::{run_ingest, IngestSettings},
    ipc::IpcChannel,
    peer::{StreamSettings, SyntheticPeer},
    render::{frame_channel, ConsoleRenderer},
    stats::create_shared_stats,
    storage::FileWriter,
};

fn main() {
    println!("Vizzero Agent - Ingest Demo");
    println!("===========================");
    println!();

    let peer = SyntheticPeer::bind("127.0.0.1:0").expect("Failed to bind peer");
    let addr = peer.local_addr().expect("No local address");

    let producer = thread::spawn(move || {
        let connection = peer.accept().expect("No client");
        let settings = StreamSettings {
            rate_hz: 1000.0,
            count: Some(2000),
            keepalive_interval: Duration::from_millis(500),
            ..StreamSettings::default()
        };
        connection
            .stream(&settings, &AtomicBool::new(true))
            .expect("Stream failed")
    });

    let output_dir = std::env::temp_dir().join("vizzero-demo");
    let channel = IpcChannel::connect(&addr.to_string()).expect("Failed to connect");
    let mut writer = FileWriter::new(&output_dir);
    let path = writer.start().expect("Failed to open recording");
    println!("Recording to {path:?}");

    let stats = create_shared_stats();
    let (frames, receiver) = frame_channel(16, Some(stats.clone()));
    let renderer = ConsoleRenderer::new(8, 2500)
        .spawn(receiver)
        .expect("Failed to start renderer");

    let settings = IngestSettings {
        recording_duration: Duration::from_secs(1),
        ..IngestSettings::default()
    };
    let result = run_ingest(
        channel,
        writer,
        frames,
        settings,
        &AtomicBool::new(true),
        stats.clone(),
    );
    println!("Ingestion ended: {result:?}");

    let sent = producer.join().expect("Producer panicked");
    let summary = renderer.join().expect("Renderer panicked");
    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

    println!();
    println!("Samples sent by peer: {sent}");
    println!("Frames rendered: {}", summary.frames);
    println!("Recording size: {size} bytes");
    println!();
    println!("{}", stats.summary());
}
