//! Vizzero Agent CLI
//!
//! Records and streams multi-channel sensor samples from a peer process.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vizzero_agent::{
    config::Config,
    core::{spawn_ingest, IngestSettings},
    ipc::{IpcChannel, IpcError},
    peer::{StreamSettings, SyntheticPeer},
    render::{frame_channel, ConsoleRenderer},
    stats::create_shared_stats,
    storage::{list_recordings, BackgroundWriter, FileWriter, SampleStore},
    IngestError, VERSION,
};

#[derive(Parser)]
#[command(name = "vizzero")]
#[command(version = VERSION)]
#[command(about = "Multi-channel sensor sample recorder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the peer, record one session and stream frames
    Run {
        /// Peer address (host:port)
        #[arg(long)]
        endpoint: Option<String>,

        /// Directory for recording files
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Recording duration in seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Forward one in every N samples to the renderer
        #[arg(long)]
        passes: Option<usize>,

        /// Write to disk on the ingestion thread
        #[arg(long)]
        inline_writes: bool,
    },

    /// Act as the sample producer for testing
    Simulate {
        /// Address to listen on (host:port)
        #[arg(long)]
        endpoint: Option<String>,

        /// Samples per second
        #[arg(long, default_value = "250")]
        rate: f64,

        /// Stop after this many samples
        #[arg(long)]
        count: Option<u64>,
    },

    /// List recordings
    Recordings {
        /// Directory to look in
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Delete the most recent recording
    Discard {
        /// Directory to look in
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            endpoint,
            output,
            duration,
            passes,
            inline_writes,
        } => cmd_run(endpoint, output, duration, passes, inline_writes),
        Commands::Simulate {
            endpoint,
            rate,
            count,
        } => cmd_simulate(endpoint, rate, count),
        Commands::Recordings { output } => cmd_recordings(output),
        Commands::Discard { output } => cmd_discard(output),
        Commands::Config { save } => cmd_config(save),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn cmd_run(
    endpoint: Option<String>,
    output: Option<PathBuf>,
    duration: Option<f64>,
    passes: Option<usize>,
    inline_writes: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load().unwrap_or_default();
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    if let Some(output) = output {
        config.output_dir = output;
    }
    if let Some(secs) = duration {
        if !secs.is_finite() || secs < 0.0 {
            bail!("--duration must be a non-negative number of seconds");
        }
        config.recording_duration = Duration::from_secs_f64(secs);
    }
    if let Some(passes) = passes {
        config.passes = passes;
    }
    if inline_writes {
        config.background_writes = false;
    }
    config.validate()?;

    println!("Vizzero Agent v{VERSION}");
    println!();
    println!("  Endpoint: {}", config.endpoint);
    println!("  Channels: {}", config.channel_count);
    println!(
        "  Recording: {:.1}s to {:?}",
        config.recording_duration.as_secs_f64(),
        config.output_dir
    );
    println!(
        "  Frames: {} samples, 1 in {} forwarded",
        config.frame_buffer_size, config.passes
    );
    println!();

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    config.ensure_directories()?;
    let channel = IpcChannel::connect(&config.endpoint)?;
    println!("Connected to {}", channel.endpoint());

    let mut writer = FileWriter::new(&config.output_dir);
    let path = writer.start()?;
    println!("Recording to {path:?}");
    println!("Press Ctrl+C to stop");
    println!();

    let store: Box<dyn SampleStore + Send> = if config.background_writes {
        Box::new(BackgroundWriter::spawn(writer, config.writer_queue_capacity)?)
    } else {
        Box::new(writer)
    };

    let stats = create_shared_stats();
    let (frames, frame_receiver) = frame_channel(config.frame_queue_capacity, Some(stats.clone()));
    let renderer = ConsoleRenderer::new(config.channel_count, config.history_capacity)
        .spawn(frame_receiver)
        .context("could not start renderer")?;

    let worker = spawn_ingest(
        channel,
        store,
        frames,
        IngestSettings::from(&config),
        running.clone(),
        stats.clone(),
    )
    .context("could not start ingestion worker")?;

    let result = worker
        .join()
        .map_err(|_| anyhow::anyhow!("ingestion worker panicked"))?;
    let render_summary = renderer
        .join()
        .map_err(|_| anyhow::anyhow!("renderer panicked"))?;

    println!();
    match result {
        Ok(()) => println!("Stopped."),
        Err(IngestError::Channel(IpcError::ChannelClosed)) => println!("Peer disconnected."),
        Err(e) => return Err(e.into()),
    }
    println!("Recording saved to {path:?}");
    println!("Frames rendered: {}", render_summary.frames);
    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_simulate(endpoint: Option<String>, rate: f64, count: Option<u64>) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let endpoint = endpoint.unwrap_or(config.endpoint.clone());
    if !rate.is_finite() || rate <= 0.0 {
        bail!("--rate must be positive");
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let peer =
        SyntheticPeer::bind(&endpoint).with_context(|| format!("could not bind {endpoint}"))?;
    println!("Waiting for a client on {}", peer.local_addr()?);

    let connection = peer.accept()?;
    let settings = StreamSettings {
        channel_count: config.channel_count,
        rate_hz: rate,
        count,
        ..StreamSettings::default()
    };
    let sent = connection.stream(&settings, &running)?;
    println!("Sent {sent} samples");
    Ok(())
}

fn cmd_recordings(output: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let dir = output.unwrap_or(config.output_dir);

    let files = list_recordings(&dir)?;
    if files.is_empty() {
        println!("No recordings found in {dir:?}");
        return Ok(());
    }

    println!("Found {} recording(s) in {:?}", files.len(), dir);
    for file in files {
        let size = std::fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
        let name = file.file_name().unwrap_or_default().to_string_lossy();
        println!("  {name}  ({size} bytes)");
    }
    Ok(())
}

fn cmd_discard(output: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let dir = output.unwrap_or(config.output_dir);

    match FileWriter::new(&dir).delete_latest()? {
        Some(path) => println!("Deleted {path:?}"),
        None => println!("No recordings found in {dir:?}"),
    }
    Ok(())
}

fn cmd_config(save: bool) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    if save {
        config.save()?;
        println!("Saved configuration to {:?}", Config::config_path());
        return Ok(());
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
