//! rawstore control tool
//!
//! Creates backing files and inspects devices formatted by rawstore.

use std::fs::OpenOptions;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fs2::FileExt;
use rawstore::config::{DEFAULT_METADATA_LOG_SIZE, DEFAULT_SLOT_SIZE, DEFAULT_WAL_SIZE};
use rawstore::{Config, Device, LogKind, RawStoreError, ResourceKind};
use tracing_subscriber::{fmt, EnvFilter};

/// rawstore control tool
#[derive(Parser, Debug)]
#[command(name = "rawstore-ctl")]
#[command(about = "Inspect and prepare rawstore devices")]
#[command(version)]
struct Args {
    /// Metadata-log region size in bytes
    #[arg(long, global = true, default_value_t = DEFAULT_METADATA_LOG_SIZE)]
    metadata_log_size: u64,

    /// Write-ahead-log region size in bytes
    #[arg(long, global = true, default_value_t = DEFAULT_WAL_SIZE)]
    wal_size: u64,

    /// Slot size in bytes (footer included)
    #[arg(long, global = true, default_value_t = DEFAULT_SLOT_SIZE)]
    slot_size: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pre-allocate a backing file to use instead of a raw device
    Create {
        path: PathBuf,

        /// Size in MiB
        #[arg(short, long = "size")]
        size_mb: u64,
    },

    /// Print the region layout of a device
    Layout { path: PathBuf },

    /// List the valid frames of a log region
    DumpLog {
        path: PathBuf,

        #[arg(short, long, value_enum, default_value_t = LogArg::Metadata)]
        kind: LogArg,
    },

    /// Print the footer size of a slot
    Slot { path: PathBuf, id: u64 },

    /// Show which primitive a host file name maps to
    Classify { name: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogArg {
    Metadata,
    Wal,
}

impl From<LogArg> for LogKind {
    fn from(arg: LogArg) -> Self {
        match arg {
            LogArg::Metadata => LogKind::Metadata,
            LogArg::Wal => LogKind::WriteAhead,
        }
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rawstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(if e.is_fatal() { 2 } else { 1 });
    }
}

fn run(args: Args) -> rawstore::Result<()> {
    let config_for = |path: PathBuf| {
        Config::builder()
            .device_path(path)
            .metadata_log_size(args.metadata_log_size)
            .wal_size(args.wal_size)
            .slot_size(args.slot_size)
            .build()
    };

    match args.command {
        Commands::Create { ref path, size_mb } => {
            let size = size_mb.checked_mul(1024 * 1024).ok_or_else(|| {
                RawStoreError::Config(format!("backing file of {} MiB overflows u64", size_mb))
            })?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(path)?;
            file.allocate(size)?;
            tracing::info!("Created {} ({} bytes)", path.display(), size);
        }

        Commands::Layout { ref path } => {
            let device = Device::open(config_for(path.clone()))?;
            let layout = device.layout();
            println!("device size      {}", layout.device_size);
            println!(
                "metadata log     [{}, {})",
                layout.metadata_log.offset,
                layout.metadata_log.end()
            );
            println!(
                "write-ahead log  [{}, {})",
                layout.write_ahead_log.offset,
                layout.write_ahead_log.end()
            );
            println!("slots            [{}, {})", layout.slots.offset, layout.slots.end());
            println!("slot size        {}", layout.slot_size);
            println!("slot count       {}", layout.slot_count);
        }

        Commands::DumpLog { ref path, kind } => {
            let device = Device::open(config_for(path.clone()))?;
            let log = device.open_log(kind.into(), format!("{:?}", kind));
            let frames = log.frames();
            for frame in &frames {
                println!(
                    "seq={:<10} type={:?} len={}",
                    frame.sequence,
                    frame.frame_type,
                    frame.payload.len()
                );
            }
            println!("{} valid frames", frames.len());
        }

        Commands::Slot { ref path, id } => {
            let device = Device::open(config_for(path.clone()))?;
            match device.slot_len(id) {
                Ok(len) => println!("slot {} at offset {}: {} bytes", id, device.slot_offset(id), len),
                Err(e @ RawStoreError::CorruptFooter { .. }) => println!("slot {}: {}", id, e),
                Err(e) => return Err(e),
            }
        }

        Commands::Classify { ref name } => match ResourceKind::classify(name) {
            ResourceKind::Chunk(id) => println!("{}: slot chunk {}", name, id),
            ResourceKind::MetadataLog => println!("{}: metadata log", name),
            ResourceKind::WriteAheadLog => println!("{}: write-ahead log", name),
            ResourceKind::Other => println!("{}: not persisted", name),
        },
    }

    Ok(())
}
