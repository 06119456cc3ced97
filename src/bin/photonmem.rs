//! PhotonDB Memory command-line tool
//!
//! Inspects handles and allocator layout, and exercises the allocator.
//!
//! # Examples
//!
//! ```bash
//! # Decode a handle
//! photonmem decode 4611686022722355200
//!
//! # Show slots per slab for every chunk size
//! photonmem slot-counts --buffer-size 8192
//!
//! # Allocate 100k chunks of 64 bytes in parallel and print stats
//! photonmem stress --size 64 --count 100000
//!
//! # Print the effective configuration
//! photonmem --config memory.toml config
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use photonmem::memory::address::decode;
use photonmem::memory::size_class::{calculate_slot_count, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use photonmem::object::ClassCatalog;
use photonmem::{MemoryAccessor, MemoryConfig};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// PhotonDB Memory - emulated address space on pooled buffers
#[derive(Parser, Debug)]
#[command(name = "photonmem")]
#[command(version = photonmem::VERSION)]
#[command(about = "PhotonDB Memory - emulated address space on pooled buffers", long_about = None)]
#[command(author = "Anton Feldmann <afeldman@lynqtech.com>")]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "PHOTONMEM_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "PHOTONMEM_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a handle into its parts
    Decode {
        /// Handle value
        #[arg(allow_hyphen_values = true)]
        handle: i64,
    },

    /// Show slots per slab for every chunk size
    SlotCounts {
        /// Slab buffer size, defaults to the configured one
        #[arg(long)]
        buffer_size: Option<usize>,
    },

    /// Allocate, write and free chunks in parallel
    Stress(StressArgs),

    /// Print the effective configuration as TOML
    Config,

    /// Show version
    Version,
}

/// Stress run arguments
#[derive(Args, Debug)]
struct StressArgs {
    /// Allocation size in bytes
    #[arg(short, long, default_value = "64")]
    size: i64,

    /// Number of allocations
    #[arg(short, long, default_value = "10000")]
    count: usize,

    /// Keep the allocations alive when printing stats
    #[arg(long)]
    keep: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli)?;

    let config = MemoryConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Decode { handle } => decode_command(handle),
        Commands::SlotCounts { buffer_size } => {
            slot_counts_command(buffer_size.unwrap_or(config.slab_buffer_size))
        }
        Commands::Stress(args) => stress_command(&config, args),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Version => {
            println!("PhotonDB Memory {}", photonmem::VERSION);
            Ok(())
        }
    }
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "photonmem.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color)
                .pretty(),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

/// Decode command - print the parts of a handle
fn decode_command(handle: i64) -> anyhow::Result<()> {
    let address = decode(handle).with_context(|| format!("Cannot decode {}", handle))?;
    println!("{}", address);
    Ok(())
}

/// Slot counts command - one line per distinct slot count
fn slot_counts_command(buffer_size: usize) -> anyhow::Result<()> {
    let mut start = MIN_CHUNK_SIZE;
    let mut current = calculate_slot_count(start, buffer_size);

    println!("{:>12}  {:>6}", "chunk size", "slots");
    for chunk_size in MIN_CHUNK_SIZE + 1..=MAX_CHUNK_SIZE + 1 {
        let slots = if chunk_size <= MAX_CHUNK_SIZE {
            calculate_slot_count(chunk_size, buffer_size)
        } else {
            0
        };
        if slots != current {
            println!("{:>12}  {:>6}", format!("{}..={}", start, chunk_size - 1), current);
            start = chunk_size;
            current = slots;
        }
    }

    Ok(())
}

/// Stress command - parallel allocations against one accessor
fn stress_command(config: &MemoryConfig, args: StressArgs) -> anyhow::Result<()> {
    let memory = MemoryAccessor::new(config, Arc::new(ClassCatalog::new()))?;
    info!(size = args.size, count = args.count, "Starting stress run");

    let started = Instant::now();
    let handles = (0..args.count)
        .into_par_iter()
        .map(|i| -> photonmem::error::Result<i64> {
            let handle = memory.allocate(args.size)?;
            if args.size >= 8 {
                memory.set_long(handle, i as i64)?;
            }
            Ok(handle)
        })
        .collect::<photonmem::error::Result<Vec<_>>>()?;
    let allocated = started.elapsed();

    if !args.keep {
        handles
            .par_iter()
            .try_for_each(|&handle| memory.free(handle))?;
    }

    let stats = memory.stats();
    info!(
        allocated_ms = allocated.as_millis() as u64,
        total_ms = started.elapsed().as_millis() as u64,
        small_live_chunks = stats.small_live_chunks,
        big_live_allocations = stats.big_live_allocations,
        "Stress run finished"
    );
    if args.size == 0 {
        warn!("Zero-byte allocations yield the null handle");
    }

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
