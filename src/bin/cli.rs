//! segkv CLI
//!
//! Opens a data directory directly and runs one command against it.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use segkv::{Config, Engine, KvError, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// segkv CLI
#[derive(Parser, Debug)]
#[command(name = "segkv-cli")]
#[command(about = "CLI for the segkv log-structured key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./segkv_data")]
    data_dir: String,

    /// Tail segment size in bytes before rotation
    #[arg(short, long, default_value_t = segkv::config::DEFAULT_SEGMENT_SIZE)]
    segment_size: u64,

    /// Maximum concurrent readers
    #[arg(short, long, default_value = "4")]
    readers: usize,

    /// fsync after every write
    #[arg(long)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Merge all sealed segments now
    Compact,

    /// Print segment statistics as JSON
    Stats,
}

fn main() -> ExitCode {
    // Initialize tracing/logging (stderr, so stdout stays clean for values)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("segkv CLI v{}", segkv::VERSION);

    let sync_strategy = if args.sync {
        SyncStrategy::EveryWrite
    } else {
        SyncStrategy::Never
    };

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .segment_size_threshold(args.segment_size)
        .max_concurrent_readers(args.readers)
        .sync_strategy(sync_strategy)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Data directory: {}", engine.data_dir().display());

    let outcome = run(&engine, args.command);
    let closed = engine.close();

    match outcome.and(closed) {
        Ok(()) => ExitCode::SUCCESS,
        Err(KvError::NotFound) => {
            eprintln!("(not found)");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(engine: &Engine, command: Commands) -> segkv::Result<()> {
    match command {
        Commands::Get { key } => {
            println!("{}", engine.get(&key)?);
        }
        Commands::Put { key, value } => {
            engine.put(&key, &value)?;
            println!("OK");
        }
        Commands::Compact => match engine.compact()? {
            Some(outcome) => println!(
                "Merged {} segments: {} keys, {} → {} bytes",
                outcome.mergees, outcome.keys, outcome.bytes_before, outcome.bytes_after
            ),
            None => println!("Nothing to merge"),
        },
        Commands::Stats => {
            let stats = engine.stats()?;
            let json = serde_json::to_string_pretty(&stats).map_err(|e| KvError::Io(e.into()))?;
            println!("{}", json);
        }
    }
    Ok(())
}
