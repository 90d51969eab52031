//! spill: spillway CLI
//!
//! Inspect and modify a directory-backed object store through the
//! streaming pumps.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use regex::Regex;
use spillway::{Bucket, EngineConfig, Entry, FsStore, WriteOperation};

/// Spillway CLI
#[derive(Parser)]
#[command(name = "spill")]
#[command(version = spillway::PKG_VERSION)]
#[command(about = "Stream objects in and out of a directory store")]
struct Args {
    /// Config file (default: ~/.spillway/config.toml, then /etc/spillway/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store root directory (overrides `store.root` from the config)
    #[arg(short, long, env = "SPILL_ROOT")]
    root: Option<PathBuf>,

    /// Units of work in flight (overrides `pump.concurrency`)
    #[arg(long)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List entries
    List {
        /// Only keys starting with this prefix
        prefix: Option<String>,
        /// Only keys matching this regular expression
        #[arg(short, long)]
        pattern: Option<String>,
        /// Print content lengths
        #[arg(short, long)]
        long: bool,
    },

    /// Print the content of one or more keys
    Get {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Create or replace a key
    Put { key: String, content: String },

    /// Recreate a key as appendable and append content
    Append { key: String, content: Option<String> },

    /// Delete one or more keys
    Rm {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!(version = %spillway::version::version_string(), "spill starting");
    let config = EngineConfig::load(args.config.as_deref())?;

    let root = args
        .root
        .or_else(|| config.store.root.clone())
        .ok_or("no store root (pass --root, set SPILL_ROOT, or set store.root in the config)")?;
    let store = FsStore::new(root)?.with_page_size(config.store.page_size);

    let mut builder = Bucket::builder().store(Arc::new(store)).config(&config);
    if let Some(concurrency) = args.concurrency {
        builder = builder.concurrency(concurrency);
    }
    let bucket = builder.build()?;

    match args.command {
        Command::List {
            prefix,
            pattern,
            long,
        } => {
            let entries = match pattern {
                Some(pattern) => {
                    let pattern = Regex::new(&pattern)?;
                    bucket.list_filtered(prefix.as_deref(), &pattern).await?
                }
                None => {
                    bucket
                        .list_async(prefix.as_deref(), bucket.output_options::<Entry>())
                        .await?
                }
            };
            for entry in entries {
                if long {
                    println!("{:>12}  {}", entry.content_length, entry.name);
                } else {
                    println!("{}", entry.name);
                }
            }
        }

        Command::Get { keys } => {
            if let [key] = keys.as_slice() {
                print!("{}", bucket.get(key).await?);
            } else {
                let contents = bucket
                    .load_async(keys, bucket.output_options::<String>())
                    .await?;
                for content in contents {
                    println!("{content}");
                }
            }
        }

        Command::Put { key, content } => {
            bucket.create(&key, &content).await?;
        }

        Command::Append { key, content } => {
            bucket.append(&key, content.as_deref()).await?;
        }

        Command::Rm { keys } => {
            let receipts = bucket
                .write_async(keys.into_iter().map(WriteOperation::delete))
                .await?;
            for receipt in receipts {
                println!("deleted {}", receipt.key);
            }
        }
    }

    Ok(())
}
