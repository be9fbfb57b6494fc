//! Dovetail CLI
//!
//! Command-line access to a directory-backed Dovetail store.
//!
//! # Commands
//!
//! - `post`, `put`, `patch`, `delete` - Journaled mutations
//! - `get` - Read a resource
//! - `log` - Print the command journal
//! - `sync-point` - Print the sync cursor
//! - `sync` - Run a sync round against the peer in `DOVETAIL_URL`

mod commands;
mod config;
mod error;

use crate::config::Config;
use clap::{Parser, Subcommand};
use dovetail_engine::EndpointConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Offline-first resource store.
#[derive(Parser)]
#[command(name = "dovetail")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the store
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Key namespace inside the store
    #[arg(global = true, short, long)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a resource of the given type
    Post {
        resource_type: String,
        /// JSON object
        json: String,
        /// Collection the new resource joins
        #[arg(long)]
        collection: Option<String>,
        /// Parent that embeds the new resource
        #[arg(long)]
        parent: Option<String>,
    },

    /// Replace a resource
    Put { id: String, json: String },

    /// Assign fields on a resource; `_remove` lists fields to drop
    Patch { id: String, json: String },

    /// Delete a resource
    Delete { id: String },

    /// Print a resource
    Get { key: String },

    /// Print the command journal
    Log,

    /// Print the sync cursor
    SyncPoint,

    /// Sync with the remote peer
    Sync {
        /// Sync targets
        #[arg(short, long = "target")]
        targets: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dovetail=info,dovetail_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(path) = cli.path {
        config.path = path;
    }
    if cli.namespace.is_some() {
        config.namespace = cli.namespace;
    }

    let device = commands::open_device(&config)?;
    let output = match cli.command {
        Commands::Post {
            resource_type,
            json,
            collection,
            parent,
        } => commands::post(&device, &resource_type, &json, collection, parent),
        Commands::Put { id, json } => commands::put(&device, &id, &json),
        Commands::Patch { id, json } => commands::patch(&device, &id, &json),
        Commands::Delete { id } => commands::delete(&device, &id),
        Commands::Get { key } => commands::get(&device, &key),
        Commands::Log => commands::log(&device),
        Commands::SyncPoint => commands::sync_point(&device),
        Commands::Sync { targets } => {
            let endpoint = EndpointConfig::from_env()?;
            tracing::info!(url = %endpoint.url, "syncing");
            commands::sync(device, endpoint, targets).await
        }
    }?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
