//! `foldex` - query and update a folder message index from the shell.
//!
//! ```bash
//! foldex search INBOX '(match-all (not (system-flag "Seen")))'
//! foldex count INBOX '(system-flag "Flagged")'
//! foldex set-flags INBOX 42 Seen,Flagged Seen
//! foldex vfolder '(header-contains "from" "alice")' INBOX Archive
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use foldex_core::{
    CancellationToken, Folder, IndexConfig, MailFolder, SqliteBackend, SystemFlags, VeeFolder,
};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "foldex")]
#[command(about = "Search and update a folder message index", long_about = None)]
struct Cli {
    /// Index database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the UIDs matching an expression
    Search {
        /// Folder name
        folder: String,
        /// Search expression
        expr: String,
    },
    /// Print the number of messages matching an expression
    Count {
        /// Folder name
        folder: String,
        /// Search expression
        expr: String,
    },
    /// Replace the flags selected by a mask
    SetFlags {
        /// Folder name
        folder: String,
        /// Message UID
        uid: String,
        /// Flags to change, comma separated (e.g. Seen,Flagged)
        mask: String,
        /// New values for the masked flags, comma separated
        bits: String,
    },
    /// Print every UID with its flags
    List {
        /// Folder name
        folder: String,
    },
    /// Print the members of a virtual folder over the given folders
    Vfolder {
        /// Search expression
        expr: String,
        /// Source folder names
        #[arg(required = true)]
        folders: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foldex=info,foldex_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_dir(dirs::config_dir())?.join("config.json"),
    };
    let config = IndexConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let db_path = match cli.db.or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => default_dir(dirs::data_dir())?.join("index.db"),
    };
    let backend = open_backend(&db_path).await?;
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Search { folder, expr } => {
            let folder = open_folder(&backend, &config, &folder).await?;
            for uid in folder.search(&expr, None, &cancel)? {
                println!("{uid}");
            }
        }
        Commands::Count { folder, expr } => {
            let folder = open_folder(&backend, &config, &folder).await?;
            println!("{}", folder.count(&expr, &cancel)?);
        }
        Commands::SetFlags {
            folder,
            uid,
            mask,
            bits,
        } => {
            let mask = parse_flags(&mask)?;
            let bits = parse_flags(&bits)?;
            let folder = open_folder(&backend, &config, &folder).await?;
            if folder.get(&uid).is_none() {
                bail!("no message {uid} in {}", folder.full_name());
            }
            if folder.set_flags(&uid, mask, bits) {
                let written = folder.save(&backend).await?;
                debug!(written, "Saved folder");
                println!("changed");
            } else {
                println!("unchanged");
            }
        }
        Commands::List { folder } => {
            let folder = open_folder(&backend, &config, &folder).await?;
            for uid in folder.uids() {
                if let Some(record) = folder.get(&uid) {
                    println!("{uid}\t{}", record.flags.names().join(","));
                }
            }
        }
        Commands::Vfolder { expr, folders } => {
            let vee = VeeFolder::new("vfolder", &expr, &config)?;
            let mut names = HashMap::new();
            for name in &folders {
                let folder = open_folder(&backend, &config, name).await?;
                names.insert(vee.add_source(&folder)?, name.as_str());
            }
            for vuid in vee.uids() {
                if let Some(record) = vee.virtual_record(&vuid) {
                    let source = names.get(record.source_hash()).copied().unwrap_or_default();
                    println!("{source}\t{}", record.source_uid());
                }
            }
        }
    }

    Ok(())
}

fn default_dir(base: Option<PathBuf>) -> Result<PathBuf> {
    base.map(|dir| dir.join("foldex"))
        .context("cannot determine a default directory; pass it explicitly")
}

async fn open_backend(path: &Path) -> Result<SqliteBackend> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let path_str = path.to_string_lossy();
    info!(path = %path_str, "Opening index");
    SqliteBackend::new(&path_str)
        .await
        .with_context(|| format!("opening {}", path.display()))
}

async fn open_folder(backend: &SqliteBackend, config: &IndexConfig, name: &str) -> Result<Folder> {
    let folder = Folder::builder(name).config(&config.search).build();
    folder
        .load(backend)
        .await
        .with_context(|| format!("loading folder {name}"))?;
    debug!(folder = name, messages = folder.uids().len(), "Loaded folder");
    Ok(folder)
}

fn parse_flags(list: &str) -> Result<SystemFlags> {
    SystemFlags::parse_list(list).with_context(|| format!("unknown flag in '{list}'"))
}
