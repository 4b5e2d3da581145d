//! CellDB CLI
//!
//! Inspect and edit the root tree of a store file.

use std::path::PathBuf;

use celldb::{Cell, Config, FileStore, GrowthPolicy, String64, TreeNode, Visit, TRASH_KEY};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// CellDB CLI
#[derive(Parser, Debug)]
#[command(name = "celldb-cli")]
#[command(about = "Inspect and edit a CellDB store file")]
#[command(version)]
struct Args {
    /// Store file (created if missing)
    #[arg(short, long, default_value = "./celldb.dat")]
    file: PathBuf,

    /// Pre-size the file to powers of two when creating records
    #[arg(long)]
    pow2: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the children of a node (the root if no path is given)
    Ls {
        /// Key path from the root
        keys: Vec<String>,
    },

    /// Print the whole tree below the root
    Tree,

    /// Create every missing node along a key path
    Add {
        /// Key path from the root
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Unlink the node at a key path and reclaim its space
    Rm {
        /// Key path from the root
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List reclaimed ranges on the free list
    Trash,

    /// Show file and cache statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,celldb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let growth = if args.pow2 {
        GrowthPolicy::PowerOfTwo
    } else {
        GrowthPolicy::Exact
    };
    let config = Config::builder().path(&args.file).growth(growth).build();

    let store = match FileStore::open(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store {}: {}", args.file.display(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&store, args.command) {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }
    store.close();
}

fn run(store: &FileStore, command: Commands) -> celldb::Result<()> {
    let root = store.root()?;

    match command {
        Commands::Ls { keys } => {
            let path = to_keys(&keys)?;
            match root.get_path(&path)? {
                Some(node) => {
                    for child in node.children() {
                        let child = child?;
                        println!("{:>10}  {}", child.offset(), child.value().key);
                    }
                }
                None => println!("(not found)"),
            }
        }

        Commands::Tree => {
            root.walk(|depth, node| {
                let value = node.value();
                println!("{}{} @{}", "  ".repeat(depth), value.key, node.offset());
                if depth == 0 && value.key == TRASH_KEY {
                    Visit::SkipChildren
                } else {
                    Visit::Descend
                }
            })?;
        }

        Commands::Add { keys } => {
            let path = to_keys(&keys)?;
            let node = root.get_or_add_path(&path)?;
            let written = store.flush()?;
            println!("{} @{} ({} pages written)", keys.join("/"), node.offset(), written);
        }

        Commands::Rm { keys } => {
            let path = to_keys(&keys)?;
            let Some((last, parents)) = path.split_last() else {
                return Ok(());
            };
            let removed = match root.get_path(parents)? {
                Some(parent) => reclaim_key(&parent, last)?,
                None => None,
            };
            match removed {
                Some(offset) => {
                    let written = store.flush()?;
                    println!("removed {} @{} ({} pages written)", keys.join("/"), offset, written);
                }
                None => println!("(not found)"),
            }
        }

        Commands::Trash => {
            let ranges = store.free_ranges()?;
            if ranges.is_empty() {
                println!("(free list empty)");
            }
            for (offset, length) in ranges {
                println!("{:>10}  {} bytes", offset, length);
            }
        }

        Commands::Stats => {
            let stats = store.stats();
            println!("path:        {}", store.path().display());
            println!("cursor:      {}", store.len());
            println!("file length: {}", store.file_len());
            println!("file reads:  {}", stats.file_reads);
            println!("cache hits:  {}", stats.cache_hits);
            println!("free ranges: {}", store.free_ranges()?.len());
        }
    }

    Ok(())
}

/// Parse a key path; the free list is not a tree and cannot be browsed as one
fn to_keys(keys: &[String]) -> celldb::Result<Vec<String64>> {
    if keys.first().is_some_and(|key| key == TRASH_KEY) {
        return Err(celldb::CellDbError::InvalidArgument(format!(
            "{} is reserved; use the trash command",
            TRASH_KEY
        )));
    }
    Ok(keys.iter().map(|key| String64::new(key)).collect())
}

fn reclaim_key(parent: &Cell<'_, TreeNode>, key: &String64) -> celldb::Result<Option<u64>> {
    let Some(node) = parent.get(key)? else {
        return Ok(None);
    };
    parent.reclaim(node.offset())?;
    Ok(Some(node.offset()))
}
