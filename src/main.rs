use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use gdctx::modules::constants::{DEFAULT_MARKER, DEFAULT_MOUNT_DIR};
use gdctx::{ContextConfig, ContextStore, MountBuilder, MountRecord, MountRegistry};
use log::{info, LevelFilter};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Name of the marker directory identifying a context
    #[arg(long, global = true, default_value = DEFAULT_MARKER)]
    marker: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a context
    Init {
        /// Context root (defaults to the current directory)
        path: Option<PathBuf>,
    },
    /// Show the context enclosing the current directory
    Where,
    /// Expose paths as symlinks under a mount root inside the context
    Mount {
        /// Mount root, relative to the context root
        #[arg(long = "at", default_value = DEFAULT_MOUNT_DIR)]
        at: String,
        /// Include hidden entries
        #[arg(long)]
        hidden: bool,
        /// Paths to expose
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Manage recorded mounts
    Mounts {
        /// List all recorded mounts
        #[arg(short = 'l', long = "list")]
        list: bool,
        /// Unmount a specific mount
        #[arg(short = 'u', long = "unmount")]
        unmount: bool,
        /// Unmount all recorded mounts
        #[arg(short = 'p', long = "purge")]
        purge: bool,
        /// Mount ID (required for unmount and show operations)
        mount_id: Option<String>,
    },
    /// List cached index entries
    Index,
}

fn print_record(record: &MountRecord) {
    println!("ID: {}", record.id);
    println!("  Root: {}", record.mount_root.display());
    for point in &record.mount.points {
        let note = if point.cleanable { "" } else { " (pre-existing)" };
        println!("  {} -> {}{}", point.name, point.source.display(), note);
    }
    println!();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger based on verbose flag
    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new().filter_level(log_level).init();

    let store = ContextStore::new(ContextConfig {
        marker: cli.marker.clone(),
        ..ContextConfig::default()
    });
    let cwd = env::current_dir().context("cannot determine current directory")?;

    match &cli.command {
        Commands::Init { path } => {
            let target = path.clone().unwrap_or_else(|| cwd.clone());
            fs::create_dir_all(&target)
                .with_context(|| format!("cannot create {}", target.display()))?;
            let abs = fs::canonicalize(&target)?;
            let init = store.initialize(&abs)?;
            if init.first_init {
                println!("Initialized context at {}", abs.display());
            } else {
                println!("Re-initialized existing context at {}", abs.display());
            }
        }
        Commands::Where => {
            let context = store.discover(&cwd)?;
            println!("{}", context.root().display());
            if !context.is_authenticated() {
                println!("(no credentials stored)");
            }
        }
        Commands::Mount { at, hidden, paths } => {
            let context = store.discover(&cwd)?;
            // Open the registry first so a mount is never left unrecorded
            let registry = MountRegistry::new(&context)?;
            let (rel, mount_root) = context.mount_target(at);
            let sources: Vec<PathBuf> = paths
                .iter()
                .map(|p| if p.is_absolute() { p.clone() } else { cwd.join(p) })
                .collect();

            let builder = MountBuilder::new(store.probe());
            let (mount, created) = builder.mount_points(rel, &mount_root, &sources, *hidden)?;

            match mount {
                Some(mount) => {
                    let id = registry.record(&mount_root, mount)?;
                    if let Some(record) = registry.get(&id)? {
                        print_record(&record);
                    }
                    println!("Unmount with: gdctx mounts -u {}", id);
                }
                None => {
                    println!("Nothing to mount");
                    for dir in created {
                        info!("Removing {}", dir.display());
                        fs::remove_dir_all(&dir)
                            .with_context(|| format!("cannot remove {}", dir.display()))?;
                    }
                }
            }
        }
        Commands::Mounts {
            list,
            unmount,
            purge,
            mount_id,
        } => {
            let context = store.discover(&cwd)?;
            let registry = MountRegistry::new(&context)?;
            match (list, unmount, purge, mount_id) {
                (true, _, _, _) => {
                    println!("Recorded mounts:");
                    for record in registry.list()? {
                        print_record(&record);
                    }
                }
                (_, true, _, Some(id)) => {
                    registry.release(id)?;
                    println!("Mount {} removed", id);
                }
                (_, _, true, _) => {
                    let released = registry.purge()?;
                    println!("Purged {} mounts", released);
                }
                (_, _, _, Some(id)) => match registry.get(id)? {
                    Some(record) => print_record(&record),
                    None => println!("Mount not found: {}", id),
                },
                _ => {
                    println!("Invalid command. Use --help for usage information.");
                }
            }
        }
        Commands::Index => {
            let context = store.discover(&cwd)?;
            match context.read_indices() {
                Ok(index) => {
                    println!("Index: {}", index.name);
                    for entry in &index.index {
                        let location = if entry.remote { "remote" } else { "local" };
                        println!(
                            "  {}  v{}  {}  {}",
                            entry.file_id, entry.version, entry.mime_type, location
                        );
                    }
                }
                Err(e) if e.is_not_found() => println!("No index cached"),
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}
