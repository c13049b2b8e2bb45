use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use coop_migrate::CommitMode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use config::{Backend, ConfigFile};

/// coop: Schema migration tool for coop local databases.
///
/// Check the stored schema version, apply pending migrations, roll back,
/// and inspect or export the data they operate on.
#[derive(Parser)]
#[command(name = "coop", version, about, long_about = None)]
struct Cli {
    /// Path to the database file [default: coop.db].
    #[arg(long, global = true, env = "COOP_DB")]
    db: Option<PathBuf>,

    /// Storage backend [default: sqlite].
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Config file. Defaults to ./coop.toml when it exists.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show schema version and database statistics.
    Status,

    /// List registered migrations as applied or pending.
    History {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Apply pending migrations.
    Run {
        /// Record the version after each migration instead of once at the end.
        #[arg(long, conflicts_with = "atomic")]
        per_step: bool,

        /// Apply everything in one transaction (sqlite only).
        #[arg(long)]
        atomic: bool,
    },

    /// Undo migrations newer than a target version.
    Rollback {
        /// Version to roll back to, e.g. 1.0.0.
        target: String,

        /// Record the version after each migration instead of once at the end.
        #[arg(long, conflicts_with = "atomic")]
        per_step: bool,

        /// Roll back in one transaction (sqlite only).
        #[arg(long)]
        atomic: bool,
    },

    /// List keys, or show a single value.
    Inspect {
        /// Key to show. If omitted, lists all keys.
        key: Option<String>,

        /// Namespace to scope the lookup.
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Export data as JSON.
    Export {
        /// Namespace to export. Defaults to all.
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Launch the migration admin panel.
    AdminUi {
        /// Port to serve the panel on.
        #[arg(short, long, default_value = "4242")]
        port: u16,
    },
}

/// Setup logging with the specified log level
fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = ConfigFile::discover(cli.config.as_deref())?.resolve(cli.db, cli.backend);

    match cli.command {
        Commands::Status => commands::status(&settings),
        Commands::History { json } => commands::history(&settings, json),
        Commands::Run { per_step, atomic } => {
            if per_step {
                settings.migrations.commit = CommitMode::PerStep;
            }
            commands::run(&settings, atomic)
        }
        Commands::Rollback {
            target,
            per_step,
            atomic,
        } => {
            if per_step {
                settings.migrations.commit = CommitMode::PerStep;
            }
            commands::rollback(&settings, &target, atomic)
        }
        Commands::Inspect { key, namespace } => {
            commands::inspect(&settings, key.as_deref(), namespace.as_deref())
        }
        Commands::Export { namespace } => commands::export(&settings, namespace.as_deref()),
        Commands::AdminUi { port } => commands::admin_ui(&settings, port).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
