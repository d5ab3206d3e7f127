//! # Upload Scout CLI (`uscout`)
//!
//! ## Usage
//!
//! ```bash
//! uscout --config ./config/scout.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `uscout init` | Create the SQLite database and schema |
//! | `uscout scan` | Index build scripts on the jump host |
//! | `uscout match <image> --namespace <ns>` | Rank build scripts that publish an image |
//! | `uscout routes` | Show externally reachable paths per service |
//! | `uscout completions <shell>` | Print shell completions |

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use upload_scout::logging::{self, LogFormat};
use upload_scout::progress::ProgressMode;
use upload_scout::{config, matching, migrate, routes, scan};

/// Upload Scout: find the build script behind a container image.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/scout.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "uscout",
    about = "Upload Scout: find the build script behind a container image",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/scout.toml")]
    config: PathBuf,

    /// Log level: trace, debug, info, warn, error. `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Scan progress on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Scan the jump host for build scripts and replace stored artifacts.
    ///
    /// Ctrl-C cancels the scan after the current remote command.
    Scan {
        /// Override `scan.batch_size` from config.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Rank the build scripts that could publish an image.
    Match {
        /// Full image reference, e.g. `harbor.local/shop/orders:v2`.
        image: String,

        /// Namespace of the workload running the image.
        #[arg(long)]
        namespace: String,

        /// Print matches as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Fetch reverse-proxy configs and print the service lookup index.
    Routes {
        /// Only show paths for this service (requires --namespace).
        #[arg(long)]
        service: Option<String>,

        /// Namespace of --service.
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init(&cli.log_level, format);

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "uscout", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Scan { batch_size } => {
            let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
            scan::run_scan_command(&cfg, batch_size, progress).await?;
        }
        Commands::Match {
            image,
            namespace,
            json,
        } => {
            matching::run_match(&cfg, &image, &namespace, json).await?;
        }
        Commands::Routes { service, namespace } => {
            routes::run_routes(&cfg, service.as_deref(), namespace.as_deref()).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
