use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(about = "Ferry - backup and restore observability configuration")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to ~/.config/ferry/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export configuration from a source instance into a backup tree
    Export {
        /// Source API URL
        #[arg(long, env = "FERRY_SOURCE_URL")]
        source: Option<String>,

        /// Destination directory for the backup tree
        #[arg(short, long)]
        dest: PathBuf,

        /// API token for the source
        #[arg(long, env = "FERRY_SOURCE_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Only export these containers (comma-separated)
        #[arg(long, value_delimiter = ',')]
        include_containers: Vec<String>,

        /// Never export these containers (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude_containers: Vec<String>,

        /// Per-call timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Bound on concurrent container walks
        #[arg(long)]
        concurrency: Option<usize>,

        /// Disable the progress display
        #[arg(long)]
        no_progress: bool,
    },

    /// Import a backup tree into a target instance
    Import {
        /// Target API URL
        #[arg(long, env = "FERRY_TARGET_URL")]
        target: Option<String>,

        /// Backup tree to import
        #[arg(short, long)]
        src: PathBuf,

        /// API token for the target
        #[arg(long, env = "FERRY_TARGET_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Redirect every object into this container (cross-namespace
        /// migration)
        #[arg(long)]
        target_container: Option<String>,

        /// Replace existing dashboards instead of skipping them
        #[arg(long)]
        overwrite_dashboards: bool,

        /// Only import these containers (comma-separated)
        #[arg(long, value_delimiter = ',')]
        include_containers: Vec<String>,

        /// Never import these containers (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude_containers: Vec<String>,

        /// Per-call timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Bound on concurrent container passes
        #[arg(long)]
        concurrency: Option<usize>,

        /// Disable the progress display
        #[arg(long)]
        no_progress: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Export {
            source,
            dest,
            token,
            include_containers,
            exclude_containers,
            timeout_secs,
            concurrency,
            no_progress,
        } => {
            commands::run_export(commands::ExportArgs {
                config,
                source,
                dest,
                token,
                include_containers,
                exclude_containers,
                timeout_secs,
                concurrency,
                no_progress,
            })
            .await
        }
        Commands::Import {
            target,
            src,
            token,
            target_container,
            overwrite_dashboards,
            include_containers,
            exclude_containers,
            timeout_secs,
            concurrency,
            no_progress,
        } => {
            commands::run_import(commands::ImportArgs {
                config,
                target,
                src,
                token,
                target_container,
                overwrite_dashboards,
                include_containers,
                exclude_containers,
                timeout_secs,
                concurrency,
                no_progress,
            })
            .await
        }
    }
}
