//! Export command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use ferry::config::Config;
use ferry::{ExportOptions, Exporter};

use super::{build_policy, build_store, print_report, ConsoleProgress};

pub struct ExportArgs {
    pub config: Config,
    pub source: Option<String>,
    pub dest: PathBuf,
    pub token: Option<String>,
    pub include_containers: Vec<String>,
    pub exclude_containers: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub no_progress: bool,
}

/// Run the export command.
pub async fn run_export(args: ExportArgs) -> Result<()> {
    let store = build_store(
        &args.config.source,
        args.source,
        args.token,
        args.timeout_secs,
    )?;
    let policy = build_policy(&args.config, args.include_containers, args.exclude_containers);

    let opts = ExportOptions {
        policy,
        concurrency: args.concurrency.unwrap_or(args.config.run.concurrency),
        timeout: args
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| args.config.source.timeout()),
    };

    let mut exporter = Exporter::new(opts);
    let progress = if args.no_progress {
        None
    } else {
        Some(Arc::new(ConsoleProgress::new("Export:")))
    };
    if let Some(progress) = &progress {
        exporter = exporter.with_progress(progress.clone());
    }

    // first interrupt stops new work; in-flight calls finish or time out
    let cancel = exporter.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });

    println!("Exporting into {}", args.dest.display());
    let report = exporter
        .run(&store, &args.dest)
        .await
        .context("export failed")?;

    if let Some(progress) = &progress {
        progress.finish();
    }
    print_report(&report);
    println!("Backup tree written to {}", args.dest.display());

    // individual object failures are reported above, not an exit code
    Ok(())
}
