//! Import command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use ferry::config::Config;
use ferry::{ImportOptions, Importer};

use super::{build_policy, build_store, print_report, ConsoleProgress};

pub struct ImportArgs {
    pub config: Config,
    pub target: Option<String>,
    pub src: PathBuf,
    pub token: Option<String>,
    pub target_container: Option<String>,
    pub overwrite_dashboards: bool,
    pub include_containers: Vec<String>,
    pub exclude_containers: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub no_progress: bool,
}

/// Run the import command.
pub async fn run_import(args: ImportArgs) -> Result<()> {
    let store = build_store(
        &args.config.target,
        args.target,
        args.token,
        args.timeout_secs,
    )?;
    let policy = build_policy(&args.config, args.include_containers, args.exclude_containers);

    let opts = ImportOptions {
        policy,
        concurrency: args.concurrency.unwrap_or(args.config.run.concurrency),
        timeout: args
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| args.config.target.timeout()),
        overwrite_dashboards: args.overwrite_dashboards
            || args.config.run.overwrite_dashboards,
        target_container: args.target_container,
    };

    let mut importer = Importer::new(opts);
    let progress = if args.no_progress {
        None
    } else {
        Some(Arc::new(ConsoleProgress::new("Import:")))
    };
    if let Some(progress) = &progress {
        importer = importer.with_progress(progress.clone());
    }

    let cancel = importer.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });

    println!("Importing {} ", args.src.display());
    let report = importer
        .run(&store, &args.src)
        .await
        .context("import failed")?;

    if let Some(progress) = &progress {
        progress.finish();
    }
    print_report(&report);

    Ok(())
}
