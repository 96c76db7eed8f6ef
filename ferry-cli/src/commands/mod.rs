pub mod export;
pub mod import;

pub use export::{run_export, ExportArgs};
pub use import::{run_import, ImportArgs};

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use ferry::config::{Config, ConnectionConfig};
use ferry::report::{ObjectOutcome, RunProgress};
use ferry::store::{Auth, HttpStore};
use ferry::{ObjectKind, RunReport, SelectionPolicy};

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("cannot load {}", path.display())),
        None => Config::load_default().context("cannot load default config"),
    }
}

/// Connection settings resolved from flags over config file values.
pub(crate) fn build_store(
    conn: &ConnectionConfig,
    url: Option<String>,
    token: Option<String>,
    timeout_secs: Option<u64>,
) -> Result<HttpStore> {
    let url = url.unwrap_or_else(|| conn.url.clone());
    let auth = match (token.or_else(|| conn.token.clone()), &conn.username) {
        (Some(token), _) => Auth::Bearer(token),
        (None, Some(username)) => Auth::Basic {
            username: username.clone(),
            password: conn.password.clone().unwrap_or_default(),
        },
        (None, None) => Auth::None,
    };
    let timeout = timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| conn.timeout());
    HttpStore::new(&url, auth, timeout).with_context(|| format!("cannot connect to {}", url))
}

pub(crate) fn build_policy(
    config: &Config,
    include: Vec<String>,
    exclude: Vec<String>,
) -> SelectionPolicy {
    let include = if include.is_empty() {
        config.run.include_containers.clone()
    } else {
        include
    };
    let exclude = if exclude.is_empty() {
        config.run.exclude_containers.clone()
    } else {
        exclude
    };
    SelectionPolicy::new(include, exclude)
}

/// Spinner-based progress display for interactive runs.
pub(crate) struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new(prefix: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix} {pos} objects {msg}")
                .unwrap()
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
        );
        bar.set_prefix(prefix.to_string());
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl RunProgress for ConsoleProgress {
    fn on_object(&self, outcome: &ObjectOutcome) {
        self.bar.inc(1);
        self.bar.set_message(format!(
            "[{} {}/{}]",
            outcome.outcome, outcome.container, outcome.identity
        ));
    }

    fn on_kind_complete(&self, kind: ObjectKind) {
        self.bar.println(format!("  {} pass complete", kind));
    }
}

pub(crate) fn print_report(report: &RunReport) {
    println!();
    print!("{}", report.render_summary());
    if report.has_failures() {
        println!(
            "{} object(s) failed; re-running the same command retries only what is missing",
            report.failures().len()
        );
    }
}
