//! Keeps a cluster identity-mapping document in sync with an identity
//! directory.
//!
//! Runs one reconciliation cycle at startup and then one per refresh interval
//! until SIGINT or SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use refresher::io::config::{RefresherConfig, load_config};
use refresher::io::directory::FileIdentityDirectory;
use refresher::io::store::FileConfigStore;
use refresher::logging;
use refresher::reconcile::{CycleOutcome, Reconciler};
use refresher::schedule::{CancelToken, TickerEvents, run_loop};

#[derive(Parser)]
#[command(
    name = "authmap-refresher",
    version,
    about = "Refresh an identity-mapping document from selector rules"
)]
struct Cli {
    /// Log level used when `RUST_LOG` is unset (`error`, `warn`, `info`, `debug`, `trace`, `off`).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// TOML config file. A missing file means defaults.
    #[arg(long, default_value = "refresher.toml")]
    config: PathBuf,

    /// Directory holding one YAML file per document.
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// YAML list of identities to match against.
    #[arg(long)]
    directory_file: Option<PathBuf>,

    /// Seconds between reconciliation cycles.
    #[arg(long)]
    refresh_interval_secs: Option<u64>,

    /// Identities fetched per directory page.
    #[arg(long)]
    page_size: Option<usize>,

    /// Run a single cycle and exit; non-zero exit if it fails.
    #[arg(long)]
    once: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;
    let cfg = resolve_config(&cli)?;

    if !cfg.store_dir.is_dir() {
        bail!("store directory {} does not exist", cfg.store_dir.display());
    }
    let store = FileConfigStore::new(&cfg.store_dir);
    let directory = FileIdentityDirectory::new(&cfg.directory_file, cfg.page_size);
    let reconciler = Reconciler::new(&store, &directory, cfg.documents.clone(), cfg.max_pages);
    info!(
        store_dir = %cfg.store_dir.display(),
        directory_file = %cfg.directory_file.display(),
        interval_secs = cfg.refresh_interval_secs,
        "refresher configured"
    );

    if cli.once {
        return match reconciler.run_once() {
            CycleOutcome::Applied(_) => Ok(()),
            CycleOutcome::Aborted { step } => bail!("reconciliation cycle failed at {step}"),
        };
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("install signal handler")?;

    let mut events = TickerEvents::new(cfg.refresh_interval(), cancel);
    let summary = run_loop(&mut events, || {
        reconciler.run_once();
    });
    info!(cycles = summary.cycles, "shutting down");
    Ok(())
}

/// Load the config file and apply command-line overrides.
fn resolve_config(cli: &Cli) -> Result<RefresherConfig> {
    let mut cfg = load_config(&cli.config)?;
    if let Some(dir) = &cli.store_dir {
        cfg.store_dir = dir.clone();
    }
    if let Some(file) = &cli.directory_file {
        cfg.directory_file = file.clone();
    }
    if let Some(secs) = cli.refresh_interval_secs {
        cfg.refresh_interval_secs = secs;
    }
    if let Some(size) = cli.page_size {
        cfg.page_size = size;
    }
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = Cli::parse_from(["authmap-refresher"]);
        assert_eq!(cli.log_level, "info");
        assert!(!cli.once);
        assert!(cli.refresh_interval_secs.is_none());
    }

    #[test]
    fn flags_override_config_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = temp.path().join("refresher.toml");
        std::fs::write(&config, "refresh_interval_secs = 60\npage_size = 5\n").expect("write");

        let cli = Cli::parse_from([
            "authmap-refresher",
            "--config",
            config.to_str().expect("utf8 path"),
            "--refresh-interval-secs",
            "30",
        ]);
        let cfg = resolve_config(&cli).expect("resolve");
        assert_eq!(cfg.refresh_interval_secs, 30);
        assert_eq!(cfg.page_size, 5);
    }

    #[test]
    fn huge_interval_flag_is_rejected() {
        let cli = Cli::parse_from([
            "authmap-refresher",
            "--config",
            "/nonexistent/refresher.toml",
            "--refresh-interval-secs",
            "18446744073709551615",
        ]);
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn zero_interval_flag_is_rejected() {
        let cli = Cli::parse_from([
            "authmap-refresher",
            "--config",
            "/nonexistent/refresher.toml",
            "--refresh-interval-secs",
            "0",
        ]);
        assert!(resolve_config(&cli).is_err());
    }
}
