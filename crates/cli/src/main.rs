//! RanchVault CLI: export, restore, inspect and verify ranch archives.
//!
//! - `ranchvault export --data <dir> --ranch <id> [--out <path>]`: snapshot a ranch
//! - `ranchvault restore <archive> --data <dir> --ranch <id> [--mode missing|replace]`
//! - `ranchvault inspect <archive>`: print the manifest without verifying
//! - `ranchvault verify <archive>`: full validation pass, exit 1 on failure
//! - `ranchvault config init [path]`: write the default `ranchvault.toml`
//!
//! A data directory holds `records.json` and a `media/` blob tree. Engine
//! settings come from `--config`, else `./ranchvault.toml` when present.
//! Progress messages and logs go to stderr; `RANCHVAULT_LOG` sets the filter (default
//! `ranchvault=info`), `-v` switches to debug.

mod commands;
mod data;
mod format;

use anyhow::{Context, Result};
use clap::ArgMatches;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use data::DataDir;
use format::{
    format_config_init, format_error, format_export, format_manifest, format_restore,
    format_verify, OutputMode,
};
use ranchvault_archive::{ArchiveHandle, ArchiveReader};
use ranchvault_core::RanchId;
use ranchvault_engine::{
    CancellationToken, RestoreMode, RestoreOptions, RestoreOrchestrator, SnapshotBuilder,
    VaultConfig, CONFIG_FILE_NAME,
};

const LOG_ENV: &str = "RANCHVAULT_LOG";

fn main() {
    let matches = build_cli().get_matches();
    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    init_tracing(matches.get_count("verbose"));

    if let Err(e) = run(&matches, mode) {
        eprintln!("{}", format_error(&e, mode));
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let filter = if verbose > 0 {
        EnvFilter::new("ranchvault=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("ranchvault=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(matches: &ArgMatches, mode: OutputMode) -> Result<()> {
    match matches.subcommand() {
        Some(("export", sub)) => {
            let config = load_config(matches)?;
            let data = DataDir::open(data_path(sub)?)?;
            let ranch = ranch_id(sub)?;
            let builder = SnapshotBuilder::new(data.records.clone(), data.blobs.clone(), config);
            let mut progress = |msg: &str| eprintln!("{}", msg);
            let cancel = CancellationToken::new();
            let report = match sub.get_one::<PathBuf>("out") {
                Some(out) => builder.export(ranch, out, &mut progress, &cancel),
                None => builder.export_to_dir(ranch, Path::new("."), &mut progress, &cancel),
            }
            .with_context(|| format!("Failed to export ranch {}", ranch))?;
            println!("{}", format_export(&report, mode));
        }
        Some(("restore", sub)) => {
            let config = load_config(matches)?;
            let path = archive_path(sub)?;
            let data = DataDir::open(data_path(sub)?)?;
            let ranch = ranch_id(sub)?;
            if sub.get_flag("create-ranch") {
                data.ensure_ranch(ranch);
            }
            let restore_mode: RestoreMode = sub
                .get_one::<String>("mode")
                .map(String::as_str)
                .unwrap_or("missing")
                .parse()?;
            let options = RestoreOptions {
                mode: restore_mode,
                ranch_id: ranch,
            };
            let orchestrator =
                RestoreOrchestrator::new(data.records.clone(), data.blobs.clone(), config);
            let mut progress = |msg: &str| eprintln!("{}", msg);
            let result = orchestrator.restore(
                &ArchiveHandle::new(&path),
                options,
                &mut progress,
                &CancellationToken::new(),
            );
            // A restore can fail after mutating the ranch; keep what was written
            data.save()?;
            let summary =
                result.with_context(|| format!("Failed to restore {}", path.display()))?;
            println!("{}", format_restore(&summary, mode));
        }
        Some(("inspect", sub)) => {
            let path = archive_path(sub)?;
            let manifest = ArchiveReader::read_manifest(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            println!("{}", format_manifest(&manifest, mode));
        }
        Some(("verify", sub)) => {
            let path = archive_path(sub)?;
            let info = RestoreOrchestrator::verify_archive(&path)
                .with_context(|| format!("Failed to verify {}", path.display()))?;
            tracing::debug!(target: "ranchvault::cli", path = %path.display(), "Archive verified");
            println!("{}", format_verify(&info, &path, mode));
        }
        Some(("config", sub)) => match sub.subcommand() {
            Some(("init", init)) => {
                let path = init
                    .get_one::<PathBuf>("path")
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
                let written = VaultConfig::write_default_if_missing(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("{}", format_config_init(&path, written, mode));
            }
            other => anyhow::bail!("Unknown config command: {:?}", other.map(|(name, _)| name)),
        },
        other => anyhow::bail!("Unknown command: {:?}", other.map(|(name, _)| name)),
    }
    Ok(())
}

fn load_config(matches: &ArgMatches) -> Result<VaultConfig> {
    let path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    VaultConfig::load_or_default(&path)
        .with_context(|| format!("Failed to load config {}", path.display()))
}

fn data_path(matches: &ArgMatches) -> Result<&Path> {
    matches
        .get_one::<PathBuf>("data")
        .map(PathBuf::as_path)
        .context("Missing data directory")
}

fn ranch_id(matches: &ArgMatches) -> Result<RanchId> {
    matches
        .get_one::<u64>("ranch")
        .map(|id| RanchId(*id))
        .context("Missing ranch id")
}

fn archive_path(matches: &ArgMatches) -> Result<PathBuf> {
    matches
        .get_one::<PathBuf>("archive")
        .cloned()
        .context("Missing archive path")
}
