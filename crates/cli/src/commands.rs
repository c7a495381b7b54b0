//! Clap command tree definition.

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("ranchvault")
        .about("Export, restore, inspect and verify RanchVault ranch archives")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Engine config file (default: ./ranchvault.toml if present)")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Debug logging (overrides RANCHVAULT_LOG)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(
            Command::new("export")
                .about("Export a ranch from a data directory into an archive")
                .arg(data_arg())
                .arg(ranch_arg())
                .arg(
                    Arg::new("out")
                        .short('o')
                        .long("out")
                        .help("Archive path (default: timestamped name in the current directory)")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("restore")
                .about("Restore an archive into a ranch of a data directory")
                .arg(archive_arg())
                .arg(data_arg())
                .arg(ranch_arg())
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .help("missing: add alongside live animals; replace: delete them first")
                        .value_parser(["missing", "replace"])
                        .default_value("missing"),
                )
                .arg(
                    Arg::new("create-ranch")
                        .long("create-ranch")
                        .help("Register the target ranch if the data directory lacks it")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print an archive's manifest without verifying it")
                .arg(archive_arg()),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify every checksum and count in an archive")
                .arg(archive_arg()),
        )
        .subcommand(
            Command::new("config")
                .about("Engine configuration")
                .subcommand_required(true)
                .subcommand(
                    Command::new("init")
                        .about("Write a default ranchvault.toml if none exists")
                        .arg(
                            Arg::new("path")
                                .help("Where to write (default: ./ranchvault.toml)")
                                .value_parser(value_parser!(PathBuf)),
                        ),
                ),
        )
}

fn data_arg() -> Arg {
    Arg::new("data")
        .long("data")
        .help("Ranch data directory (records.json plus media/)")
        .required(true)
        .value_parser(value_parser!(PathBuf))
}

fn ranch_arg() -> Arg {
    Arg::new("ranch")
        .long("ranch")
        .help("Ranch id")
        .required(true)
        .value_parser(value_parser!(u64))
}

fn archive_arg() -> Arg {
    Arg::new("archive")
        .help("Path to a .ranchvault.tar.zst archive")
        .required(true)
        .value_parser(value_parser!(PathBuf))
}
