// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::commands;
use crate::config::{TargetConfig, RP2040_TARGET};
use crate::session::{Session, DEFAULT_MAX_RETRIES};
use crate::transport::{Transport, DEFAULT_BAUD};

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "slotboot-upload")]
#[command(about = "Stamp and upload firmware images to a slotboot update client")]
pub struct Cli {
    /// Serial port (e.g., /dev/ttyACM0)
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    #[arg(long, global = true, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// Target description (TOML with a [target] table, e.g. targets/rp2040.toml).
    /// Without it the built-in 128 KiB layout is used.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Built-in target description, instead of --config
    #[arg(short, long, global = true, value_enum, conflicts_with = "config")]
    pub board: Option<Board>,

    /// Reply timeout per attempt, in milliseconds
    #[arg(long, global = true, default_value_t = 1000)]
    pub timeout_ms: u64,

    #[arg(long, global = true, default_value_t = DEFAULT_MAX_RETRIES)]
    pub retries: u32,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Boards with a target description compiled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Board {
    /// slotboot-bootloader on the RP2040 (targets/rp2040.toml)
    Rp2040,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show the client's protocol version and transfer parameters
    Info,

    /// Ask the client whether the staged image is valid
    State,

    /// Transfer a stamped image into the staging slot
    Update {
        /// Stamped image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Device id expected by the client (overrides the config file)
        #[arg(long, value_parser = parse_u32)]
        device_id: Option<u32>,
    },

    /// Pad a raw binary to a full slot and append its footer
    Stamp {
        #[arg(value_name = "IN")]
        input: PathBuf,

        #[arg(value_name = "OUT")]
        output: PathBuf,

        /// Application version (neither 0 nor 0xFFFFFFFF)
        #[arg(short = 'V', long, value_parser = parse_u32)]
        version: u32,

        /// Slot the client promotes the image into
        #[arg(short, long, default_value_t = 0)]
        target: u8,

        /// Free-form execution id stored in the high byte of the application id
        #[arg(long, default_value_t = 0)]
        execution_id: u8,
    },
}

/// Decimal or `0x`-prefixed hexadecimal.
fn parse_u32(text: &str) -> Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", text, e))
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let mut target = match cli.board {
        Some(Board::Rp2040) => TargetConfig::parse(RP2040_TARGET)?,
        None => TargetConfig::load(cli.config.as_deref())?,
    };

    let open_session = |port: &Option<String>| -> Result<Session<Transport>> {
        let Some(port) = port else {
            bail!("This command needs --port");
        };
        let transport = Transport::new(port, cli.baud)?;
        log::debug!("opened {}", transport.port_name());
        Ok(Session::new(transport)
            .with_timeout(Duration::from_millis(cli.timeout_ms))
            .with_max_retries(cli.retries))
    };

    match cli.command {
        Commands::Info => commands::info(&mut open_session(&cli.port)?),
        Commands::State => commands::state(&mut open_session(&cli.port)?).map(drop),
        Commands::Update { ref file, device_id } => {
            if device_id.is_some() {
                target.device_id = device_id;
            }
            let image =
                fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
            commands::update(&mut open_session(&cli.port)?, &image, &target)
        }
        Commands::Stamp {
            ref input,
            ref output,
            version,
            target: slot,
            execution_id,
        } => commands::stamp(input, output, &target, version, slot, execution_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u32() {
        assert_eq!(parse_u32("42"), Ok(42));
        assert_eq!(parse_u32("0x10810005"), Ok(0x1081_0005));
        assert_eq!(parse_u32("0XFF"), Ok(0xFF));
        assert!(parse_u32("0x").is_err());
        assert!(parse_u32("twelve").is_err());
    }

    #[test]
    fn test_stamp_arguments() {
        let cli = Cli::try_parse_from([
            "slotboot-upload", "stamp", "app.bin", "app.img", "-V", "0x0102", "--target", "0",
        ])
        .unwrap();
        match cli.command {
            Commands::Stamp { version, target, .. } => {
                assert_eq!(version, 0x0102);
                assert_eq!(target, 0);
            }
            _ => panic!("expected stamp"),
        }
    }

    #[test]
    fn test_board_conflicts_with_config() {
        let cli = Cli::try_parse_from(["slotboot-upload", "--board", "rp2040", "info"]).unwrap();
        assert_eq!(cli.board, Some(Board::Rp2040));

        let both = Cli::try_parse_from([
            "slotboot-upload", "--board", "rp2040", "--config", "t.toml", "info",
        ]);
        assert!(both.is_err());
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["slotboot-upload", "info", "--port", "/dev/ttyACM0", "-vv"])
            .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(cli.verbose, 2);
    }
}
