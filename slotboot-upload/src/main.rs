// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host tool for the slotboot update client.
//!
//! Usage:
//!   slotboot-upload --board rp2040 stamp app.bin app.img --version 3 --target 0
//!   slotboot-upload --board rp2040 --port /dev/ttyACM0 info
//!   slotboot-upload --config targets/rp2040.toml --port /dev/ttyACM0 update app.img

mod cli;
mod commands;
mod config;
mod session;
mod stamp;
mod transport;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(args.verbose >= 2)
        .format_timestamp(if args.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    log::debug!("slotboot-upload v{}", env!("CARGO_PKG_VERSION"));
    cli::run(args)
}
