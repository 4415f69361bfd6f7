// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Target description loaded from TOML.
//!
//! ```toml
//! [target]
//! device_id = 0x10810005
//! write_chunk_size = 256
//!
//! [target.layout]
//! flash_start = 0x10000000
//! flash_end = 0x10200000
//! app_start = 0x10010000
//! partition_size = 0xC0000
//! image_count = 2
//! staging_slot = 1
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use slotboot_common::config::BootConfig;

/// Target file for the RP2040 bootloader build, shipped in `targets/`.
pub const RP2040_TARGET: &str = include_str!("../targets/rp2040.toml");

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    #[serde(flatten)]
    pub boot: BootConfig,
    /// Device id expected by the client, revision bits cleared.
    pub device_id: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    target: TargetConfig,
}

impl TargetConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text).context("Invalid target configuration")?;
        file.target
            .boot
            .validate()
            .context("Inconsistent target layout")?;
        Ok(file.target)
    }

    /// Load `path`, or fall back to the built-in defaults (a 128 KiB part
    /// with 64-byte pages, not the RP2040; see [`RP2040_TARGET`]).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("In {}", path.display()))
    }
}
