// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Board configuration: 2 MiB QSPI flash, 64 KiB bootloader, two 768 KiB
//! image slots. Must agree with `memory.x`.

use slotboot_common::config::{
    Advisory, BootConfig, DeviceIdentity, FlashLayout, FormatVersion, SentinelPolicy,
};

pub const FLASH_BASE: u32 = 0x1000_0000;

/// Four words at the top of the main SRAM banks that survive a warm reset.
pub const ENTRY_MAGIC_ADDR: u32 = 0x2003_BFF0;
pub const ENTRY_MAGIC: u32 = 0x5048_434D;

pub const BOOT_CONFIG: BootConfig = BootConfig {
    format_version: FormatVersion {
        major: 1,
        minor: 0,
        patch: 0,
    },
    // SYSINFO CHIP_ID; bits 31:28 are the silicon revision.
    device: DeviceIdentity {
        id_address: 0x4000_0000,
        revision_mask: 0xF000_0000,
    },
    layout: FlashLayout {
        flash_start: FLASH_BASE,
        flash_end: FLASH_BASE + 0x0020_0000,
        app_start: FLASH_BASE + 0x0001_0000,
        partition_size: 0x000C_0000,
        image_count: 2,
        staging_slot: 1,
        backup_slot: None,
    },
    write_chunk_size: crate::flash::PAGE_SIZE as u16,
    anti_rollback: true,
    restore_from_backup: false,
    sentinel_policy: SentinelPolicy::Strict,
    advisory: Advisory {
        command_timeout: 100,
        inter_message_delay: 1_500_000,
    },
};
