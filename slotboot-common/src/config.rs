// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Build-time configuration of an update client.
//!
//! Devices embed a `const` [`BootConfig`]; the host tool loads the same
//! structure from TOML so both sides agree on layout and versions.

use serde::{Deserialize, Serialize};

use crate::image::Footer;
use crate::protocol::MAX_WRITE_CHUNK;

/// Version of the command-block format this build understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FormatVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Where the hardware device identifier lives and which bits are revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceIdentity {
    pub id_address: u32,
    pub revision_mask: u32,
}

/// Image slot arrangement.
///
/// Slot `n` starts at `app_start + n * partition_size`; slot 0 is the
/// execution slot. Every slot ends with its [`Footer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct FlashLayout {
    pub flash_start: u32,
    /// One past the last flash byte.
    pub flash_end: u32,
    pub app_start: u32,
    pub partition_size: u32,
    pub image_count: u8,
    pub staging_slot: u8,
    pub backup_slot: Option<u8>,
}

impl Default for FlashLayout {
    fn default() -> Self {
        BootConfig::DEFAULT.layout
    }
}

impl FlashLayout {
    pub fn slot_start(&self, slot: u8) -> Option<u32> {
        if slot >= self.image_count {
            return None;
        }
        self.partition_size
            .checked_mul(slot as u32)?
            .checked_add(self.app_start)
    }

    /// One past the last byte of `slot`.
    pub fn slot_end(&self, slot: u8) -> Option<u32> {
        self.slot_start(slot)?.checked_add(self.partition_size)
    }

    pub fn footer_address(&self, slot: u8) -> Option<u32> {
        self.slot_end(slot)?.checked_sub(Footer::SIZE as u32)
    }

    /// Distance from the execution slot to the staging slot.
    pub fn staging_offset(&self) -> u32 {
        self.partition_size.wrapping_mul(self.staging_slot as u32)
    }

    /// True if `[addr, addr + len)` lies inside flash.
    pub fn contains(&self, addr: u32, len: u32) -> bool {
        let end = addr as u64 + len as u64;
        addr >= self.flash_start && end <= self.flash_end as u64
    }
}

/// What to do with a reference or computed CRC of `0` or `0xFFFF_FFFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SentinelPolicy {
    /// Sentinel values mean "no image" and fail with invalid arguments.
    Strict,
    /// Only compare; a sentinel is a mismatch like any other.
    MismatchOnly,
}

/// Values reported to the host in the discovery response. Not enforced
/// locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct Advisory {
    /// Tenths of a second.
    pub command_timeout: u16,
    /// Nanoseconds.
    pub inter_message_delay: u32,
}

impl Default for Advisory {
    fn default() -> Self {
        BootConfig::DEFAULT.advisory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct BootConfig {
    pub format_version: FormatVersion,
    pub device: DeviceIdentity,
    pub layout: FlashLayout,
    /// Bytes written per WriteFlash block; equals the flash page size.
    pub write_chunk_size: u16,
    /// Refuse to promote or report valid a staged image that is not newer.
    pub anti_rollback: bool,
    /// Restore the execution slot from the backup slot when it is invalid.
    pub restore_from_backup: bool,
    pub sentinel_policy: SentinelPolicy,
    pub advisory: Advisory,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("at least one image slot is required")]
    NoImageSlots,
    #[error("staging slot outside the configured slots")]
    StagingSlotOutOfRange,
    #[error("backup slot outside the configured slots")]
    BackupSlotOutOfRange,
    #[error("image slots extend beyond flash")]
    LayoutOutOfFlash,
    #[error("partition too small to hold a footer")]
    PartitionTooSmall,
    #[error("write chunk larger than the supported maximum")]
    WriteChunkTooLarge,
    #[error("write chunk differs from the flash page size")]
    WriteChunkNotPage,
    #[error("slots are not aligned to flash rows")]
    Misaligned,
    #[error("flash geometry exceeds the supported page or row size")]
    UnsupportedGeometry,
}

impl BootConfig {
    /// Two 60 KiB slots above an 8 KiB bootloader in 128 KiB of flash.
    pub const DEFAULT: Self = Self {
        format_version: FormatVersion {
            major: 1,
            minor: 0,
            patch: 0,
        },
        device: DeviceIdentity {
            id_address: 0x4100_2018,
            revision_mask: 0x0000_0F00,
        },
        layout: FlashLayout {
            flash_start: 0,
            flash_end: 0x0002_0000,
            app_start: 0x0000_2000,
            partition_size: 0x0000_F000,
            image_count: 2,
            staging_slot: 1,
            backup_slot: None,
        },
        write_chunk_size: 64,
        anti_rollback: true,
        restore_from_backup: false,
        sentinel_policy: SentinelPolicy::Strict,
        advisory: Advisory {
            command_timeout: 100,
            inter_message_delay: 1_500_000,
        },
    };

    /// Check the layout independent of any flash device.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let layout = &self.layout;

        if layout.image_count == 0 {
            return Err(ConfigError::NoImageSlots);
        }
        if layout.staging_slot >= layout.image_count {
            return Err(ConfigError::StagingSlotOutOfRange);
        }
        if let Some(backup) = layout.backup_slot {
            if backup == 0 || backup >= layout.image_count {
                return Err(ConfigError::BackupSlotOutOfRange);
            }
        }
        if (layout.partition_size as usize) < Footer::SIZE {
            return Err(ConfigError::PartitionTooSmall);
        }

        let span = layout.partition_size as u64 * layout.image_count as u64;
        if layout.app_start < layout.flash_start
            || layout.app_start as u64 + span > layout.flash_end as u64
        {
            return Err(ConfigError::LayoutOutOfFlash);
        }

        if self.write_chunk_size as usize > MAX_WRITE_CHUNK {
            return Err(ConfigError::WriteChunkTooLarge);
        }
        Ok(())
    }

    /// Check the layout against a device's page and row sizes.
    pub fn validate_for_device(&self, page_size: usize, row_size: usize) -> Result<(), ConfigError> {
        self.validate()?;

        if page_size > crate::flash::MAX_PAGE_SIZE || row_size > crate::flash::MAX_ROW_SIZE {
            return Err(ConfigError::UnsupportedGeometry);
        }
        if self.write_chunk_size as usize != page_size {
            return Err(ConfigError::WriteChunkNotPage);
        }

        let row = row_size as u32;
        if row == 0 || self.layout.app_start % row != 0 || self.layout.partition_size % row != 0 {
            return Err(ConfigError::Misaligned);
        }
        Ok(())
    }
}
