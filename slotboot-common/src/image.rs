// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Image slot footers and anti-rollback decisions.
//!
//! Every slot ends with a 20-byte footer, little-endian:
//!
//! ```text
//! [0:2]   applicationId      low byte: download (target) slot, high byte: execution id
//! [2:4]   reserved
//! [4:8]   applicationVersion
//! [8:12]  verificationEnd    inclusive
//! [12:16] verificationStart
//! [16:20] referenceHash      CRC-32 of [verificationStart, verificationEnd]
//! ```
//!
//! The hash occupies the last word of the slot, so a window ending at
//! `slot_end - 5` covers the whole image including the rest of the footer.
//! Addresses in the footer are those of the execution slot.

use crate::config::FlashLayout;
use crate::error::BlError;
use crate::flash::FlashDevice;

/// Image metadata stored at the top of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Footer {
    pub application_id: u16,
    pub version: u32,
    pub verification_start: u32,
    pub verification_end: u32,
    pub reference_hash: u32,
}

impl Footer {
    pub const SIZE: usize = 20;
    /// Offset of `referenceHash` within the footer.
    pub const HASH_OFFSET: usize = 16;

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let word = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Self {
            application_id: u16::from_le_bytes([bytes[0], bytes[1]]),
            version: word(4),
            verification_end: word(8),
            verification_start: word(12),
            reference_hash: word(16),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0xFFu8; Self::SIZE];
        bytes[0..2].copy_from_slice(&self.application_id.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.verification_end.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.verification_start.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.reference_hash.to_le_bytes());
        bytes
    }

    /// Slot the image is meant to be installed into.
    pub fn download_slot(&self) -> u8 {
        (self.application_id & 0x00FF) as u8
    }

    pub fn execution_id(&self) -> u8 {
        (self.application_id >> 8) as u8
    }

    pub fn has_valid_version(&self) -> bool {
        version_is_valid(self.version)
    }
}

/// `0` and `0xFFFF_FFFF` mean "never written" and "erased".
pub fn version_is_valid(version: u32) -> bool {
    version != 0 && version != u32::MAX
}

/// Read the footer of `slot`.
pub fn read_footer<F: FlashDevice>(
    flash: &mut F,
    layout: &FlashLayout,
    slot: u8,
) -> Result<Footer, BlError> {
    let addr = layout
        .footer_address(slot)
        .ok_or(BlError::InvalidArguments)?;
    let mut bytes = [0u8; Footer::SIZE];
    flash.read(addr, &mut bytes)?;
    Ok(Footer::from_bytes(&bytes))
}

/// Promotion rule on raw versions: a valid candidate replaces an invalid
/// target, or a valid target with a lower version.
pub fn needs_promotion(candidate_version: u32, target_version: u32) -> bool {
    match (version_is_valid(candidate_version), version_is_valid(target_version)) {
        (true, true) => candidate_version > target_version,
        (true, false) => true,
        _ => false,
    }
}

/// Does the image in `candidate` need to be copied into its target slot?
///
/// Reads the candidate's target from its footer. A candidate that already
/// sits in its target slot never needs promotion. Unreadable footers
/// answer `false`.
pub fn rollback_check<F: FlashDevice>(flash: &mut F, layout: &FlashLayout, candidate: u8) -> bool {
    let Ok(staged) = read_footer(flash, layout, candidate) else {
        return false;
    };
    let target = staged.download_slot();
    if target == candidate {
        return false;
    }
    let Ok(installed) = read_footer(flash, layout, target) else {
        return false;
    };

    let promote = needs_promotion(staged.version, installed.version);
    debug!(
        "rollback check: slot {} v{} -> slot {} v{}: {}",
        candidate,
        staged.version,
        target,
        installed.version,
        promote
    );
    promote
}
