// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CRC-32 verification of image slots.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::config::{BootConfig, SentinelPolicy};
use crate::error::BlError;
use crate::flash::FlashDevice;
use crate::image::{read_footer, rollback_check};

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const CHUNK_SIZE: usize = 256;

/// Compute CRC-32 (ISO HDLC) over `len` bytes of flash starting at `addr`.
pub fn compute_crc32<F: FlashDevice>(flash: &mut F, addr: u32, len: u32) -> Result<u32, BlError> {
    let mut digest = CRC32.digest();
    let mut remaining = len as usize;
    let mut addr = addr;
    let mut chunk = [0u8; CHUNK_SIZE];

    while remaining > 0 {
        let n = remaining.min(chunk.len());
        flash.read(addr, &mut chunk[..n])?;
        digest.update(&chunk[..n]);
        addr = addr.wrapping_add(n as u32);
        remaining -= n;
    }

    Ok(digest.finalize())
}

fn is_sentinel(value: u32) -> bool {
    value == 0 || value == u32::MAX
}

/// Verify the image held in `slot` against its footer.
///
/// The footer window is relocated into `slot` when it is not the execution
/// slot. Degenerate windows, windows outside the slot and (under the strict
/// policy) sentinel CRC values are argument errors; a CRC mismatch is a
/// verification failure.
pub fn verify_slot<F: FlashDevice>(flash: &mut F, config: &BootConfig, slot: u8) -> Result<(), BlError> {
    let layout = &config.layout;
    let (Some(slot_start), Some(slot_end)) = (layout.slot_start(slot), layout.slot_end(slot)) else {
        return Err(BlError::InvalidArguments);
    };

    let footer = read_footer(flash, layout, slot)?;
    let (start, end) = (footer.verification_start, footer.verification_end);
    if start == 0 || end == 0 || end < start {
        return Err(BlError::InvalidArguments);
    }
    // end >= start > 0, so this cannot overflow.
    let length = end - start + 1;

    let offset = slot_start - layout.app_start;
    let start = start
        .checked_add(offset)
        .ok_or(BlError::InvalidArguments)?;
    if start < slot_start || start as u64 + length as u64 > slot_end as u64 {
        return Err(BlError::InvalidArguments);
    }

    let computed = compute_crc32(flash, start, length)?;
    let reference = footer.reference_hash;

    if config.sentinel_policy == SentinelPolicy::Strict
        && (is_sentinel(reference) || is_sentinel(computed))
    {
        return Err(BlError::InvalidArguments);
    }

    if computed != reference {
        debug!(
            "slot {}: crc {:#x} != reference {:#x}",
            slot,
            computed,
            reference
        );
        return Err(BlError::VerificationFailed);
    }
    Ok(())
}

/// Verify the staging slot, and with anti-rollback enabled also require the
/// staged image to be newer than the image in its target slot.
///
/// An image targeting the staging slot itself has nothing to be newer than
/// and fails the rollback check, so single-slot layouts need anti-rollback
/// off.
pub fn verify_staged_image<F: FlashDevice>(flash: &mut F, config: &BootConfig) -> Result<(), BlError> {
    let staging = config.layout.staging_slot;
    verify_slot(flash, config, staging)?;

    if config.anti_rollback && !rollback_check(flash, &config.layout, staging) {
        return Err(BlError::RollbackFailure);
    }
    Ok(())
}
