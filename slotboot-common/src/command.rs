// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command block processing: the Unlock latch and WriteFlash.
//!
//! No destructive flash operation happens before an Unlock block has been
//! validated against this build's configuration. Validation erases the
//! staging slot and opens the latch; WriteFlash blocks are then programmed
//! into the staging slot, one page each.

use crate::config::BootConfig;
use crate::error::BlError;
use crate::flash::{erase_range, program_page, read_u32, FlashDevice, ERASED_BYTE, MAX_PAGE_SIZE};
use crate::protocol::{CommandBlock, UnlockMetadata, WriteCommand};

/// Session state of the command processor.
#[derive(Debug, Default)]
pub struct CommandProcessor {
    unlocked: bool,
}

impl CommandProcessor {
    pub const fn new() -> Self {
        Self { unlocked: false }
    }

    /// Begin a new session with the latch closed.
    pub fn initialize(&mut self) {
        self.unlocked = false;
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Process one command block received in a WriteChunk.
    pub fn process_block<F: FlashDevice>(
        &mut self,
        flash: &mut F,
        config: &BootConfig,
        block: &[u8],
    ) -> Result<(), BlError> {
        match CommandBlock::parse(block).map_err(|_| BlError::BlockTooShort)? {
            CommandBlock::Unlock(metadata) => self.unlock(flash, config, &metadata),
            CommandBlock::WriteFlash(command) => self.write_flash(flash, config, &command),
            CommandBlock::Unknown(block_type) => {
                warn!("unknown block type {:#x}", block_type);
                Err(BlError::UnknownCommand)
            }
        }
    }

    fn unlock<F: FlashDevice>(
        &mut self,
        flash: &mut F,
        config: &BootConfig,
        metadata: &UnlockMetadata,
    ) -> Result<(), BlError> {
        self.unlocked = false;
        validate_unlock(flash, config, metadata)?;

        let layout = &config.layout;
        let (Some(start), Some(end)) = (
            layout.slot_start(layout.staging_slot),
            layout.slot_end(layout.staging_slot),
        ) else {
            return Err(BlError::InvalidArguments);
        };

        erase_range(flash, start, end).map_err(|err| {
            error!("staging erase failed: {:?}", err);
            BlError::EraseFailed
        })?;

        info!("unlocked, staging {:#x}..{:#x} erased", start, end);
        self.unlocked = true;
        Ok(())
    }

    fn write_flash<F: FlashDevice>(
        &mut self,
        flash: &mut F,
        config: &BootConfig,
        command: &WriteCommand<'_>,
    ) -> Result<(), BlError> {
        if !self.unlocked {
            return Err(BlError::UnknownCommand);
        }

        let page_size = F::PAGE_SIZE;
        if command.payload.len() > config.write_chunk_size as usize
            || command.payload.len() > page_size
        {
            return Err(BlError::PayloadTooLarge);
        }

        let layout = &config.layout;
        let (Some(staging_start), Some(staging_end)) = (
            layout.slot_start(layout.staging_slot),
            layout.slot_end(layout.staging_slot),
        ) else {
            return Err(BlError::InvalidArguments);
        };

        let dest = command
            .start_address
            .checked_add(layout.staging_offset())
            .ok_or(BlError::AddressOutOfRange)?;
        if dest < staging_start
            || dest % page_size as u32 != 0
            || dest as u64 + page_size as u64 > staging_end as u64
        {
            return Err(BlError::AddressOutOfRange);
        }

        let mut buffer = [ERASED_BYTE; MAX_PAGE_SIZE];
        let Some(page) = buffer.get_mut(..page_size) else {
            return Err(BlError::InvalidArguments);
        };
        page[..command.payload.len()].copy_from_slice(command.payload);

        program_page(flash, dest, page).map_err(|err| {
            error!("page write at {:#x} failed: {:?}", dest, err);
            BlError::CommandProcessing
        })
    }
}

/// Check Unlock metadata against this build. Stops at the first mismatch.
pub fn validate_unlock<F: FlashDevice>(
    flash: &mut F,
    config: &BootConfig,
    metadata: &UnlockMetadata,
) -> Result<(), BlError> {
    let version = &config.format_version;

    // Major versions are never compatible in either direction.
    if metadata.format_major != version.major {
        warn!(
            "unlock: format major {} != {}",
            metadata.format_major,
            version.major
        );
        return Err(BlError::VerificationFailed);
    }

    // An older minor is fine; a newer one may carry unknown blocks.
    if metadata.format_minor > version.minor {
        warn!(
            "unlock: format minor {} > {}",
            metadata.format_minor,
            version.minor
        );
        return Err(BlError::VerificationFailed);
    }

    let hardware_id = read_u32(flash, config.device.id_address)? & !config.device.revision_mask;
    if hardware_id != metadata.device_id {
        warn!(
            "unlock: device id {:#x} != {:#x}",
            metadata.device_id,
            hardware_id
        );
        return Err(BlError::VerificationFailed);
    }

    if metadata.max_payload_size != config.write_chunk_size {
        warn!(
            "unlock: payload size {} != {}",
            metadata.max_payload_size,
            config.write_chunk_size
        );
        return Err(BlError::VerificationFailed);
    }

    if metadata.target_start_address != config.layout.app_start {
        warn!(
            "unlock: start address {:#x} != {:#x}",
            metadata.target_start_address,
            config.layout.app_start
        );
        return Err(BlError::VerificationFailed);
    }

    Ok(())
}
