// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Start-up decision: promote a staged image, check the execution slot,
//! restore from backup, then either run the application or stay in the
//! bootloader.
//!
//! Everything here works through [`FlashDevice`], so the whole decision can
//! be exercised on the host. Jumping into the image is left to the binary.

use crate::config::BootConfig;
use crate::copy::copy_image_slots;
use crate::error::BlError;
use crate::flash::FlashDevice;
use crate::image::{read_footer, rollback_check};
use crate::verify::verify_slot;

/// Slot the application executes from.
pub const EXECUTION_SLOT: u8 = 0;

/// Outcome of looking at the staging slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadResult {
    /// The staging slot holds no verifiable image.
    NothingStaged,
    /// The staged image is already in place or is not newer.
    NotRequired,
    /// The staged image was copied into `target` and verified there.
    Promoted { target: u8 },
    /// Promotion was attempted and failed.
    Failed(BlError),
}

/// Why the device stays in the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HoldReason {
    /// The configuration does not fit the flash device.
    InvalidConfiguration,
    /// The execution slot failed verification.
    ExecutionImageInvalid,
    /// The execution image verified but carries no valid version.
    ExecutionVersionInvalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDecision {
    RunApplication { entry: u32 },
    StayInBootloader(HoldReason),
}

/// Full record of a start-up decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootOutcome {
    pub decision: BootDecision,
    pub load: LoadResult,
    /// The execution slot was restored from the backup slot.
    pub restored: bool,
}

/// Promote the staged image into its target slot when needed.
///
/// With anti-rollback, a verifiable target is only replaced by a newer
/// image; an unverifiable target is replaced by any staged image with a
/// valid version. Without anti-rollback a verified staged image aimed at
/// another slot is always copied.
pub fn load_new_image<F: FlashDevice>(flash: &mut F, config: &BootConfig) -> LoadResult {
    let layout = &config.layout;
    let staging = layout.staging_slot;

    if let Err(err) = verify_slot(flash, config, staging) {
        debug!("staging slot {}: {:?}", staging, err);
        return LoadResult::NothingStaged;
    }

    let staged = match read_footer(flash, layout, staging) {
        Ok(footer) => footer,
        Err(err) => return LoadResult::Failed(err),
    };
    let target = staged.download_slot();
    if target == staging {
        return LoadResult::NotRequired;
    }
    if target >= layout.image_count {
        warn!("staged image targets unknown slot {}", target);
        return LoadResult::Failed(BlError::InvalidArguments);
    }

    let promote = if !config.anti_rollback {
        true
    } else if verify_slot(flash, config, target).is_ok() {
        rollback_check(flash, layout, staging)
    } else {
        // The target's version cannot be trusted.
        staged.has_valid_version()
    };
    if !promote {
        debug!("staged image not newer than slot {}", target);
        return LoadResult::NotRequired;
    }

    if let Err(err) = copy_image_slots(flash, config, staging, target) {
        return LoadResult::Failed(err);
    }
    match verify_slot(flash, config, target) {
        Ok(()) => {
            info!("staged image v{} promoted to slot {}", staged.version, target);
            LoadResult::Promoted { target }
        }
        Err(err) => LoadResult::Failed(err),
    }
}

/// Copy the backup image over the execution slot.
pub fn load_backup_image<F: FlashDevice>(flash: &mut F, config: &BootConfig) -> Result<(), BlError> {
    let backup = config
        .layout
        .backup_slot
        .ok_or(BlError::InvalidArguments)?;

    verify_slot(flash, config, backup)?;
    // The backup is trusted as-is; no version comparison.
    copy_image_slots(flash, config, backup, EXECUTION_SLOT)?;
    verify_slot(flash, config, EXECUTION_SLOT)
}

/// Is the execution slot fit to run?
pub fn check_execution<F: FlashDevice>(flash: &mut F, config: &BootConfig) -> Result<(), HoldReason> {
    verify_slot(flash, config, EXECUTION_SLOT).map_err(|_| HoldReason::ExecutionImageInvalid)?;

    if config.anti_rollback {
        let footer = read_footer(flash, &config.layout, EXECUTION_SLOT)
            .map_err(|_| HoldReason::ExecutionImageInvalid)?;
        if !footer.has_valid_version() {
            return Err(HoldReason::ExecutionVersionInvalid);
        }
    }
    Ok(())
}

/// Decide what to boot.
pub fn select_boot<F: FlashDevice>(flash: &mut F, config: &BootConfig) -> BootOutcome {
    if let Err(err) = config.validate_for_device(F::PAGE_SIZE, F::ROW_SIZE) {
        error!("boot configuration rejected: {:?}", err);
        return BootOutcome {
            decision: BootDecision::StayInBootloader(HoldReason::InvalidConfiguration),
            load: LoadResult::NothingStaged,
            restored: false,
        };
    }

    let load = load_new_image(flash, config);
    let mut restored = false;
    let mut status = check_execution(flash, config);

    // An image without a version is never replaced by the backup.
    if status == Err(HoldReason::ExecutionImageInvalid)
        && config.restore_from_backup
        && config.layout.backup_slot.is_some()
    {
        match load_backup_image(flash, config) {
            Ok(()) => {
                info!("execution slot restored from backup");
                restored = true;
                status = check_execution(flash, config);
            }
            Err(err) => warn!("backup restore failed: {:?}", err),
        }
    }

    let decision = match (status, config.layout.slot_start(EXECUTION_SLOT)) {
        (Ok(()), Some(entry)) => BootDecision::RunApplication { entry },
        (Ok(()), None) => BootDecision::StayInBootloader(HoldReason::InvalidConfiguration),
        (Err(reason), _) => BootDecision::StayInBootloader(reason),
    };

    BootOutcome {
        decision,
        load,
        restored,
    }
}
