// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Tests for the unlock latch and WriteFlash handling.

mod common;

use common::{unlock_metadata, write_block, FlashOp, SimFlash, DEVICE_ID, PAGE_SIZE, ROW_SIZE};
use slotboot_common::command::CommandProcessor;
use slotboot_common::config::BootConfig;
use slotboot_common::error::BlError;

const STAGING_START: u32 = 0x11000;
const STAGING_END: u32 = 0x20000;

fn dirty_staging(flash: &mut SimFlash) {
    flash.load(STAGING_START, &[0x00; 512]);
    flash.load(STAGING_END - 16, &[0x00; 16]);
}

fn unlocked() -> (CommandProcessor, SimFlash, BootConfig) {
    let config = BootConfig::DEFAULT;
    let mut flash = SimFlash::for_config(&config);
    let mut processor = CommandProcessor::new();
    processor
        .process_block(&mut flash, &config, &unlock_metadata(&config).to_block())
        .unwrap();
    flash.clear_ops();
    (processor, flash, config)
}

// =============================================================================
// Unlock
// =============================================================================

#[test]
fn test_unlock_erases_staging_and_opens_latch() {
    let config = BootConfig::DEFAULT;
    let mut flash = SimFlash::for_config(&config);
    dirty_staging(&mut flash);
    let mut processor = CommandProcessor::new();

    let block = unlock_metadata(&config).to_block();
    assert_eq!(processor.process_block(&mut flash, &config, &block), Ok(()));
    assert!(processor.is_unlocked());

    let rows = ((STAGING_END - STAGING_START) as usize) / ROW_SIZE;
    assert_eq!(flash.erases(), rows);
    assert!(flash
        .slice(STAGING_START, (STAGING_END - STAGING_START) as usize)
        .iter()
        .all(|&b| b == 0xFF));
    assert!(flash.all_locked());
}

#[test]
fn test_unlock_leaves_execution_slot_alone() {
    let config = BootConfig::DEFAULT;
    let mut flash = SimFlash::for_config(&config);
    flash.load(0x2000, &[0x12; 64]);
    let mut processor = CommandProcessor::new();

    processor
        .process_block(&mut flash, &config, &unlock_metadata(&config).to_block())
        .unwrap();
    assert_eq!(flash.slice(0x2000, 64), &[0x12; 64]);
    assert!(flash
        .ops
        .iter()
        .all(|op| !matches!(op, FlashOp::Erase(addr) if *addr < STAGING_START)));
}

#[test]
fn test_unlock_uses_unlock_erase_lock_sequence() {
    let config = BootConfig::DEFAULT;
    let mut flash = SimFlash::for_config(&config);
    let mut processor = CommandProcessor::new();

    processor
        .process_block(&mut flash, &config, &unlock_metadata(&config).to_block())
        .unwrap();
    assert_eq!(
        &flash.ops[..3],
        &[
            FlashOp::Unlock(STAGING_START),
            FlashOp::Erase(STAGING_START),
            FlashOp::Lock(STAGING_START),
        ]
    );
}

fn rejected(edit: impl FnOnce(&mut slotboot_common::protocol::UnlockMetadata)) {
    let config = BootConfig::DEFAULT;
    let mut flash = SimFlash::for_config(&config);
    dirty_staging(&mut flash);
    let mut processor = CommandProcessor::new();

    let mut metadata = unlock_metadata(&config);
    edit(&mut metadata);
    assert_eq!(
        processor.process_block(&mut flash, &config, &metadata.to_block()),
        Err(BlError::VerificationFailed)
    );
    assert!(!processor.is_unlocked());
    assert_eq!(flash.erases(), 0);
    assert_eq!(flash.slice(STAGING_START, 4), &[0x00; 4]);
}

#[test]
fn test_unlock_rejects_higher_major() {
    rejected(|m| m.format_major += 1);
}

#[test]
fn test_unlock_rejects_lower_major() {
    rejected(|m| m.format_major = 0);
}

#[test]
fn test_unlock_rejects_newer_minor() {
    rejected(|m| m.format_minor += 1);
}

#[test]
fn test_unlock_accepts_older_minor() {
    let mut config = BootConfig::DEFAULT;
    config.format_version.minor = 3;
    let mut flash = SimFlash::for_config(&config);
    let mut processor = CommandProcessor::new();

    let mut metadata = unlock_metadata(&config);
    metadata.format_minor = 1;
    metadata.format_patch = 9;
    assert_eq!(
        processor.process_block(&mut flash, &config, &metadata.to_block()),
        Ok(())
    );
}

#[test]
fn test_unlock_rejects_wrong_device() {
    rejected(|m| m.device_id = DEVICE_ID ^ 1);
}

#[test]
fn test_unlock_ignores_revision_bits() {
    let config = BootConfig::DEFAULT;
    let mut flash = SimFlash::for_config(&config);
    flash.device_id.1 = DEVICE_ID | 0x0000_0A00;
    let mut processor = CommandProcessor::new();

    let block = unlock_metadata(&config).to_block();
    assert_eq!(processor.process_block(&mut flash, &config, &block), Ok(()));
}

#[test]
fn test_unlock_rejects_payload_size_mismatch() {
    rejected(|m| m.max_payload_size = 128);
}

#[test]
fn test_unlock_rejects_start_address_mismatch() {
    rejected(|m| m.target_start_address = 0x3000);
}

#[test]
fn test_failed_unlock_closes_open_latch() {
    let (mut processor, mut flash, config) = unlocked();

    let mut metadata = unlock_metadata(&config);
    metadata.format_major = 9;
    assert!(processor
        .process_block(&mut flash, &config, &metadata.to_block())
        .is_err());
    assert!(!processor.is_unlocked());

    let block = write_block(0x2000, &[0x11; PAGE_SIZE]);
    assert_eq!(
        processor.process_block(&mut flash, &config, &block),
        Err(BlError::UnknownCommand)
    );
}

#[test]
fn test_unlock_erase_failure() {
    let config = BootConfig::DEFAULT;
    let mut flash = SimFlash::for_config(&config);
    flash.fail_erase_at = Some(STAGING_START + 4 * ROW_SIZE as u32);
    let mut processor = CommandProcessor::new();

    assert_eq!(
        processor.process_block(&mut flash, &config, &unlock_metadata(&config).to_block()),
        Err(BlError::EraseFailed)
    );
    assert!(!processor.is_unlocked());
}

#[test]
fn test_initialize_closes_latch() {
    let (mut processor, _, _) = unlocked();
    assert!(processor.is_unlocked());
    processor.initialize();
    assert!(!processor.is_unlocked());
}

// =============================================================================
// WriteFlash
// =============================================================================

#[test]
fn test_write_rejected_while_locked() {
    let config = BootConfig::DEFAULT;
    let mut flash = SimFlash::for_config(&config);
    let mut processor = CommandProcessor::new();

    let block = write_block(0x2000, &[0x11; PAGE_SIZE]);
    assert_eq!(
        processor.process_block(&mut flash, &config, &block),
        Err(BlError::UnknownCommand)
    );
    assert_eq!(flash.writes(), 0);
}

#[test]
fn test_write_lands_in_staging() {
    let (mut processor, mut flash, config) = unlocked();

    let payload: Vec<u8> = (0..PAGE_SIZE as u8).collect();
    let block = write_block(0x2040, &payload);
    assert_eq!(processor.process_block(&mut flash, &config, &block), Ok(()));

    assert_eq!(flash.slice(STAGING_START + 0x40, PAGE_SIZE), &payload[..]);
    assert_eq!(
        flash.ops,
        vec![
            FlashOp::Unlock(STAGING_START + 0x40),
            FlashOp::Write(STAGING_START + 0x40),
            FlashOp::Lock(STAGING_START + 0x40),
        ]
    );
}

#[test]
fn test_short_write_is_padded_with_erased_bytes() {
    let (mut processor, mut flash, config) = unlocked();

    let block = write_block(0x2000, &[0xA5; 10]);
    processor.process_block(&mut flash, &config, &block).unwrap();

    let page = flash.slice(STAGING_START, PAGE_SIZE);
    assert_eq!(&page[..10], &[0xA5; 10]);
    assert!(page[10..].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_write_below_staging_is_out_of_range() {
    let (mut processor, mut flash, config) = unlocked();

    // 0x1000 + 0xF000 = 0x10000, inside the execution slot.
    let block = write_block(0x1000, &[0x11; PAGE_SIZE]);
    assert_eq!(
        processor.process_block(&mut flash, &config, &block),
        Err(BlError::AddressOutOfRange)
    );
    assert_eq!(flash.writes(), 0);
}

#[test]
fn test_write_past_staging_is_out_of_range() {
    let (mut processor, mut flash, config) = unlocked();

    let block = write_block(0x11000, &[0x11; PAGE_SIZE]);
    assert_eq!(
        processor.process_block(&mut flash, &config, &block),
        Err(BlError::AddressOutOfRange)
    );
}

#[test]
fn test_write_address_overflow_is_out_of_range() {
    let (mut processor, mut flash, config) = unlocked();

    let block = write_block(0xFFFF_FFC0, &[0x11; PAGE_SIZE]);
    assert_eq!(
        processor.process_block(&mut flash, &config, &block),
        Err(BlError::AddressOutOfRange)
    );
}

#[test]
fn test_unaligned_write_is_out_of_range() {
    let (mut processor, mut flash, config) = unlocked();

    let block = write_block(0x2010, &[0x11; 8]);
    assert_eq!(
        processor.process_block(&mut flash, &config, &block),
        Err(BlError::AddressOutOfRange)
    );
}

#[test]
fn test_oversized_payload() {
    let (mut processor, mut flash, config) = unlocked();

    let block = write_block(0x2000, &[0x11; PAGE_SIZE + 1]);
    assert_eq!(
        processor.process_block(&mut flash, &config, &block),
        Err(BlError::PayloadTooLarge)
    );
}

#[test]
fn test_write_failure_is_command_processing() {
    let (mut processor, mut flash, config) = unlocked();
    flash.fail_write_at = Some(STAGING_START);

    let block = write_block(0x2000, &[0x11; PAGE_SIZE]);
    assert_eq!(
        processor.process_block(&mut flash, &config, &block),
        Err(BlError::CommandProcessing)
    );
    assert!(flash.all_locked());
}

// =============================================================================
// Malformed blocks
// =============================================================================

#[test]
fn test_short_block() {
    let (mut processor, mut flash, config) = unlocked();
    assert_eq!(
        processor.process_block(&mut flash, &config, &[0x04, 0x00]),
        Err(BlError::BlockTooShort)
    );
}

#[test]
fn test_unknown_block_type() {
    let (mut processor, mut flash, config) = unlocked();
    assert_eq!(
        processor.process_block(&mut flash, &config, &[0x00, 0x00, 0x33]),
        Err(BlError::UnknownCommand)
    );
    // The latch is only reset by StartTransfer or a new Unlock.
    assert!(processor.is_unlocked());
}
