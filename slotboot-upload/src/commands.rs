// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for bootloader operations.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use slotboot_common::flash::ERASED_BYTE;
use slotboot_common::protocol::{ImageState, UnlockMetadata, WriteCommand, MAX_BLOCK_SIZE};

use crate::config::TargetConfig;
use crate::session::Session;
use crate::stamp::{read_stamped, stamp_image};
use crate::transport::FrameChannel;

/// Query and print the client's capabilities.
pub fn info<C: FrameChannel>(session: &mut Session<C>) -> Result<()> {
    let info = session.client_info()?;
    let [major, minor, patch] = info.protocol_version;

    println!("Update client:");
    println!("  Protocol:        {}.{}.{}", major, minor, patch);
    println!("  Max payload:     {} bytes", info.max_payload_size);
    println!("  Buffers:         {}", info.buffer_count);
    println!(
        "  Command timeout: {} ms",
        u32::from(info.command_timeout) * 100
    );
    println!("  Message delay:   {} ns", info.inter_message_delay);
    Ok(())
}

/// Query and print the state of the staged image.
pub fn state<C: FrameChannel>(session: &mut Session<C>) -> Result<ImageState> {
    let state = session.image_state()?;
    println!("Staged image: {:?}", state);
    Ok(state)
}

/// Transfer a stamped image into the staging slot and end the session.
pub fn update<C: FrameChannel>(
    session: &mut Session<C>,
    image: &[u8],
    target: &TargetConfig,
) -> Result<()> {
    let config = &target.boot;
    let Some(device_id) = target.device_id else {
        bail!("No device id configured (use --device-id or the config file)");
    };

    let footer = read_stamped(image, &config.layout)?;
    println!(
        "Image:    version {} for slot {} ({} bytes)",
        footer.version,
        footer.download_slot(),
        image.len()
    );

    let info = session.client_info()?;
    let chunk = usize::from(config.write_chunk_size);
    if usize::from(info.max_payload_size) != chunk {
        bail!(
            "Client accepts {}-byte chunks, configuration says {}",
            info.max_payload_size,
            chunk
        );
    }

    session.start_transfer()?;

    // Unlock erases the whole staging slot, so erased pages need not be sent.
    let unlock = UnlockMetadata {
        format_major: config.format_version.major,
        format_minor: config.format_version.minor,
        format_patch: config.format_version.patch,
        device_id,
        max_payload_size: config.write_chunk_size,
        target_start_address: config.layout.app_start,
    };
    info!("unlocking staging slot");
    session.unlock(&unlock.to_block())?;

    let pb = ProgressBar::new(image.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let mut block: heapless::Vec<u8, MAX_BLOCK_SIZE> = heapless::Vec::new();
    let mut skipped = 0usize;
    for (index, payload) in image.chunks(chunk).enumerate() {
        let offset = index * chunk;
        pb.set_position(offset as u64);
        if payload.iter().all(|&b| b == ERASED_BYTE) {
            skipped += 1;
            continue;
        }

        let write = WriteCommand {
            start_address: config.layout.app_start + offset as u32,
            payload,
        };
        write
            .encode(&mut block)
            .map_err(|e| anyhow::anyhow!("Chunk of {} bytes does not fit a block: {}", chunk, e))?;
        if let Err(err) = session.write_chunk(&block) {
            pb.abandon();
            return Err(err).with_context(|| format!("Write failed at offset {:#x}", offset));
        }
    }
    pb.finish_with_message("Upload complete");
    debug!("{} erased chunks skipped, {} resends", skipped, session.resends());

    match session.image_state()? {
        ImageState::Valid => println!("Staged image verified."),
        ImageState::Invalid => bail!("Client reports the staged image invalid"),
    }

    session.end_transfer()?;
    println!("Transfer complete; the device resets and promotes the image.");
    Ok(())
}

/// Stamp `input` with a footer and write the slot image to `output`.
pub fn stamp(
    input: &Path,
    output: &Path,
    target: &TargetConfig,
    version: u32,
    slot: u8,
    execution_id: u8,
) -> Result<()> {
    let firmware =
        fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let image = stamp_image(&firmware, &target.boot.layout, version, slot, execution_id)?;
    let footer = read_stamped(&image, &target.boot.layout)?;

    fs::write(output, &image).with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Stamped {} ({} bytes) -> {} ({} bytes, CRC32: 0x{:08x})",
        input.display(),
        firmware.len(),
        output.display(),
        image.len(),
        footer.reference_hash
    );
    Ok(())
}
