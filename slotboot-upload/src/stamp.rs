// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Turn a raw application binary into a slot image with a footer.

use anyhow::{bail, Result};

use slotboot_common::config::FlashLayout;
use slotboot_common::image::{version_is_valid, Footer};
use slotboot_common::verify::CRC32;

/// Pad `firmware` to a full partition and append a footer whose CRC window
/// runs from the application start to the byte before the hash.
///
/// `target` is the slot the client should promote the image into and
/// `execution_id` the free-form high byte of the application id.
pub fn stamp_image(
    firmware: &[u8],
    layout: &FlashLayout,
    version: u32,
    target: u8,
    execution_id: u8,
) -> Result<Vec<u8>> {
    let partition = layout.partition_size as usize;
    let Some(capacity) = partition.checked_sub(Footer::SIZE) else {
        bail!("Partition of {} bytes cannot hold a footer", partition);
    };
    if firmware.len() > capacity {
        bail!(
            "Firmware is {} bytes, slot holds at most {}",
            firmware.len(),
            capacity
        );
    }
    if !version_is_valid(version) {
        bail!("Version {:#x} is reserved (0 and 0xFFFFFFFF mean no image)", version);
    }
    if target >= layout.image_count {
        bail!("Target slot {} outside the {} configured slots", target, layout.image_count);
    }

    let mut image = vec![0xFF; partition];
    image[..firmware.len()].copy_from_slice(firmware);

    let mut footer = Footer {
        application_id: u16::from_le_bytes([target, execution_id]),
        version,
        verification_start: layout.app_start,
        verification_end: layout.app_start + layout.partition_size - 5,
        reference_hash: 0,
    };
    image[capacity..].copy_from_slice(&footer.to_bytes());

    let hash_at = capacity + Footer::HASH_OFFSET;
    footer.reference_hash = CRC32.checksum(&image[..hash_at]);
    image[hash_at..].copy_from_slice(&footer.reference_hash.to_le_bytes());

    Ok(image)
}

/// Footer of a stamped image, checked against `layout`.
pub fn read_stamped(image: &[u8], layout: &FlashLayout) -> Result<Footer> {
    if image.len() != layout.partition_size as usize {
        bail!(
            "Image is {} bytes but the partition is {}; stamp it first",
            image.len(),
            layout.partition_size
        );
    }
    let mut bytes = [0u8; Footer::SIZE];
    bytes.copy_from_slice(&image[image.len() - Footer::SIZE..]);
    let footer = Footer::from_bytes(&bytes);

    let hashed = (footer.verification_end as u64 + 1)
        .checked_sub(footer.verification_start as u64)
        .unwrap_or(0) as usize;
    if footer.verification_start != layout.app_start || hashed == 0 || hashed > image.len() {
        bail!("Footer window does not match the layout");
    }
    if CRC32.checksum(&image[..hashed]) != footer.reference_hash {
        bail!("Footer CRC does not match the image");
    }
    Ok(footer)
}
