// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Row-by-row flash copy, used to promote a staged image.

use crate::config::{BootConfig, FlashLayout};
use crate::error::BlError;
use crate::flash::{erase_row, program_page, wait_ready, FlashDevice, MAX_ROW_SIZE};

/// Copy `len` bytes from `src` to `dst`.
///
/// Both ranges must lie inside flash and must not overlap. `dst` and `len`
/// must be row aligned. Each row is read into RAM, the destination row is
/// erased and then programmed page by page. The first failing primitive
/// aborts the copy.
pub fn copy<F: FlashDevice>(
    flash: &mut F,
    layout: &FlashLayout,
    src: u32,
    dst: u32,
    len: u32,
) -> Result<(), BlError> {
    if len == 0 || !layout.contains(src, len) || !layout.contains(dst, len) {
        return Err(BlError::InvalidArguments);
    }

    let (src_end, dst_end) = (src as u64 + len as u64, dst as u64 + len as u64);
    if src == dst || ((src as u64) < dst_end && (dst as u64) < src_end) {
        return Err(BlError::InvalidArguments);
    }

    let row = F::ROW_SIZE;
    if row == 0 || row > MAX_ROW_SIZE || F::PAGE_SIZE == 0 {
        return Err(BlError::InvalidArguments);
    }
    if dst % row as u32 != 0 || len % row as u32 != 0 {
        return Err(BlError::InvalidArguments);
    }

    let mut buffer = [0u8; MAX_ROW_SIZE];
    let scratch = &mut buffer[..row];

    for offset in (0..len).step_by(row) {
        let (from, to) = (src + offset, dst + offset);

        flash.read(from, scratch)?;
        wait_ready(flash);
        erase_row(flash, to)?;

        for (index, page) in scratch.chunks(F::PAGE_SIZE).enumerate() {
            program_page(flash, to + (index * F::PAGE_SIZE) as u32, page)?;
        }
    }

    trace!("copied {} bytes {:#x} -> {:#x}", len, src, dst);
    Ok(())
}

/// Copy the whole of slot `src` over slot `dst`.
///
/// If a flash primitive fails part way, the destination footer row is
/// erased so the partial image can never verify.
pub fn copy_image_slots<F: FlashDevice>(
    flash: &mut F,
    config: &BootConfig,
    src: u8,
    dst: u8,
) -> Result<(), BlError> {
    let layout = &config.layout;
    let (Some(from), Some(to)) = (layout.slot_start(src), layout.slot_start(dst)) else {
        return Err(BlError::InvalidArguments);
    };

    info!("copying slot {} into slot {}", src, dst);
    let result = copy(flash, layout, from, to, layout.partition_size);

    if let Err(BlError::Flash(err)) = result {
        warn!("copy into slot {} failed: {:?}", dst, err);
        if let Some(footer) = layout.footer_address(dst) {
            let row_start = footer - footer % F::ROW_SIZE as u32;
            // Already failing; the copy error is what gets reported.
            let _ = erase_row(flash, row_start);
        }
    }
    result
}
