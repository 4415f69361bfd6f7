// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash device capability consumed by the update core.
//!
//! The core never touches NVM registers. Boards implement [`FlashDevice`]
//! over their erase/program primitives; the helpers here wrap each primitive
//! in the unlock, busy-wait, operate, busy-wait, lock, busy-wait sequence the
//! controllers expect.

/// Largest page any supported device uses.
pub const MAX_PAGE_SIZE: usize = 512;
/// Largest erase row any supported device uses.
pub const MAX_ROW_SIZE: usize = 4096;

/// Erased flash reads as this value.
pub const ERASED_BYTE: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    #[error("read failed")]
    Read,
    #[error("page write failed")]
    Write,
    #[error("row erase failed")]
    Erase,
    #[error("address outside the device")]
    OutOfBounds,
    #[error("address not aligned to the operation size")]
    Misaligned,
}

/// Byte-addressable NVM with page programming and row erase.
///
/// Addresses are absolute. `page_write` programs exactly one page at a
/// page-aligned address and `row_erase` erases the row containing `addr`.
pub trait FlashDevice {
    const PAGE_SIZE: usize;
    const ROW_SIZE: usize;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    fn page_write(&mut self, addr: u32, page: &[u8]) -> Result<(), FlashError>;

    fn row_erase(&mut self, addr: u32) -> Result<(), FlashError>;

    /// True while an erase or write is still in progress.
    fn is_busy(&mut self) -> bool;

    fn region_lock(&mut self, addr: u32);

    fn region_unlock(&mut self, addr: u32);
}

/// Spin until the controller is idle.
pub fn wait_ready<F: FlashDevice>(flash: &mut F) {
    while flash.is_busy() {
        core::hint::spin_loop();
    }
}

/// Program one page with the region unlocked for the duration.
pub fn program_page<F: FlashDevice>(
    flash: &mut F,
    addr: u32,
    page: &[u8],
) -> Result<(), FlashError> {
    flash.region_unlock(addr);
    wait_ready(flash);
    let result = flash.page_write(addr, page);
    wait_ready(flash);
    flash.region_lock(addr);
    wait_ready(flash);
    result
}

/// Erase one row with the region unlocked for the duration.
pub fn erase_row<F: FlashDevice>(flash: &mut F, addr: u32) -> Result<(), FlashError> {
    flash.region_unlock(addr);
    wait_ready(flash);
    let result = flash.row_erase(addr);
    wait_ready(flash);
    flash.region_lock(addr);
    wait_ready(flash);
    result
}

/// Erase every row in `[start, end)`.
pub fn erase_range<F: FlashDevice>(flash: &mut F, start: u32, end: u32) -> Result<(), FlashError> {
    let mut addr = start;
    while addr < end {
        erase_row(flash, addr)?;
        addr = addr.saturating_add(F::ROW_SIZE as u32);
    }
    Ok(())
}

pub fn read_u32<F: FlashDevice>(flash: &mut F, addr: u32) -> Result<u32, FlashError> {
    let mut word = [0u8; 4];
    flash.read(addr, &mut word)?;
    Ok(u32::from_le_bytes(word))
}
