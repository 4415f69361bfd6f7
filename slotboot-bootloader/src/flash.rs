// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! [`FlashDevice`] over the RP2040 ROM flash routines.
//!
//! On RP2040, flash operations (erase/program) require disabling XIP first.
//! The full sequence is:
//!   1. connect_internal_flash()
//!   2. flash_exit_xip()
//!   3. flash_range_erase() or flash_range_program()
//!   4. flash_flush_cache()
//!   5. flash_enter_cmd_xip()
//!
//! All code executing during steps 1-5 must run from RAM, not flash, so the
//! two primitives live in `.data` and call ROM through pointers resolved at
//! init time.

use slotboot_common::flash::{FlashDevice, FlashError};

use crate::config::{BOOT_CONFIG, FLASH_BASE};

pub const PAGE_SIZE: usize = 256;
pub const SECTOR_SIZE: usize = 4096;

/// Block erase command for `flash_range_erase`.
const BLOCK_ERASE_CMD: u8 = 0x20;

type RomFnVoid = unsafe extern "C" fn();
type RomFnErase = unsafe extern "C" fn(u32, usize, u32, u8);
type RomFnProgram = unsafe extern "C" fn(u32, *const u8, usize);

static mut ROM_CONNECT_INTERNAL_FLASH: RomFnVoid = dummy_void;
static mut ROM_FLASH_EXIT_XIP: RomFnVoid = dummy_void;
static mut ROM_FLASH_RANGE_ERASE: RomFnErase = dummy_erase;
static mut ROM_FLASH_RANGE_PROGRAM: RomFnProgram = dummy_program;
static mut ROM_FLASH_FLUSH_CACHE: RomFnVoid = dummy_void;
static mut ROM_FLASH_ENTER_CMD_XIP: RomFnVoid = dummy_void;

unsafe extern "C" fn dummy_void() {}
unsafe extern "C" fn dummy_erase(_: u32, _: usize, _: u32, _: u8) {}
unsafe extern "C" fn dummy_program(_: u32, _: *const u8, _: usize) {}

/// Look up a ROM function by its two-character tag.
/// ROM table pointer at 0x14 and lookup function at 0x18 are 16-bit halfword pointers.
unsafe fn rom_func_lookup(tag: &[u8; 2]) -> usize {
    let fn_table = *(0x14 as *const u16) as *const u16;
    let lookup: unsafe extern "C" fn(*const u16, u32) -> usize =
        core::mem::transmute::<usize, unsafe extern "C" fn(*const u16, u32) -> usize>(
            *(0x18 as *const u16) as usize,
        );
    let code = u16::from_le_bytes(*tag) as u32;
    lookup(fn_table, code)
}

#[link_section = ".data"]
#[inline(never)]
unsafe fn rom_erase(offset: u32, size: u32) {
    cortex_m::interrupt::disable();
    ROM_CONNECT_INTERNAL_FLASH();
    ROM_FLASH_EXIT_XIP();
    ROM_FLASH_RANGE_ERASE(offset, size as usize, SECTOR_SIZE as u32, BLOCK_ERASE_CMD);
    ROM_FLASH_FLUSH_CACHE();
    ROM_FLASH_ENTER_CMD_XIP();
    cortex_m::interrupt::enable();
}

#[link_section = ".data"]
#[inline(never)]
unsafe fn rom_program(offset: u32, data: *const u8, len: usize) {
    cortex_m::interrupt::disable();
    ROM_CONNECT_INTERNAL_FLASH();
    ROM_FLASH_EXIT_XIP();
    ROM_FLASH_RANGE_PROGRAM(offset, data, len);
    ROM_FLASH_FLUSH_CACHE();
    ROM_FLASH_ENTER_CMD_XIP();
    cortex_m::interrupt::enable();
}

/// The on-board QSPI flash, read through XIP and written through ROM.
///
/// ROM calls return only once the operation has finished, so the device is
/// never busy and the region lock hooks have nothing to do.
pub struct RomFlash {
    _private: (),
}

impl RomFlash {
    /// Resolve the ROM entry points. Must run while XIP is still active.
    pub fn init() -> Self {
        unsafe {
            ROM_CONNECT_INTERNAL_FLASH =
                core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"IF"));
            ROM_FLASH_EXIT_XIP = core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"EX"));
            ROM_FLASH_RANGE_ERASE =
                core::mem::transmute::<usize, RomFnErase>(rom_func_lookup(b"RE"));
            ROM_FLASH_RANGE_PROGRAM =
                core::mem::transmute::<usize, RomFnProgram>(rom_func_lookup(b"RP"));
            ROM_FLASH_FLUSH_CACHE =
                core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"FC"));
            ROM_FLASH_ENTER_CMD_XIP =
                core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"CX"));
        }
        Self { _private: () }
    }

    /// Flash-relative offset of an absolute XIP address.
    fn offset(addr: u32, len: usize) -> Result<u32, FlashError> {
        let layout = &BOOT_CONFIG.layout;
        if !layout.contains(addr, len as u32) {
            return Err(FlashError::OutOfBounds);
        }
        Ok(addr - FLASH_BASE)
    }
}

impl FlashDevice for RomFlash {
    const PAGE_SIZE: usize = PAGE_SIZE;
    const ROW_SIZE: usize = SECTOR_SIZE;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        // The chip id lives in SYSINFO, outside flash.
        if addr == BOOT_CONFIG.device.id_address && buf.len() == 4 {
            let id = unsafe { (addr as *const u32).read_volatile() };
            buf.copy_from_slice(&id.to_le_bytes());
            return Ok(());
        }
        Self::offset(addr, buf.len())?;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = unsafe { ((addr + i as u32) as *const u8).read_volatile() };
        }
        Ok(())
    }

    fn page_write(&mut self, addr: u32, page: &[u8]) -> Result<(), FlashError> {
        if addr as usize % PAGE_SIZE != 0 || page.len() != PAGE_SIZE {
            return Err(FlashError::Misaligned);
        }
        let offset = Self::offset(addr, page.len())?;
        unsafe { rom_program(offset, page.as_ptr(), page.len()) };
        Ok(())
    }

    fn row_erase(&mut self, addr: u32) -> Result<(), FlashError> {
        let row = addr - addr % SECTOR_SIZE as u32;
        let offset = Self::offset(row, SECTOR_SIZE)?;
        unsafe { rom_erase(offset, SECTOR_SIZE as u32) };
        Ok(())
    }

    fn is_busy(&mut self) -> bool {
        false
    }

    fn region_lock(&mut self, _addr: u32) {}

    fn region_unlock(&mut self, _addr: u32) {}
}
