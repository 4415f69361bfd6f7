// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot path: forced-entry check, slot decision, and the jump into the
//! execution slot.

use slotboot_common::boot::{select_boot, BootDecision, LoadResult};

use crate::config::{BOOT_CONFIG, ENTRY_MAGIC, ENTRY_MAGIC_ADDR};
use crate::flash::RomFlash;

const ENTRY_MAGIC_WORDS: usize = 4;

/// Value of an erased flash word; an application never starts with it.
const ERASED_WORD: u32 = 0xFFFF_FFFF;

struct VectorTable {
    initial_sp: u32,
    reset_vector: u32,
}

impl VectorTable {
    unsafe fn read_from(addr: u32) -> Self {
        Self {
            initial_sp: (addr as *const u32).read_volatile(),
            reset_vector: (addr as *const u32).offset(1).read_volatile(),
        }
    }
}

/// Check the RAM magic left by the application, or the strap pin held low.
/// The magic is cleared either way so the next reset boots normally.
pub fn check_update_trigger(strap_is_low: bool) -> bool {
    let base = ENTRY_MAGIC_ADDR as *mut u32;
    let mut requested = true;
    for i in 0..ENTRY_MAGIC_WORDS {
        unsafe {
            let word = base.add(i);
            requested &= word.read_volatile() == ENTRY_MAGIC;
            word.write_volatile(0);
        }
    }
    strap_is_low || requested
}

/// Promote, verify, and either return the application entry or `None`.
pub fn decide(flash: &mut RomFlash) -> Option<u32> {
    let outcome = select_boot(flash, &BOOT_CONFIG);

    match outcome.load {
        LoadResult::Promoted { target } => defmt::println!("Staged image promoted to slot {}", target),
        LoadResult::Failed(err) => defmt::println!("Promotion failed: {}", err),
        LoadResult::NothingStaged | LoadResult::NotRequired => {}
    }
    if outcome.restored {
        defmt::println!("Execution slot restored from backup");
    }

    match outcome.decision {
        BootDecision::RunApplication { entry } => Some(entry),
        BootDecision::StayInBootloader(reason) => {
            defmt::println!("Staying in bootloader: {}", reason);
            None
        }
    }
}

/// Jump into the image whose vector table sits at `entry`.
///
/// Returns only if the vector table is plainly erased.
///
/// # Safety
/// `entry` must be the start of a verified application image.
pub unsafe fn jump_to_application(entry: u32) {
    let vt = VectorTable::read_from(entry);
    if vt.initial_sp == ERASED_WORD {
        defmt::println!("Erased stack pointer at 0x{:08x}", entry);
        return;
    }

    prepare_for_firmware_handoff();
    relocate_vector_table(entry);
    jump_to_firmware(vt.initial_sp, vt.reset_vector);
}

/// Clocks are left configured - SDK's runtime_init_clocks handles this
/// by switching away from PLLs before reconfiguring them.
unsafe fn prepare_for_firmware_handoff() {
    cortex_m::interrupt::disable();

    // Clear all pending interrupts in NVIC
    const NVIC_ICPR: *mut u32 = 0xE000_E280 as *mut u32;
    NVIC_ICPR.write_volatile(0xFFFF_FFFF);

    // Disable all NVIC interrupts
    const NVIC_ICER: *mut u32 = 0xE000_E180 as *mut u32;
    NVIC_ICER.write_volatile(0xFFFF_FFFF);
}

unsafe fn relocate_vector_table(base: u32) {
    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
    SCB_VTOR.write_volatile(base);

    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

unsafe fn jump_to_firmware(initial_sp: u32, reset_vector: u32) -> ! {
    core::arch::asm!(
        "msr msp, {sp}",
        "cpsie i",  // SDK expects PRIMASK=0
        "bx {reset}",
        sp = in(reg) initial_sp,
        reset = in(reg) reset_vector,
        options(noreturn)
    );
}
