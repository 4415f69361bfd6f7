// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Slot bootloader for RP2040: staged image promotion and a USB CDC update
//! client.

#![no_std]
#![no_main]

mod boot;
mod config;
mod flash;
mod peripherals;
mod update;
mod usb_transport;

use defmt_rtt as _;
use embedded_hal::digital::InputPin;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;

#[unsafe(link_section = ".boot2")]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

#[entry]
fn main() -> ! {
    defmt::println!("Bootloader init");

    let Some(mut p) = peripherals::init() else {
        panic!("peripheral init failed");
    };
    let mut flash = flash::RomFlash::init();

    let strap_low = p.strap.is_low().unwrap_or(false);
    if boot::check_update_trigger(strap_low) {
        update::enter_update_mode(&mut p, flash);
    }

    if let Some(entry) = boot::decide(&mut flash) {
        defmt::println!("Jumping to application at 0x{:08x}", entry);
        unsafe { boot::jump_to_application(entry) };
    }

    update::enter_update_mode(&mut p, flash)
}
