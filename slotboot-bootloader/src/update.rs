// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Update client over USB CDC: the transfer engine on an escaped stream.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use rp2040_hal as hal;
use slotboot_common::ftp::{Activity, FtpEngine, RESET_DELAY_MS};
use slotboot_common::link::StreamLink;
use usb_device::class_prelude::UsbBusAllocator;

use crate::config::BOOT_CONFIG;
use crate::flash::RomFlash;
use crate::peripherals::{self, Peripherals};
use crate::usb_transport::UsbSerial;

/// Initialize USB and serve the host until it ends the transfer, then reset.
pub fn enter_update_mode(p: &mut Peripherals, flash: RomFlash) -> ! {
    defmt::println!("Update mode requested");

    let Some(mut usb) = p.usb.take() else {
        halt("USB peripherals already taken");
    };

    let usb_bus = peripherals::store_usb_bus(UsbBusAllocator::new(hal::usb::UsbBus::new(
        usb.regs,
        usb.dpram,
        usb.clock,
        true,
        &mut usb.resets,
    )));

    let serial = match UsbSerial::new(usb_bus) {
        Ok(serial) => serial,
        Err(_) => halt("USB descriptor setup failed"),
    };

    let mut engine = match FtpEngine::new(StreamLink::<_>::new(serial), flash, BOOT_CONFIG) {
        Ok(engine) => engine,
        Err(err) => {
            defmt::println!("Update client rejected configuration: {}", err);
            halt("invalid configuration");
        }
    };

    defmt::println!("USB CDC initialized, entering update loop");
    p.led_pin.set_high().ok();

    loop {
        engine.link().serial().poll();

        match engine.task() {
            Ok(Activity::ResetRequested) => break,
            Ok(_) => {}
            Err(err) => defmt::debug!("transfer: {}", err),
        }
    }

    defmt::println!("Transfer ended, resetting");
    p.timer.delay_ms(RESET_DELAY_MS);
    cortex_m::peripheral::SCB::sys_reset();
}

fn halt(reason: &str) -> ! {
    defmt::println!("Bootloader halted: {}", reason);
    loop {
        cortex_m::asm::wfi();
    }
}
