// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USB CDC byte port feeding the escaped stream link.

use heapless::Deque;
use rp2040_hal::usb::UsbBus;
use slotboot_common::link::{ByteSerial, LinkError};
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

const USB_PACKET_SIZE: usize = 64;
const TX_BUF_SIZE: usize = 64;

pub struct UsbSerial {
    serial: SerialPort<'static, UsbBus>,
    usb_dev: UsbDevice<'static, UsbBus>,
    rx: Deque<u8, USB_PACKET_SIZE>,
    tx: heapless::Vec<u8, TX_BUF_SIZE>,
}

impl UsbSerial {
    pub fn new(usb_bus: &'static UsbBusAllocator<UsbBus>) -> Result<Self, BuilderError> {
        let serial = SerialPort::new(usb_bus);
        let usb_dev = UsbDeviceBuilder::new(usb_bus, UsbVidPid(0x2E8A, 0x000A))
            .strings(&[StringDescriptors::default()
                .manufacturer("ADNT")
                .product("Slotboot Bootloader")
                .serial_number("0001")])?
            .device_class(usbd_serial::USB_CLASS_CDC)
            .build();

        Ok(Self {
            serial,
            usb_dev,
            rx: Deque::new(),
            tx: heapless::Vec::new(),
        })
    }

    /// Poll USB device. Must be called frequently.
    pub fn poll(&mut self) -> bool {
        self.usb_dev.poll(&mut [&mut self.serial])
    }

    fn refill(&mut self) {
        self.poll();
        let mut packet = [0u8; USB_PACKET_SIZE];
        if let Ok(count) = self.serial.read(&mut packet) {
            for &byte in &packet[..count] {
                // The deque is empty whenever refill runs.
                let _ = self.rx.push_back(byte);
            }
        }
    }

    fn drain_tx(&mut self) -> Result<(), LinkError> {
        let mut offset = 0;
        while offset < self.tx.len() {
            match self.serial.write(&self.tx[offset..]) {
                Ok(n) => offset += n,
                Err(UsbError::WouldBlock) => {
                    self.poll();
                }
                Err(_) => {
                    self.tx.clear();
                    return Err(LinkError::Write);
                }
            }
        }
        self.tx.clear();
        Ok(())
    }
}

impl ByteSerial for UsbSerial {
    fn read_byte(&mut self) -> Option<u8> {
        if self.rx.is_empty() {
            self.refill();
        }
        self.rx.pop_front()
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError> {
        if self.tx.is_full() {
            self.drain_tx()?;
        }
        self.tx.push(byte).map_err(|_| LinkError::TooLarge)
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        self.drain_tx()?;
        loop {
            match self.serial.flush() {
                Ok(()) => return Ok(()),
                Err(UsbError::WouldBlock) => {
                    self.poll();
                }
                Err(_) => return Err(LinkError::Write),
            }
        }
    }
}
