// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Length-prefixed framing for an interrupt-driven I2C target.
//!
//! The host writes a command (`payload | fcs`) in one transaction, then
//! reads the response in two: first the length packet, then the response
//! packet.
//!
//! ```text
//! length:   'L' | len_lo | len_hi | chk_lo | chk_hi      (len = response + 2)
//! response: 'R' | response ...    | fcs_lo | fcs_hi
//! ```
//!
//! [`I2cTarget`] is the state shared between the peripheral interrupt and the
//! poll loop. The interrupt only moves it forward (fill the receive buffer,
//! then raise `command_ready`); the poll loop only consumes once
//! `command_ready` is observed and lowers it when the response is queued.
//! Flags are atomics used with load/store only, so this also works on cores
//! without compare-and-swap. Buffers sit behind a critical section.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use critical_section::Mutex;
use heapless::Vec;

use super::{ComStatus, Link, LinkError};
use crate::frame::{frame_check, split_checked, FRAME_CHECK_SIZE};
use crate::protocol::{MAX_FRAME_SIZE, MAX_RESPONSE_SIZE};

pub const LENGTH_TAG: u8 = b'L';
pub const RESPONSE_TAG: u8 = b'R';

const LENGTH_PACKET_SIZE: usize = 1 + 2 + FRAME_CHECK_SIZE;
const TX_CAPACITY: usize = LENGTH_PACKET_SIZE + 1 + MAX_RESPONSE_SIZE + FRAME_CHECK_SIZE;

/// Filler clocked out when the host reads past the queued bytes.
const IDLE_BYTE: u8 = 0xFF;

const NOTHING_TO_SEND: u8 = 0;
const SENDING_LENGTH: u8 = 1;
const SENDING_RESPONSE: u8 = 2;

const EVENT_NONE: u8 = 0;
const EVENT_SEND_COMPLETE: u8 = 1;
const EVENT_BUS_ERROR: u8 = 2;

/// Transfer direction seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetDirection {
    /// The host writes, the target receives.
    HostWrite,
    /// The host reads, the target transmits.
    HostRead,
}

struct TxBuffer {
    bytes: Vec<u8, TX_CAPACITY>,
    cursor: usize,
}

/// Interrupt-shared state of the I2C target. Place it in a `static`.
pub struct I2cTarget<const N: usize = MAX_FRAME_SIZE> {
    command_ready: AtomicBool,
    too_many_bytes: AtomicBool,
    host_reading: AtomicBool,
    transfer: AtomicU8,
    event: AtomicU8,
    capacity: AtomicUsize,
    rx: Mutex<RefCell<Vec<u8, N>>>,
    tx: Mutex<RefCell<TxBuffer>>,
}

impl<const N: usize> Default for I2cTarget<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> I2cTarget<N> {
    pub const fn new() -> Self {
        Self {
            command_ready: AtomicBool::new(false),
            too_many_bytes: AtomicBool::new(false),
            host_reading: AtomicBool::new(false),
            transfer: AtomicU8::new(NOTHING_TO_SEND),
            event: AtomicU8::new(EVENT_NONE),
            capacity: AtomicUsize::new(N),
            rx: Mutex::new(RefCell::new(Vec::new())),
            tx: Mutex::new(RefCell::new(TxBuffer {
                bytes: Vec::new(),
                cursor: 0,
            })),
        }
    }

    // --- Interrupt side ---

    /// Address matched. Returns `true` to ACK, `false` to NAK.
    ///
    /// Every transaction is refused while a received command is waiting to
    /// be processed.
    pub fn on_address_match(&self, direction: TargetDirection) -> bool {
        if self.command_ready.load(Ordering::Acquire) {
            return false;
        }

        match direction {
            TargetDirection::HostWrite => {
                self.host_reading.store(false, Ordering::Relaxed);
                self.too_many_bytes.store(false, Ordering::Relaxed);
                critical_section::with(|cs| self.rx.borrow_ref_mut(cs).clear());
            }
            TargetDirection::HostRead => {
                self.host_reading.store(true, Ordering::Relaxed);
            }
        }
        true
    }

    /// One byte arrived from the host.
    pub fn on_byte_received(&self, byte: u8) {
        let capacity = self.capacity.load(Ordering::Relaxed);
        let stored = critical_section::with(|cs| {
            let mut rx = self.rx.borrow_ref_mut(cs);
            rx.len() < capacity && rx.push(byte).is_ok()
        });
        if !stored {
            self.too_many_bytes.store(true, Ordering::Relaxed);
        }
    }

    /// The host clocks out one byte; returns the byte to transmit.
    pub fn on_byte_requested(&self) -> u8 {
        critical_section::with(|cs| {
            let mut tx = self.tx.borrow_ref_mut(cs);
            let cursor = tx.cursor;
            match tx.bytes.get(cursor).copied() {
                Some(byte) => {
                    tx.cursor += 1;
                    byte
                }
                None => IDLE_BYTE,
            }
        })
    }

    /// Stop condition.
    pub fn on_stop(&self) {
        if self.host_reading.load(Ordering::Relaxed) {
            match self.transfer.load(Ordering::Relaxed) {
                SENDING_LENGTH => self.transfer.store(SENDING_RESPONSE, Ordering::Relaxed),
                SENDING_RESPONSE => {
                    self.transfer.store(NOTHING_TO_SEND, Ordering::Relaxed);
                    self.event.store(EVENT_SEND_COMPLETE, Ordering::Release);
                }
                _ => {}
            }
            return;
        }

        let received = critical_section::with(|cs| !self.rx.borrow_ref(cs).is_empty());
        if received || self.too_many_bytes.load(Ordering::Relaxed) {
            self.transfer.store(NOTHING_TO_SEND, Ordering::Relaxed);
            self.command_ready.store(true, Ordering::Release);
        }
    }

    /// Bus error reported by the peripheral.
    pub fn on_error(&self) {
        self.event.store(EVENT_BUS_ERROR, Ordering::Release);
    }

    /// True while a received command waits for the poll loop.
    pub fn is_command_ready(&self) -> bool {
        self.command_ready.load(Ordering::Acquire)
    }

    // --- Poll side (used through I2cLink) ---

    fn take_event(&self) -> u8 {
        critical_section::with(|_| {
            let event = self.event.load(Ordering::Acquire);
            self.event.store(EVENT_NONE, Ordering::Relaxed);
            event
        })
    }
}

/// Poll-loop handle implementing [`Link`] on top of a shared [`I2cTarget`].
pub struct I2cLink<'a, const N: usize = MAX_FRAME_SIZE> {
    target: &'a I2cTarget<N>,
}

impl<'a, const N: usize> I2cLink<'a, N> {
    pub fn new(target: &'a I2cTarget<N>) -> Self {
        Self { target }
    }
}

impl<const N: usize> Link for I2cLink<'_, N> {
    const MULTI_STAGE_RESPONSE: bool = true;

    fn initialize(&mut self, max_frame_len: usize) -> Result<(), LinkError> {
        if max_frame_len == 0 || max_frame_len > N {
            return Err(LinkError::InvalidArgument);
        }
        self.target.capacity.store(max_frame_len, Ordering::Relaxed);
        Ok(())
    }

    fn poll_frame(&mut self, rx: &mut [u8]) -> ComStatus {
        let target = self.target;

        if target.command_ready.load(Ordering::Acquire) {
            if target.too_many_bytes.load(Ordering::Relaxed) {
                return ComStatus::BufferError;
            }
            return critical_section::with(|cs| {
                let received = target.rx.borrow_ref(cs);
                match split_checked(&received) {
                    Some(payload) => match rx.get_mut(..payload.len()) {
                        Some(dest) => {
                            dest.copy_from_slice(payload);
                            ComStatus::Frame(payload.len())
                        }
                        None => ComStatus::BufferError,
                    },
                    None => ComStatus::TransportFailure,
                }
            });
        }

        match target.take_event() {
            EVENT_SEND_COMPLETE => ComStatus::SendComplete,
            EVENT_BUS_ERROR => ComStatus::BufferError,
            _ => ComStatus::Busy,
        }
    }

    fn send_frame(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if payload.is_empty() {
            return Err(LinkError::InvalidArgument);
        }
        if payload.len() > MAX_RESPONSE_SIZE {
            return Err(LinkError::TooLarge);
        }

        // Bounded by MAX_RESPONSE_SIZE above.
        let sending_length = (payload.len() + FRAME_CHECK_SIZE) as u16;
        let length = sending_length.to_le_bytes();
        let length_check = frame_check(&length).to_le_bytes();
        let data_check = frame_check(payload).to_le_bytes();

        let mut packet: Vec<u8, TX_CAPACITY> = Vec::new();
        packet
            .extend_from_slice(&[
                LENGTH_TAG,
                length[0],
                length[1],
                length_check[0],
                length_check[1],
                RESPONSE_TAG,
            ])
            .map_err(|_| LinkError::TooLarge)?;
        packet
            .extend_from_slice(payload)
            .map_err(|_| LinkError::TooLarge)?;
        packet
            .extend_from_slice(&data_check)
            .map_err(|_| LinkError::TooLarge)?;

        // A completion still pending belongs to the previous response.
        critical_section::with(|cs| {
            let mut tx = self.target.tx.borrow_ref_mut(cs);
            tx.bytes = packet;
            tx.cursor = 0;
            self.target.event.store(EVENT_NONE, Ordering::Relaxed);
        });

        self.target.transfer.store(SENDING_LENGTH, Ordering::Relaxed);
        self.target.command_ready.store(false, Ordering::Release);
        Ok(())
    }
}
