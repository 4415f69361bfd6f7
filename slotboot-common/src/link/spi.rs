// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Chip-select framed SPI target.
//!
//! Each chip-select assertion is one transaction. A transaction whose first
//! host byte is [`HOST_WRITE_CODE`] carries a command (`payload | fcs`).
//! Once a response is queued, the host reads it in two transactions:
//!
//! ```text
//! length:   0x00 'L' 'E' 'N' | len_lo | len_hi | chk_lo | chk_hi
//! response: 0x00 'R' 'S' 'P' | response ...    | fcs_lo | fcs_hi
//! ```
//!
//! The poll blocks until the host selects the target.

use heapless::Vec;

use super::{ComStatus, Link, LinkError};
use crate::frame::{frame_check, split_checked, FRAME_CHECK_SIZE};
use crate::protocol::{MAX_FRAME_SIZE, MAX_RESPONSE_SIZE};

/// First byte of a host command write.
pub const HOST_WRITE_CODE: u8 = 0x11;
/// First byte the host clocks while reading.
pub const HOST_READ_CODE: u8 = 0x55;

pub const LENGTH_START: [u8; 4] = [0x00, b'L', b'E', b'N'];
pub const RESPONSE_START: [u8; 4] = [0x00, b'R', b'S', b'P'];

const LENGTH_PACKET_SIZE: usize = LENGTH_START.len() + 2 + FRAME_CHECK_SIZE;
const TX_CAPACITY: usize =
    LENGTH_PACKET_SIZE + RESPONSE_START.len() + MAX_RESPONSE_SIZE + FRAME_CHECK_SIZE;

const IDLE_BYTE: u8 = 0xFF;

/// Full-duplex byte exchange gated by chip select.
pub trait ChipSelectPort {
    /// Block until the host asserts chip select.
    fn wait_for_select(&mut self);

    /// Shift `tx` out while shifting one byte in. Returns `None` once chip
    /// select has been released and no further byte was clocked.
    fn exchange(&mut self, tx: u8) -> Option<u8>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpiState {
    NoAction,
    SendLength,
    SendResponse,
}

/// [`Link`] over a [`ChipSelectPort`].
pub struct SpiLink<P, const N: usize = MAX_FRAME_SIZE> {
    port: P,
    state: SpiState,
    tx: Vec<u8, TX_CAPACITY>,
    cursor: usize,
    capacity: usize,
    received: Vec<u8, N>,
}

impl<P: ChipSelectPort, const N: usize> SpiLink<P, N> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            state: SpiState::NoAction,
            tx: Vec::new(),
            cursor: 0,
            capacity: N,
            received: Vec::new(),
        }
    }

    pub fn port(&mut self) -> &mut P {
        &mut self.port
    }

    fn next_tx(&mut self, end: usize) -> u8 {
        match self.tx.get(self.cursor) {
            Some(&byte) if self.cursor < end => {
                self.cursor += 1;
                byte
            }
            _ => IDLE_BYTE,
        }
    }

    /// Clock out queued bytes up to `end` until chip select is released.
    fn clock_out(&mut self, end: usize) {
        loop {
            let byte = self.next_tx(end);
            if self.port.exchange(byte).is_none() {
                break;
            }
        }
    }

    fn read_command(&mut self, rx: &mut [u8]) -> ComStatus {
        self.received.clear();
        let mut overflow = false;

        while let Some(byte) = self.port.exchange(IDLE_BYTE) {
            if self.received.len() < self.capacity && self.received.push(byte).is_ok() {
                continue;
            }
            overflow = true;
        }

        self.state = SpiState::NoAction;
        self.cursor = 0;

        if overflow {
            return ComStatus::BufferError;
        }

        match split_checked(&self.received) {
            Some(payload) => match rx.get_mut(..payload.len()) {
                Some(dest) => {
                    dest.copy_from_slice(payload);
                    ComStatus::Frame(payload.len())
                }
                None => ComStatus::BufferError,
            },
            None => ComStatus::TransportFailure,
        }
    }
}

impl<P: ChipSelectPort, const N: usize> Link for SpiLink<P, N> {
    const MULTI_STAGE_RESPONSE: bool = true;

    fn initialize(&mut self, max_frame_len: usize) -> Result<(), LinkError> {
        if max_frame_len == 0 || max_frame_len > N {
            return Err(LinkError::InvalidArgument);
        }
        self.capacity = max_frame_len;
        self.state = SpiState::NoAction;
        Ok(())
    }

    fn poll_frame(&mut self, rx: &mut [u8]) -> ComStatus {
        self.port.wait_for_select();

        let end = match self.state {
            SpiState::SendLength => LENGTH_PACKET_SIZE,
            SpiState::SendResponse => self.tx.len(),
            SpiState::NoAction => 0,
        };
        let first_tx = self.next_tx(end);
        let Some(first_rx) = self.port.exchange(first_tx) else {
            return ComStatus::Busy;
        };

        if first_rx == HOST_WRITE_CODE {
            return self.read_command(rx);
        }

        match self.state {
            SpiState::SendLength => {
                self.clock_out(LENGTH_PACKET_SIZE);
                // A short read must not shift the response packet.
                self.cursor = LENGTH_PACKET_SIZE;
                self.state = SpiState::SendResponse;
                ComStatus::Busy
            }
            SpiState::SendResponse => {
                self.clock_out(self.tx.len());
                self.state = SpiState::NoAction;
                self.cursor = 0;
                ComStatus::SendComplete
            }
            SpiState::NoAction => {
                self.clock_out(0);
                ComStatus::Busy
            }
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
        let length = ((payload.len() + FRAME_CHECK_SIZE) as u16).to_le_bytes();
        let length_check = frame_check(&length).to_le_bytes();
        let data_check = frame_check(payload).to_le_bytes();

        self.tx.clear();
        let packed = self
            .tx
            .extend_from_slice(&LENGTH_START)
            .and_then(|_| self.tx.extend_from_slice(&length))
            .and_then(|_| self.tx.extend_from_slice(&length_check))
            .and_then(|_| self.tx.extend_from_slice(&RESPONSE_START))
            .and_then(|_| self.tx.extend_from_slice(payload))
            .and_then(|_| self.tx.extend_from_slice(&data_check));
        packed.map_err(|_| LinkError::TooLarge)?;

        self.cursor = 0;
        self.state = SpiState::SendLength;
        Ok(())
    }
}
