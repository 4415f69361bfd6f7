// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Frame check sequence and the escaped-delimiter stream codec.
//!
//! A stream frame looks like this on the wire:
//!
//! ```text
//! START | payload ... | fcs_lo | fcs_hi | END
//! ```
//!
//! Every byte between the delimiters that collides with START, END or ESCAPE
//! is sent as `ESCAPE, !byte`. The frame check sequence covers the payload
//! only and is stored little-endian.

/// Opens a receive window.
pub const START_BYTE: u8 = 0x56;
/// Closes a receive window and triggers validation.
pub const END_BYTE: u8 = 0x9E;
/// Marks the next byte as bit-inverted.
pub const ESCAPE_BYTE: u8 = 0xCC;

/// Size of the frame check sequence trailing every payload.
pub const FRAME_CHECK_SIZE: usize = 2;

/// Compute the 16-bit frame check sequence of `data`.
///
/// Even-indexed bytes are added as the low byte, odd-indexed bytes as the
/// high byte of a wrapping 16-bit accumulator; the result is inverted. This
/// catches line corruption, nothing more.
pub fn frame_check(data: &[u8]) -> u16 {
    let sum = data.iter().enumerate().fold(0u16, |sum, (i, &byte)| {
        if i % 2 == 0 {
            sum.wrapping_add(byte as u16)
        } else {
            sum.wrapping_add((byte as u16) << 8)
        }
    });
    !sum
}

/// True if `byte` must be escaped inside a stream frame.
pub fn needs_escape(byte: u8) -> bool {
    matches!(byte, START_BYTE | END_BYTE | ESCAPE_BYTE)
}

/// Outcome of feeding one byte to a [`StreamDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Decoded<'a> {
    /// No complete frame yet (also returned for bytes outside a window).
    Incomplete,
    /// A frame closed and its check sequence matched. Holds the payload
    /// without the check bytes.
    FrameReady(&'a [u8]),
    /// A frame closed but its check sequence did not match.
    ChecksumMismatch,
    /// More bytes arrived than the configured capacity; the window is closed.
    Overflow,
}

/// Byte-at-a-time decoder for the escaped stream framing.
///
/// Capacity counts unescaped bytes including the two check bytes.
pub struct StreamDecoder<const N: usize> {
    buf: [u8; N],
    len: usize,
    limit: usize,
    in_window: bool,
    escaped: bool,
}

impl<const N: usize> Default for StreamDecoder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> StreamDecoder<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; N],
            len: 0,
            limit: N,
            in_window: false,
            escaped: false,
        }
    }

    /// Limit the frame size accepted by this decoder (clamped to `N`).
    pub fn set_capacity(&mut self, limit: usize) {
        self.limit = limit.min(N);
        self.reset();
    }

    pub fn capacity(&self) -> usize {
        self.limit
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.len = 0;
        self.in_window = false;
        self.escaped = false;
    }

    /// True while a window is open.
    pub fn is_receiving(&self) -> bool {
        self.in_window
    }

    /// Feed one received byte.
    pub fn decode_byte(&mut self, byte: u8) -> Decoded<'_> {
        match byte {
            START_BYTE => {
                self.len = 0;
                self.escaped = false;
                self.in_window = true;
                Decoded::Incomplete
            }
            _ if !self.in_window => Decoded::Incomplete,
            END_BYTE => {
                self.in_window = false;
                self.escaped = false;
                self.close()
            }
            ESCAPE_BYTE => {
                self.escaped = true;
                Decoded::Incomplete
            }
            _ => {
                let value = if self.escaped { !byte } else { byte };
                self.escaped = false;

                if self.len >= self.limit {
                    self.in_window = false;
                    return Decoded::Overflow;
                }

                self.buf[self.len] = value;
                self.len += 1;
                Decoded::Incomplete
            }
        }
    }

    fn close(&self) -> Decoded<'_> {
        if self.len < FRAME_CHECK_SIZE {
            return Decoded::ChecksumMismatch;
        }

        let (payload, fcs) = self.buf[..self.len].split_at(self.len - FRAME_CHECK_SIZE);
        let received = u16::from_le_bytes([fcs[0], fcs[1]]);

        if frame_check(payload) == received {
            Decoded::FrameReady(payload)
        } else {
            Decoded::ChecksumMismatch
        }
    }
}

/// Encode `payload` as a stream frame, handing each wire byte to `emit`.
///
/// Stops at the first error returned by `emit`.
pub fn encode_frame<E>(payload: &[u8], mut emit: impl FnMut(u8) -> Result<(), E>) -> Result<(), E> {
    let fcs = frame_check(payload).to_le_bytes();

    emit(START_BYTE)?;
    for &byte in payload.iter().chain(fcs.iter()) {
        if needs_escape(byte) {
            emit(ESCAPE_BYTE)?;
            emit(!byte)?;
        } else {
            emit(byte)?;
        }
    }
    emit(END_BYTE)
}

/// Split `frame` into payload and check sequence and validate it.
///
/// Shared by the polled links, which receive unescaped `payload | fcs` blocks.
pub fn split_checked(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < FRAME_CHECK_SIZE {
        return None;
    }
    let (payload, fcs) = frame.split_at(frame.len() - FRAME_CHECK_SIZE);
    (frame_check(payload) == u16::from_le_bytes([fcs[0], fcs[1]])).then_some(payload)
}
