// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Escaped-delimiter framing over a plain byte stream (UART, USB CDC).

use super::{ComStatus, Link, LinkError};
use crate::frame::{encode_frame, Decoded, StreamDecoder};
use crate::protocol::MAX_FRAME_SIZE;

/// Non-blocking byte port.
pub trait ByteSerial {
    /// Next received byte, if one is waiting.
    fn read_byte(&mut self) -> Option<u8>;

    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError>;

    /// Push out anything buffered by `write_byte`.
    fn flush(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

/// [`Link`] over a [`ByteSerial`] using the escaped stream codec.
pub struct StreamLink<S, const N: usize = MAX_FRAME_SIZE> {
    serial: S,
    decoder: StreamDecoder<N>,
}

impl<S: ByteSerial, const N: usize> StreamLink<S, N> {
    pub fn new(serial: S) -> Self {
        Self {
            serial,
            decoder: StreamDecoder::new(),
        }
    }

    pub fn serial(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn into_inner(self) -> S {
        self.serial
    }
}

impl<S: ByteSerial, const N: usize> Link for StreamLink<S, N> {
    fn initialize(&mut self, max_frame_len: usize) -> Result<(), LinkError> {
        if max_frame_len == 0 || max_frame_len > N {
            return Err(LinkError::InvalidArgument);
        }
        self.decoder.set_capacity(max_frame_len);
        Ok(())
    }

    fn poll_frame(&mut self, rx: &mut [u8]) -> ComStatus {
        while let Some(byte) = self.serial.read_byte() {
            match self.decoder.decode_byte(byte) {
                Decoded::Incomplete => {}
                Decoded::FrameReady(payload) => {
                    let Some(dest) = rx.get_mut(..payload.len()) else {
                        return ComStatus::BufferError;
                    };
                    dest.copy_from_slice(payload);
                    return ComStatus::Frame(payload.len());
                }
                Decoded::ChecksumMismatch => return ComStatus::TransportFailure,
                Decoded::Overflow => return ComStatus::BufferError,
            }
        }
        ComStatus::Busy
    }

    fn send_frame(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if payload.is_empty() {
            return Err(LinkError::InvalidArgument);
        }
        let serial = &mut self.serial;
        encode_frame(payload, |b| serial.write_byte(b))?;
        serial.flush()
    }
}
