// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Transport links carrying transfer-protocol frames.
//!
//! Every link hides its framing behind the same [`Link`] contract so the
//! transfer engine never knows whether it talks over a byte stream, an I2C
//! target or a chip-select framed SPI port.

pub mod i2c;
pub mod spi;
pub mod stream;

pub use i2c::{I2cLink, I2cTarget, TargetDirection};
pub use spi::{ChipSelectPort, SpiLink};
pub use stream::{ByteSerial, StreamLink};

/// Result of polling a link for an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ComStatus {
    /// Nothing complete yet.
    Busy,
    /// A validated frame of this many payload bytes was copied out.
    Frame(usize),
    /// The frame did not fit the receive buffer.
    BufferError,
    /// The frame check sequence did not match.
    TransportFailure,
    /// The last queued response has been fully read by the host.
    SendComplete,
    /// The link reported a failure unrelated to framing.
    Fail,
}

/// Errors raised when queuing an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("frame does not fit the transmit buffer")]
    TooLarge,
    #[error("write to the underlying port failed")]
    Write,
}

/// Framing contract shared by all transports.
pub trait Link {
    /// True when a response leaves the device over more than one host
    /// transaction; the engine then waits for [`ComStatus::SendComplete`]
    /// before allowing a pending reset.
    const MULTI_STAGE_RESPONSE: bool = false;

    /// Set the largest frame (payload plus check bytes) the link accepts.
    fn initialize(&mut self, max_frame_len: usize) -> Result<(), LinkError>;

    /// Try to complete one inbound frame, copying its payload into `rx`.
    fn poll_frame(&mut self, rx: &mut [u8]) -> ComStatus;

    /// Frame and transmit (or queue) one response payload.
    fn send_frame(&mut self, payload: &[u8]) -> Result<(), LinkError>;
}
