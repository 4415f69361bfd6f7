// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Serial transport carrying escaped-stream frames.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::trace;
use serialport::SerialPort;

use slotboot_common::frame::{encode_frame, Decoded, StreamDecoder};
use slotboot_common::protocol::MAX_FRAME_SIZE;

pub const DEFAULT_BAUD: u32 = 115_200;

/// Whole frames in and out; what the session layer talks to.
pub trait FrameChannel {
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Next valid frame payload, or `None` once `timeout` has elapsed.
    /// Frames failing their check are dropped.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Frame channel over a serial port (USB CDC or UART).
pub struct Transport {
    port: Box<dyn SerialPort>,
    decoder: StreamDecoder<MAX_FRAME_SIZE>,
}

impl Transport {
    pub fn new(port_name: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(10))
            .open()
            .with_context(|| format!("Failed to open serial port {}", port_name))?;

        Ok(Self {
            port,
            decoder: StreamDecoder::new(),
        })
    }

    /// Get the port name.
    pub fn port_name(&self) -> String {
        self.port.name().unwrap_or_else(|| "?".to_string())
    }
}

impl FrameChannel for Transport {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let mut wire = Vec::with_capacity(payload.len() * 2 + 4);
        encode_frame(payload, |b| {
            wire.push(b);
            Ok::<_, std::convert::Infallible>(())
        })?;
        trace!("tx {:02x?}", wire);
        self.port
            .write_all(&wire)
            .context("Failed to write to serial port")?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut byte = [0u8; 1];

        // One byte per read so nothing past the END byte is consumed.
        while Instant::now() < deadline {
            match self.port.read(&mut byte) {
                Ok(1) => {}
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e).context("Serial read error"),
            }
            match self.decoder.decode_byte(byte[0]) {
                Decoded::FrameReady(payload) => {
                    trace!("rx {:02x?}", payload);
                    return Ok(Some(payload.to_vec()));
                }
                Decoded::ChecksumMismatch | Decoded::Overflow => trace!("rx frame dropped"),
                Decoded::Incomplete => {}
            }
        }
        Ok(None)
    }
}
