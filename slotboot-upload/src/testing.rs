// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! In-memory device for host-side tests: the real transfer engine on a RAM
//! flash, reached through a [`FrameChannel`] that can lose or damage frames.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;

use slotboot_common::config::BootConfig;
use slotboot_common::flash::{FlashDevice, FlashError};
use slotboot_common::frame::{
    encode_frame, frame_check, needs_escape, Decoded, StreamDecoder, END_BYTE, ESCAPE_BYTE,
    START_BYTE,
};
use slotboot_common::ftp::{Activity, FtpEngine};
use slotboot_common::link::{ByteSerial, LinkError, StreamLink};
use slotboot_common::protocol::{UnlockMetadata, MAX_FRAME_SIZE};

use crate::transport::FrameChannel;

pub const DEVICE_ID: u32 = 0x1081_0005;

/// Unlock metadata accepted by the in-memory device.
pub fn metadata() -> UnlockMetadata {
    let config = BootConfig::DEFAULT;
    UnlockMetadata {
        format_major: config.format_version.major,
        format_minor: config.format_version.minor,
        format_patch: config.format_version.patch,
        device_id: DEVICE_ID,
        max_payload_size: config.write_chunk_size,
        target_start_address: config.layout.app_start,
    }
}

/// Flash laid out like `BootConfig::DEFAULT`, with 64-byte pages.
pub struct RamFlash {
    pub mem: Vec<u8>,
}

impl RamFlash {
    pub fn new() -> Self {
        let layout = BootConfig::DEFAULT.layout;
        Self {
            mem: vec![0xFF; (layout.flash_end - layout.flash_start) as usize],
        }
    }

    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        let at = addr as usize;
        self.mem[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn range(&self, addr: u32, len: usize) -> Result<std::ops::Range<usize>, FlashError> {
        let at = addr as usize;
        if at + len > self.mem.len() {
            return Err(FlashError::OutOfBounds);
        }
        Ok(at..at + len)
    }
}

impl FlashDevice for RamFlash {
    const PAGE_SIZE: usize = 64;
    const ROW_SIZE: usize = 256;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        if addr == BootConfig::DEFAULT.device.id_address {
            buf.copy_from_slice(&DEVICE_ID.to_le_bytes()[..buf.len()]);
            return Ok(());
        }
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.mem[range]);
        Ok(())
    }

    fn page_write(&mut self, addr: u32, page: &[u8]) -> Result<(), FlashError> {
        let range = self.range(addr, page.len())?;
        for (cell, &byte) in self.mem[range].iter_mut().zip(page) {
            *cell &= byte;
        }
        Ok(())
    }

    fn row_erase(&mut self, addr: u32) -> Result<(), FlashError> {
        let row = addr - addr % Self::ROW_SIZE as u32;
        let range = self.range(row, Self::ROW_SIZE)?;
        self.mem[range].fill(0xFF);
        Ok(())
    }

    fn is_busy(&mut self) -> bool {
        false
    }

    fn region_lock(&mut self, _addr: u32) {}

    fn region_unlock(&mut self, _addr: u32) {}
}

#[derive(Default)]
pub struct Pipe {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl ByteSerial for Pipe {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError> {
        self.tx.push(byte);
        Ok(())
    }
}

/// Frame channel wired straight into a device engine.
pub struct DeviceChannel {
    engine: FtpEngine<StreamLink<Pipe>, RamFlash>,
    replies: VecDeque<Vec<u8>>,
    /// Every request payload, in order, as the host meant to send it.
    pub sent: Vec<Vec<u8>>,
    /// Discard this many of the next replies.
    pub drop_replies: u32,
    /// Damage the check bytes of this many of the next requests.
    pub corrupt_requests: u32,
    pub reset_requested: bool,
    /// Timeout passed to every `receive` call.
    pub timeouts: Vec<Duration>,
}

impl DeviceChannel {
    pub fn new() -> Self {
        let link = StreamLink::new(Pipe::default());
        let engine = FtpEngine::new(link, RamFlash::new(), BootConfig::DEFAULT).unwrap();
        Self {
            engine,
            replies: VecDeque::new(),
            sent: Vec::new(),
            drop_replies: 0,
            corrupt_requests: 0,
            reset_requested: false,
            timeouts: Vec::new(),
        }
    }

    pub fn flash(&mut self) -> &mut RamFlash {
        self.engine.flash()
    }

    fn run_device(&mut self) {
        for _ in 0..4 {
            if let Ok(Activity::ResetRequested) = self.engine.task() {
                self.reset_requested = true;
            }
        }

        let wire = std::mem::take(&mut self.engine.link().serial().tx);
        let mut decoder: StreamDecoder<MAX_FRAME_SIZE> = StreamDecoder::new();
        for byte in wire {
            if let Decoded::FrameReady(payload) = decoder.decode_byte(byte) {
                if self.drop_replies > 0 {
                    self.drop_replies -= 1;
                } else {
                    self.replies.push_back(payload.to_vec());
                }
            }
        }
    }
}

/// `payload` framed with a deliberately wrong check sequence.
fn corrupted_frame(payload: &[u8]) -> Vec<u8> {
    let fcs = (frame_check(payload) ^ 0x0101).to_le_bytes();
    let mut wire = vec![START_BYTE];
    for &byte in payload.iter().chain(fcs.iter()) {
        if needs_escape(byte) {
            wire.extend_from_slice(&[ESCAPE_BYTE, !byte]);
        } else {
            wire.push(byte);
        }
    }
    wire.push(END_BYTE);
    wire
}

impl FrameChannel for DeviceChannel {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.sent.push(payload.to_vec());

        let wire = if self.corrupt_requests > 0 {
            self.corrupt_requests -= 1;
            corrupted_frame(payload)
        } else {
            let mut wire = Vec::new();
            encode_frame(payload, |b| {
                wire.push(b);
                Ok::<_, std::convert::Infallible>(())
            })?;
            wire
        };
        self.engine.link().serial().rx.extend(wire);
        self.run_device();
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.timeouts.push(timeout);
        Ok(self.replies.pop_front())
    }
}
