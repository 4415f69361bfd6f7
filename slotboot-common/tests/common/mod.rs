// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Shared fixtures: a simulated NOR flash, scripted ports and frame helpers.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};

use slotboot_common::config::BootConfig;
use slotboot_common::flash::{FlashDevice, FlashError};
use slotboot_common::frame::{encode_frame, frame_check, Decoded, StreamDecoder};
use slotboot_common::image::Footer;
use slotboot_common::link::{ByteSerial, ChipSelectPort, LinkError};
use slotboot_common::protocol::{FtpCommand, SequenceByte, UnlockMetadata};
use slotboot_common::verify::CRC32;

pub const PAGE_SIZE: usize = 64;
pub const ROW_SIZE: usize = 256;

/// Raw value of the device id register; bits 8..12 are the revision.
pub const HW_DEVICE_ID: u32 = 0x1081_0305;
/// `HW_DEVICE_ID` with the revision masked out.
pub const DEVICE_ID: u32 = 0x1081_0005;

// =============================================================================
// Simulated flash
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    Write(u32),
    Erase(u32),
    Unlock(u32),
    Lock(u32),
}

/// NOR flash model: erase sets a row to 0xFF, programming can only clear
/// bits, and both are refused unless the region was unlocked first.
pub struct SimFlash {
    pub base: u32,
    pub mem: Vec<u8>,
    pub ops: Vec<FlashOp>,
    pub device_id: (u32, u32),
    unlocked: HashSet<u32>,
    busy: u32,
    pub fail_write_at: Option<u32>,
    pub fail_erase_at: Option<u32>,
    pub fail_reads: bool,
}

impl SimFlash {
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            mem: vec![0xFF; size],
            ops: Vec::new(),
            device_id: (BootConfig::DEFAULT.device.id_address, HW_DEVICE_ID),
            unlocked: HashSet::new(),
            busy: 0,
            fail_write_at: None,
            fail_erase_at: None,
            fail_reads: false,
        }
    }

    /// Flash matching `BootConfig::DEFAULT`.
    pub fn for_config(config: &BootConfig) -> Self {
        let layout = &config.layout;
        Self::new(
            layout.flash_start,
            (layout.flash_end - layout.flash_start) as usize,
        )
    }

    fn offset(&self, addr: u32, len: usize) -> Result<usize, FlashError> {
        let offset = addr.checked_sub(self.base).ok_or(FlashError::OutOfBounds)? as usize;
        if offset + len > self.mem.len() {
            return Err(FlashError::OutOfBounds);
        }
        Ok(offset)
    }

    /// Place bytes directly, bypassing the erase/program rules.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        let offset = (addr - self.base) as usize;
        self.mem[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn slice(&self, addr: u32, len: usize) -> &[u8] {
        let offset = (addr - self.base) as usize;
        &self.mem[offset..offset + len]
    }

    pub fn writes(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, FlashOp::Write(_)))
            .count()
    }

    pub fn erases(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, FlashOp::Erase(_)))
            .count()
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// No region was left unlocked.
    pub fn all_locked(&self) -> bool {
        self.unlocked.is_empty()
    }

    fn region(addr: u32) -> u32 {
        addr - addr % ROW_SIZE as u32
    }
}

impl FlashDevice for SimFlash {
    const PAGE_SIZE: usize = PAGE_SIZE;
    const ROW_SIZE: usize = ROW_SIZE;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        if self.fail_reads {
            return Err(FlashError::Read);
        }
        if addr == self.device_id.0 && buf.len() == 4 {
            buf.copy_from_slice(&self.device_id.1.to_le_bytes());
            return Ok(());
        }
        let offset = self.offset(addr, buf.len())?;
        buf.copy_from_slice(&self.mem[offset..offset + buf.len()]);
        Ok(())
    }

    fn page_write(&mut self, addr: u32, page: &[u8]) -> Result<(), FlashError> {
        if addr % PAGE_SIZE as u32 != 0 || page.len() != PAGE_SIZE {
            return Err(FlashError::Misaligned);
        }
        let offset = self.offset(addr, page.len())?;
        if !self.unlocked.contains(&Self::region(addr)) || self.fail_write_at == Some(addr) {
            return Err(FlashError::Write);
        }
        self.ops.push(FlashOp::Write(addr));
        for (cell, &byte) in self.mem[offset..offset + PAGE_SIZE].iter_mut().zip(page) {
            *cell &= byte;
        }
        self.busy = 2;
        Ok(())
    }

    fn row_erase(&mut self, addr: u32) -> Result<(), FlashError> {
        let row = Self::region(addr);
        let offset = self.offset(row, ROW_SIZE)?;
        if !self.unlocked.contains(&row) || self.fail_erase_at == Some(row) {
            return Err(FlashError::Erase);
        }
        self.ops.push(FlashOp::Erase(row));
        self.mem[offset..offset + ROW_SIZE].fill(0xFF);
        self.busy = 2;
        Ok(())
    }

    fn is_busy(&mut self) -> bool {
        if self.busy > 0 {
            self.busy -= 1;
            true
        } else {
            false
        }
    }

    fn region_lock(&mut self, addr: u32) {
        self.ops.push(FlashOp::Lock(addr));
        self.unlocked.remove(&Self::region(addr));
    }

    fn region_unlock(&mut self, addr: u32) {
        self.ops.push(FlashOp::Unlock(addr));
        self.unlocked.insert(Self::region(addr));
    }
}

// =============================================================================
// Images
// =============================================================================

/// Build a complete slot image: `body` at the start, erased filler, and a
/// footer whose window covers the whole slot up to the hash.
pub fn build_image(config: &BootConfig, body: &[u8], version: u32, target: u8) -> Vec<u8> {
    let partition = config.layout.partition_size as usize;
    let mut image = vec![0xFF; partition];
    image[..body.len()].copy_from_slice(body);

    let mut footer = Footer {
        application_id: target as u16,
        version,
        verification_start: config.layout.app_start,
        verification_end: config.layout.app_start + partition as u32 - 5,
        reference_hash: 0,
    };
    let at = partition - Footer::SIZE;
    image[at..].copy_from_slice(&footer.to_bytes());
    footer.reference_hash = CRC32.checksum(&image[..partition - 4]);
    image[at..].copy_from_slice(&footer.to_bytes());
    image
}

/// Install a valid image into `slot`.
pub fn install_image(
    flash: &mut SimFlash,
    config: &BootConfig,
    slot: u8,
    body: &[u8],
    version: u32,
    target: u8,
) {
    let image = build_image(config, body, version, target);
    let start = config.layout.slot_start(slot).unwrap();
    flash.load(start, &image);
}

pub fn body(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

// =============================================================================
// Command blocks and frames
// =============================================================================

/// Unlock metadata that passes every check against `config`.
pub fn unlock_metadata(config: &BootConfig) -> UnlockMetadata {
    UnlockMetadata {
        format_major: config.format_version.major,
        format_minor: config.format_version.minor,
        format_patch: config.format_version.patch,
        device_id: DEVICE_ID,
        max_payload_size: config.write_chunk_size,
        target_start_address: config.layout.app_start,
    }
}

pub fn write_block(start_address: u32, payload: &[u8]) -> Vec<u8> {
    let mut block = Vec::new();
    block.extend_from_slice(&((4 + payload.len()) as u16).to_le_bytes());
    block.push(0x02);
    block.extend_from_slice(&start_address.to_le_bytes());
    block.extend_from_slice(payload);
    block
}

/// Request payload (before framing).
pub fn request(sequence: SequenceByte, command: FtpCommand, data: &[u8]) -> Vec<u8> {
    let mut payload = vec![sequence.to_byte(), command as u8];
    payload.extend_from_slice(data);
    payload
}

pub fn seq(number: u8) -> SequenceByte {
    SequenceByte::new(number)
}

pub fn sync(number: u8) -> SequenceByte {
    SequenceByte {
        sync: true,
        retry: false,
        number,
    }
}

/// Escaped stream encoding of `payload`.
pub fn stream_frame(payload: &[u8]) -> Vec<u8> {
    let mut wire = Vec::new();
    encode_frame(payload, |b| {
        wire.push(b);
        Ok::<_, ()>(())
    })
    .unwrap();
    wire
}

/// `payload | fcs`, as the polled links receive it.
pub fn checked(payload: &[u8]) -> Vec<u8> {
    let mut frame = payload.to_vec();
    frame.extend_from_slice(&frame_check(payload).to_le_bytes());
    frame
}

/// Decode every complete stream frame in `wire`.
pub fn stream_payloads(wire: &[u8]) -> Vec<Vec<u8>> {
    let mut decoder: StreamDecoder<64> = StreamDecoder::new();
    let mut frames = Vec::new();
    for &byte in wire {
        if let Decoded::FrameReady(payload) = decoder.decode_byte(byte) {
            frames.push(payload.to_vec());
        }
    }
    frames
}

// =============================================================================
// Scripted ports
// =============================================================================

/// In-memory byte port.
#[derive(Default)]
pub struct MockSerial {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    pub fail_writes: bool,
}

impl MockSerial {
    pub fn push(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Take and decode everything written so far.
    pub fn take_frames(&mut self) -> Vec<Vec<u8>> {
        let frames = stream_payloads(&self.tx);
        self.tx.clear();
        frames
    }
}

impl ByteSerial for MockSerial {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError> {
        if self.fail_writes {
            return Err(LinkError::Write);
        }
        self.tx.push(byte);
        Ok(())
    }
}

/// Chip-select port replaying scripted transactions.
///
/// Each transaction is the list of bytes the host clocks in; what the target
/// shifted out during it is recorded in `clocked_out`.
#[derive(Default)]
pub struct ScriptedSpi {
    pub transactions: VecDeque<VecDeque<u8>>,
    pub clocked_out: Vec<Vec<u8>>,
    active: Option<VecDeque<u8>>,
}

impl ScriptedSpi {
    pub fn transaction(&mut self, host_bytes: &[u8]) {
        self.transactions.push_back(host_bytes.iter().copied().collect());
    }

    /// A host read of `len` bytes.
    pub fn read(&mut self, len: usize) {
        let mut bytes = vec![0x55];
        bytes.resize(len, 0x00);
        self.transaction(&bytes);
    }
}

impl ChipSelectPort for ScriptedSpi {
    fn wait_for_select(&mut self) {
        self.active = self.transactions.pop_front();
        self.clocked_out.push(Vec::new());
    }

    fn exchange(&mut self, tx: u8) -> Option<u8> {
        let byte = self.active.as_mut()?.pop_front()?;
        if let Some(out) = self.clocked_out.last_mut() {
            out.push(tx);
        }
        Some(byte)
    }
}
