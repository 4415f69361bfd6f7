// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Shared wire types for device <-> host communication.
//!
//! All multi-byte fields are little-endian. Everything here is decoded and
//! encoded field by field; nothing relies on in-memory struct layout. Both
//! the bootloader and the host tool use these types.

use heapless::Vec;

use crate::frame::FRAME_CHECK_SIZE;

// --- Sizes ---

/// Largest write chunk any build supports (one flash page).
pub const MAX_WRITE_CHUNK: usize = 512;
/// `blockLength: u16` + `blockType: u8`.
pub const BLOCK_HEADER_SIZE: usize = 3;
/// `startAddress: u32` of a WriteFlash block.
pub const WRITE_HEADER_SIZE: usize = 4;
/// Sequence byte + command/status byte.
pub const FTP_HEADER_SIZE: usize = 2;
/// Largest command block carried by a WriteChunk.
pub const MAX_BLOCK_SIZE: usize = BLOCK_HEADER_SIZE + WRITE_HEADER_SIZE + MAX_WRITE_CHUNK;
/// Largest frame (payload plus check bytes) any link must accept.
pub const MAX_FRAME_SIZE: usize = FTP_HEADER_SIZE + MAX_BLOCK_SIZE + FRAME_CHECK_SIZE;
/// Largest response payload the device ever builds.
pub const MAX_RESPONSE_SIZE: usize = 25;
/// Smallest valid request payload (sequence + command).
pub const MIN_REQUEST_SIZE: usize = FTP_HEADER_SIZE;

/// Frame size for a given write chunk: header, block, check bytes.
pub const fn frame_size_for_chunk(write_chunk: usize) -> usize {
    FTP_HEADER_SIZE + BLOCK_HEADER_SIZE + WRITE_HEADER_SIZE + write_chunk + FRAME_CHECK_SIZE
}

// --- Sequence byte ---

pub const SYNC_BIT: u8 = 0x80;
pub const RETRY_BIT: u8 = 0x40;
pub const SEQUENCE_MASK: u8 = 0x3F;
/// Sequence numbers wrap at this modulus.
pub const SEQUENCE_MODULUS: u8 = SEQUENCE_MASK + 1;

/// Decoded byte 0 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceByte {
    pub sync: bool,
    pub retry: bool,
    pub number: u8,
}

impl SequenceByte {
    pub fn new(number: u8) -> Self {
        Self {
            sync: false,
            retry: false,
            number: number & SEQUENCE_MASK,
        }
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            sync: byte & SYNC_BIT != 0,
            retry: byte & RETRY_BIT != 0,
            number: byte & SEQUENCE_MASK,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = self.number & SEQUENCE_MASK;
        if self.sync {
            byte |= SYNC_BIT;
        }
        if self.retry {
            byte |= RETRY_BIT;
        }
        byte
    }
}

/// Next sequence number after `number`, modulo 64.
pub fn next_sequence(number: u8) -> u8 {
    number.wrapping_add(1) & SEQUENCE_MASK
}

// --- Commands and statuses ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FtpCommand {
    GetClientInfo = 0x01,
    StartTransfer = 0x02,
    WriteChunk = 0x03,
    GetImageState = 0x04,
    EndTransfer = 0x05,
}

impl FtpCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::GetClientInfo),
            0x02 => Some(Self::StartTransfer),
            0x03 => Some(Self::WriteChunk),
            0x04 => Some(Self::GetImageState),
            0x05 => Some(Self::EndTransfer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ResponseStatus {
    Success = 0x01,
    CommandNotSupported = 0x02,
    NotAuthorized = 0x03,
    CommandNotExecuted = 0x04,
    AbortTransfer = 0x05,
}

impl ResponseStatus {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Success),
            0x02 => Some(Self::CommandNotSupported),
            0x03 => Some(Self::NotAuthorized),
            0x04 => Some(Self::CommandNotExecuted),
            0x05 => Some(Self::AbortTransfer),
            _ => None,
        }
    }
}

/// Cause carried by an [`ResponseStatus::AbortTransfer`] response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AbortCode {
    Generic = 0x00,
    InvalidFile = 0x01,
    InvalidDeviceId = 0x02,
    AddressError = 0x03,
    EraseError = 0x04,
    WriteError = 0x05,
    ReadError = 0x06,
    AppVersionError = 0x07,
}

impl AbortCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Generic),
            0x01 => Some(Self::InvalidFile),
            0x02 => Some(Self::InvalidDeviceId),
            0x03 => Some(Self::AddressError),
            0x04 => Some(Self::EraseError),
            0x05 => Some(Self::WriteError),
            0x06 => Some(Self::ReadError),
            0x07 => Some(Self::AppVersionError),
            _ => None,
        }
    }
}

/// Cause carried by a retry request ([`ResponseStatus::CommandNotExecuted`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TransportFailure {
    IntegrityCheck = 0x00,
    CommandTooLong = 0x01,
    CommandTooShort = 0x02,
    InvalidSequenceNumber = 0x03,
}

impl TransportFailure {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::IntegrityCheck),
            0x01 => Some(Self::CommandTooLong),
            0x02 => Some(Self::CommandTooShort),
            0x03 => Some(Self::InvalidSequenceNumber),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ImageState {
    Valid = 0x01,
    Invalid = 0x02,
}

impl ImageState {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Valid),
            0x02 => Some(Self::Invalid),
            _ => None,
        }
    }
}

/// Wire decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    #[error("input too short")]
    Truncated,
    #[error("unknown record type {0:#x}")]
    UnknownType(u8),
    #[error("record length does not match its type")]
    BadLength,
    #[error("output buffer too small")]
    Overflow,
}

// --- Discovery (GetClientInfo) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TlvType {
    ProtocolVersion = 0x01,
    TransferParameters = 0x02,
    CommandTimeout = 0x03,
    InterMessageDelay = 0x04,
}

/// Version of the transfer protocol this client implements.
pub const PROTOCOL_VERSION: [u8; 3] = [1, 2, 0];
/// Command code meaning "applies to every command" in a timeout record.
pub const ALL_COMMANDS: u8 = 0x00;

/// Client capabilities reported by `GetClientInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientInfo {
    pub protocol_version: [u8; 3],
    /// Largest command payload the client accepts.
    pub max_payload_size: u16,
    pub buffer_count: u8,
    pub timeout_command: u8,
    /// Advisory command timeout, tenths of a second.
    pub command_timeout: u16,
    /// Advisory minimum delay between messages, nanoseconds.
    pub inter_message_delay: u32,
}

impl ClientInfo {
    /// Encoded size: four TLV records.
    pub const ENCODED_SIZE: usize = (2 + 3) + (2 + 3) + (2 + 3) + (2 + 4);

    pub fn encode<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<(), ProtocolError> {
        let payload = self.max_payload_size.to_le_bytes();
        let timeout = self.command_timeout.to_le_bytes();
        let delay = self.inter_message_delay.to_le_bytes();

        let mut push = |kind: TlvType, value: &[u8]| -> Result<(), ProtocolError> {
            out.push(kind as u8).map_err(|_| ProtocolError::Overflow)?;
            out.push(value.len() as u8)
                .map_err(|_| ProtocolError::Overflow)?;
            out.extend_from_slice(value)
                .map_err(|_| ProtocolError::Overflow)
        };

        push(TlvType::ProtocolVersion, &self.protocol_version)?;
        push(
            TlvType::TransferParameters,
            &[payload[0], payload[1], self.buffer_count],
        )?;
        push(
            TlvType::CommandTimeout,
            &[self.timeout_command, timeout[0], timeout[1]],
        )?;
        push(TlvType::InterMessageDelay, &delay)
    }

    /// Decode the TLV records of a discovery response body.
    ///
    /// Records may come in any order; every one of the four must be present.
    pub fn decode(mut data: &[u8]) -> Result<Self, ProtocolError> {
        let mut version = None;
        let mut params = None;
        let mut timeout = None;
        let mut delay = None;

        while !data.is_empty() {
            let [kind, len, rest @ ..] = data else {
                return Err(ProtocolError::Truncated);
            };
            let len = *len as usize;
            if rest.len() < len {
                return Err(ProtocolError::Truncated);
            }
            let (value, tail) = rest.split_at(len);
            data = tail;

            match (*kind, value) {
                (0x01, &[major, minor, patch]) => version = Some([major, minor, patch]),
                (0x02, &[lo, hi, count]) => params = Some((u16::from_le_bytes([lo, hi]), count)),
                (0x03, &[cmd, lo, hi]) => timeout = Some((cmd, u16::from_le_bytes([lo, hi]))),
                (0x04, &[a, b, c, d]) => delay = Some(u32::from_le_bytes([a, b, c, d])),
                (0x01..=0x04, _) => return Err(ProtocolError::BadLength),
                (other, _) => return Err(ProtocolError::UnknownType(other)),
            }
        }

        let (
            Some(protocol_version),
            Some((max_payload_size, buffer_count)),
            Some((timeout_command, command_timeout)),
            Some(inter_message_delay),
        ) = (version, params, timeout, delay)
        else {
            return Err(ProtocolError::Truncated);
        };

        Ok(Self {
            protocol_version,
            max_payload_size,
            buffer_count,
            timeout_command,
            command_timeout,
            inter_message_delay,
        })
    }
}

// --- Command blocks (WriteChunk payloads) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BlockType {
    Unlock = 0x01,
    WriteFlash = 0x02,
}

/// Metadata carried by the Unlock block.
///
/// ```text
/// [0:2]   blockLength        [6:10]  deviceId
/// [2]     blockType = 0x01   [10:12] maxPayloadSize
/// [3]     formatMajor        [12:16] targetStartAddress
/// [4]     formatMinor
/// [5]     formatPatch
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnlockMetadata {
    pub format_major: u8,
    pub format_minor: u8,
    pub format_patch: u8,
    pub device_id: u32,
    pub max_payload_size: u16,
    pub target_start_address: u32,
}

impl UnlockMetadata {
    /// Whole block size, header included.
    pub const BLOCK_SIZE: usize = 16;

    pub fn to_block(&self) -> [u8; Self::BLOCK_SIZE] {
        let mut block = [0u8; Self::BLOCK_SIZE];
        let body_len = (Self::BLOCK_SIZE - BLOCK_HEADER_SIZE) as u16;
        block[0..2].copy_from_slice(&body_len.to_le_bytes());
        block[2] = BlockType::Unlock as u8;
        block[3] = self.format_major;
        block[4] = self.format_minor;
        block[5] = self.format_patch;
        block[6..10].copy_from_slice(&self.device_id.to_le_bytes());
        block[10..12].copy_from_slice(&self.max_payload_size.to_le_bytes());
        block[12..16].copy_from_slice(&self.target_start_address.to_le_bytes());
        block
    }

    fn from_block(block: &[u8]) -> Option<Self> {
        let block: &[u8; Self::BLOCK_SIZE] = block.get(..Self::BLOCK_SIZE)?.try_into().ok()?;
        Some(Self {
            format_major: block[3],
            format_minor: block[4],
            format_patch: block[5],
            device_id: u32::from_le_bytes([block[6], block[7], block[8], block[9]]),
            max_payload_size: u16::from_le_bytes([block[10], block[11]]),
            target_start_address: u32::from_le_bytes([block[12], block[13], block[14], block[15]]),
        })
    }
}

/// WriteFlash block: `[0:2] blockLength, [2] 0x02, [3:7] startAddress, [7:] payload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WriteCommand<'a> {
    pub start_address: u32,
    pub payload: &'a [u8],
}

impl WriteCommand<'_> {
    /// Encode as a complete block into `out`.
    pub fn encode<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<(), ProtocolError> {
        let body_len = WRITE_HEADER_SIZE + self.payload.len();
        let body_len = u16::try_from(body_len).map_err(|_| ProtocolError::Overflow)?;

        out.clear();
        out.extend_from_slice(&body_len.to_le_bytes())
            .map_err(|_| ProtocolError::Overflow)?;
        out.push(BlockType::WriteFlash as u8)
            .map_err(|_| ProtocolError::Overflow)?;
        out.extend_from_slice(&self.start_address.to_le_bytes())
            .map_err(|_| ProtocolError::Overflow)?;
        out.extend_from_slice(self.payload)
            .map_err(|_| ProtocolError::Overflow)
    }
}

/// A parsed command block. `blockLength` is informational and not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandBlock<'a> {
    Unlock(UnlockMetadata),
    WriteFlash(WriteCommand<'a>),
    /// Block type byte not understood by this client.
    Unknown(u8),
}

impl<'a> CommandBlock<'a> {
    pub fn parse(block: &'a [u8]) -> Result<Self, ProtocolError> {
        let Some(&block_type) = block.get(2) else {
            return Err(ProtocolError::Truncated);
        };

        match block_type {
            0x01 => UnlockMetadata::from_block(block)
                .map(CommandBlock::Unlock)
                .ok_or(ProtocolError::Truncated),
            0x02 => {
                let header = BLOCK_HEADER_SIZE + WRITE_HEADER_SIZE;
                let Some(addr) = block.get(BLOCK_HEADER_SIZE..header) else {
                    return Err(ProtocolError::Truncated);
                };
                Ok(CommandBlock::WriteFlash(WriteCommand {
                    start_address: u32::from_le_bytes([addr[0], addr[1], addr[2], addr[3]]),
                    payload: &block[header..],
                }))
            }
            other => Ok(CommandBlock::Unknown(other)),
        }
    }
}

// --- Request / response helpers ---

/// Build a request payload (before framing) into `out`.
pub fn encode_request<const N: usize>(
    sequence: SequenceByte,
    command: FtpCommand,
    data: &[u8],
    out: &mut Vec<u8, N>,
) -> Result<(), ProtocolError> {
    out.clear();
    out.push(sequence.to_byte())
        .map_err(|_| ProtocolError::Overflow)?;
    out.push(command as u8).map_err(|_| ProtocolError::Overflow)?;
    out.extend_from_slice(data)
        .map_err(|_| ProtocolError::Overflow)
}

/// A decoded response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Response<'a> {
    pub sequence: SequenceByte,
    /// Raw status byte; see [`ResponseStatus::from_byte`].
    pub status: u8,
    pub data: &'a [u8],
}

impl<'a> Response<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self, ProtocolError> {
        match payload {
            [seq, status, data @ ..] => Ok(Self {
                sequence: SequenceByte::from_byte(*seq),
                status: *status,
                data,
            }),
            _ => Err(ProtocolError::Truncated),
        }
    }

    pub fn status(&self) -> Option<ResponseStatus> {
        ResponseStatus::from_byte(self.status)
    }

    /// True for a retry request (retry bit set, command not executed).
    pub fn is_retry_request(&self) -> bool {
        self.sequence.retry && self.status() == Some(ResponseStatus::CommandNotExecuted)
    }
}
