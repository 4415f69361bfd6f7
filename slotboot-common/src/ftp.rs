// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Transfer protocol engine.
//!
//! One [`FtpEngine::task`] call is one poll-loop iteration: try to complete
//! a frame on the link, check its sequence number, dispatch it, and send at
//! most one frame back. The engine owns all session state; nothing lives in
//! statics.
//!
//! Two response buffers are kept. The response buffer holds the last normal
//! response and is replayed verbatim when the host repeats a frame, so a
//! repeated command is never executed twice. The retry buffer holds retry
//! requests (`next | RETRY`, [`ResponseStatus::CommandNotExecuted`], one
//! [`TransportFailure`] byte) and takes precedence when both are pending.

use heapless::Vec;

use crate::command::CommandProcessor;
use crate::config::BootConfig;
use crate::error::BlError;
use crate::flash::FlashDevice;
use crate::link::{ComStatus, Link};
use crate::protocol::{
    frame_size_for_chunk, next_sequence, ClientInfo, FtpCommand, ImageState, ResponseStatus,
    SequenceByte, TransportFailure, ALL_COMMANDS, FTP_HEADER_SIZE, MAX_FRAME_SIZE,
    MAX_RESPONSE_SIZE, MIN_REQUEST_SIZE, PROTOCOL_VERSION, RETRY_BIT,
};
use crate::verify::verify_staged_image;

/// Delay the binary waits between an acknowledged EndTransfer and reset.
pub const RESET_DELAY_MS: u32 = 14;

/// Sequence byte, status byte, one transport failure code.
const RETRY_RESPONSE_SIZE: usize = FTP_HEADER_SIZE + 1;

/// How a received sequence number relates to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceVerdict {
    /// New frame: execute it.
    Accept,
    /// Same number as the last executed frame: replay its response.
    Duplicate,
    /// Anything else: ask the host to resend from `next`.
    OutOfSequence,
}

/// Sequence numbers of the session, all modulo 64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceState {
    last: u8,
    current: u8,
    next: u8,
}

impl Default for SequenceState {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceState {
    pub const fn new() -> Self {
        Self {
            last: 0,
            current: 0,
            next: 1,
        }
    }

    /// Classify the sequence byte of a received frame and advance on accept.
    ///
    /// A sync frame is always accepted and resynchronizes the session.
    pub fn validate(&mut self, sequence: SequenceByte) -> SequenceVerdict {
        self.current = sequence.number;

        if sequence.sync || self.current == self.next {
            self.last = self.current;
            self.next = next_sequence(self.current);
            SequenceVerdict::Accept
        } else if self.current == self.last {
            SequenceVerdict::Duplicate
        } else {
            SequenceVerdict::OutOfSequence
        }
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    pub fn next(&self) -> u8 {
        self.next
    }
}

/// Where the engine is within one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineState {
    Idle,
    FrameReceived,
    Dispatching,
    ResponsePending,
}

/// What a successful iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activity {
    /// Nothing complete on the link.
    Idle,
    /// A frame was handled and a response sent.
    Responded,
    /// EndTransfer was acknowledged and the link is idle. The caller waits
    /// [`RESET_DELAY_MS`] and resets the device.
    ResetRequested,
}

/// The transfer protocol engine, generic over link and flash device.
pub struct FtpEngine<L, F> {
    link: L,
    flash: F,
    config: BootConfig,
    processor: CommandProcessor,
    sequence: SequenceState,
    state: EngineState,
    rx: [u8; MAX_FRAME_SIZE],
    response: Vec<u8, MAX_RESPONSE_SIZE>,
    retry: Vec<u8, RETRY_RESPONSE_SIZE>,
    resend_required: bool,
    response_required: bool,
    reset_pending: bool,
    link_busy: bool,
}

impl<L: Link, F: FlashDevice> FtpEngine<L, F> {
    /// Check `config` against the flash device and size the link for it.
    pub fn new(mut link: L, flash: F, config: BootConfig) -> Result<Self, BlError> {
        config.validate_for_device(F::PAGE_SIZE, F::ROW_SIZE)?;
        link.initialize(frame_size_for_chunk(config.write_chunk_size as usize))?;

        info!(
            "transfer engine ready, chunk {} bytes, staging slot {}",
            config.write_chunk_size,
            config.layout.staging_slot
        );

        Ok(Self {
            link,
            flash,
            config,
            processor: CommandProcessor::new(),
            sequence: SequenceState::new(),
            state: EngineState::Idle,
            rx: [0u8; MAX_FRAME_SIZE],
            response: Vec::new(),
            retry: Vec::new(),
            resend_required: false,
            response_required: false,
            reset_pending: false,
            link_busy: false,
        })
    }

    /// Run one poll-loop iteration.
    ///
    /// Errors describe what went wrong with the frame just handled. The
    /// host has already been answered, so the caller logs and keeps polling.
    pub fn task(&mut self) -> Result<Activity, BlError> {
        if self.reset_pending && !self.link_busy {
            return Ok(Activity::ResetRequested);
        }

        let outcome = match self.link.poll_frame(&mut self.rx) {
            ComStatus::Busy => Ok(Activity::Idle),
            ComStatus::Frame(len) => {
                self.state = EngineState::FrameReceived;
                self.on_frame(len).map(|_| Activity::Responded)
            }
            ComStatus::BufferError => {
                self.request_resend(TransportFailure::CommandTooLong);
                Err(BlError::BufferOverload)
            }
            ComStatus::TransportFailure => {
                self.request_resend(TransportFailure::IntegrityCheck);
                Err(BlError::FrameValidation)
            }
            ComStatus::SendComplete => {
                self.link_busy = false;
                Ok(Activity::Idle)
            }
            ComStatus::Fail => Err(BlError::Communication),
        };

        let sent = self.flush();
        self.state = EngineState::Idle;
        sent?;
        outcome
    }

    fn on_frame(&mut self, len: usize) -> Result<(), BlError> {
        if len < MIN_REQUEST_SIZE {
            self.request_resend(TransportFailure::CommandTooShort);
            return Err(BlError::BufferUnderload);
        }

        let sequence = SequenceByte::from_byte(self.rx[0]);
        match self.sequence.validate(sequence) {
            SequenceVerdict::Accept => {
                self.state = EngineState::Dispatching;
                let result = self.dispatch(self.rx[1], len);
                self.response_required = true;
                result
            }
            SequenceVerdict::Duplicate if !self.response.is_empty() => {
                debug!("duplicate frame {}, replaying response", sequence.number);
                self.response_required = true;
                Ok(())
            }
            SequenceVerdict::Duplicate | SequenceVerdict::OutOfSequence => {
                debug!(
                    "frame {} out of sequence, expected {}",
                    sequence.number,
                    self.sequence.next()
                );
                self.request_resend(TransportFailure::InvalidSequenceNumber);
                Err(BlError::FrameValidation)
            }
        }
    }

    fn dispatch(&mut self, command: u8, len: usize) -> Result<(), BlError> {
        let number = self.sequence.current();

        let Some(command) = FtpCommand::from_byte(command) else {
            warn!("unsupported command {:#x}", command);
            self.respond(number, ResponseStatus::CommandNotSupported, &[])?;
            return Err(BlError::UnknownCommand);
        };
        trace!("frame {}: {:?}", number, command);

        match command {
            FtpCommand::GetClientInfo => {
                let mut body: Vec<u8, { ClientInfo::ENCODED_SIZE }> = Vec::new();
                self.client_info()
                    .encode(&mut body)
                    .map_err(|_| BlError::BufferOverload)?;
                self.respond(number, ResponseStatus::Success, &body)
            }
            FtpCommand::StartTransfer => {
                info!("transfer started");
                self.processor.initialize();
                self.respond(number, ResponseStatus::Success, &[])
            }
            FtpCommand::WriteChunk => {
                let block = &self.rx[FTP_HEADER_SIZE..len];
                match self
                    .processor
                    .process_block(&mut self.flash, &self.config, block)
                {
                    Ok(()) => self.respond(number, ResponseStatus::Success, &[]),
                    Err(err) => {
                        warn!("chunk {} rejected: {:?}", number, err);
                        let code = err.abort_code() as u8;
                        self.respond(number, ResponseStatus::AbortTransfer, &[code])?;
                        Err(err)
                    }
                }
            }
            FtpCommand::GetImageState => {
                let state = match verify_staged_image(&mut self.flash, &self.config) {
                    Ok(()) => ImageState::Valid,
                    Err(err) => {
                        info!("staged image invalid: {:?}", err);
                        ImageState::Invalid
                    }
                };
                self.respond(number, ResponseStatus::Success, &[state as u8])
            }
            FtpCommand::EndTransfer => {
                info!("transfer complete, reset pending");
                self.respond(number, ResponseStatus::Success, &[])?;
                self.reset_pending = true;
                if L::MULTI_STAGE_RESPONSE {
                    self.link_busy = true;
                }
                Ok(())
            }
        }
    }

    fn client_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: PROTOCOL_VERSION,
            max_payload_size: self.config.write_chunk_size,
            buffer_count: 1,
            timeout_command: ALL_COMMANDS,
            command_timeout: self.config.advisory.command_timeout,
            inter_message_delay: self.config.advisory.inter_message_delay,
        }
    }

    fn respond(&mut self, number: u8, status: ResponseStatus, data: &[u8]) -> Result<(), BlError> {
        self.response.clear();
        self.response
            .push(number)
            .and_then(|_| self.response.push(status as u8))
            .map_err(|_| BlError::BufferOverload)?;
        self.response
            .extend_from_slice(data)
            .map_err(|_| BlError::BufferOverload)
    }

    fn request_resend(&mut self, failure: TransportFailure) {
        self.retry.clear();
        // Three bytes always fit RETRY_RESPONSE_SIZE.
        let _ = self.retry.extend_from_slice(&[
            self.sequence.next() | RETRY_BIT,
            ResponseStatus::CommandNotExecuted as u8,
            failure as u8,
        ]);
        self.resend_required = true;
    }

    /// Send at most one pending frame; a resend request wins.
    fn flush(&mut self) -> Result<(), BlError> {
        if !self.resend_required && !self.response_required {
            return Ok(());
        }
        self.state = EngineState::ResponsePending;

        let frame: &[u8] = if self.resend_required {
            &self.retry
        } else {
            &self.response
        };
        let sent = self.link.send_frame(frame);

        self.resend_required = false;
        self.response_required = false;
        sent.map_err(|err| {
            error!("response not sent: {:?}", err);
            BlError::Link(err)
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn sequence(&self) -> &SequenceState {
        &self.sequence
    }

    pub fn is_unlocked(&self) -> bool {
        self.processor.is_unlocked()
    }

    pub fn is_reset_pending(&self) -> bool {
        self.reset_pending
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn link(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn flash(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Give back the link and flash device.
    pub fn release(self) -> (L, F) {
        (self.link, self.flash)
    }
}
