// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host side of the transfer protocol: sequence numbering and ARQ.
//!
//! The first request carries the sync bit. A request is resent unchanged
//! when the reply times out (the client replays its cached response for a
//! duplicate) or when the client answers with a resend request. A resend
//! request for a bad sequence number is answered by resynchronising.
//!
//! Commands that erase or scan a whole slot (Unlock, GetImageState,
//! EndTransfer) wait for the command timeout the client advertised during
//! discovery, when that is longer than the session timeout.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, warn};

use slotboot_common::protocol::{
    next_sequence, AbortCode, ClientInfo, FtpCommand, ImageState, Response, ResponseStatus,
    SequenceByte, TransportFailure,
};

use crate::transport::FrameChannel;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// A successful reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: ResponseStatus,
    pub data: Vec<u8>,
}

pub struct Session<C> {
    channel: C,
    number: u8,
    synced: bool,
    timeout: Duration,
    /// Advertised by the client in its discovery response.
    command_timeout: Option<Duration>,
    max_retries: u32,
    /// Total resends over the session, for diagnostics.
    resends: u32,
}

impl<C: FrameChannel> Session<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            number: 0,
            synced: false,
            timeout: DEFAULT_TIMEOUT,
            command_timeout: None,
            max_retries: DEFAULT_MAX_RETRIES,
            resends: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn resends(&self) -> u32 {
        self.resends
    }

    pub fn channel(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Reply timeout for slow commands.
    pub fn long_timeout(&self) -> Duration {
        self.command_timeout
            .map_or(self.timeout, |advertised| advertised.max(self.timeout))
    }

    /// Send one command and wait for its reply.
    ///
    /// Fails on an abort or unsupported-command reply, or once the retry
    /// budget is spent.
    pub fn exchange(&mut self, command: FtpCommand, data: &[u8]) -> Result<Reply> {
        self.exchange_within(command, data, self.timeout)
    }

    fn exchange_within(
        &mut self,
        command: FtpCommand,
        data: &[u8],
        timeout: Duration,
    ) -> Result<Reply> {
        let mut sequence = SequenceByte {
            sync: !self.synced,
            retry: false,
            number: self.number,
        };
        let mut attempts = 0;

        loop {
            if attempts > self.max_retries {
                bail!("{:?}: no valid reply after {} attempts", command, attempts);
            }
            if attempts > 0 {
                self.resends += 1;
            }
            attempts += 1;

            let mut request = vec![sequence.to_byte(), command as u8];
            request.extend_from_slice(data);
            self.channel.send(&request)?;

            let Some(payload) = self.channel.receive(timeout)? else {
                debug!("{:?} #{}: timeout, resending", command, sequence.number);
                continue;
            };
            let response = match Response::parse(&payload) {
                Ok(response) => response,
                Err(err) => {
                    warn!("unparsable reply: {}", err);
                    continue;
                }
            };

            if response.is_retry_request() {
                let failure = response.data.first().copied().and_then(TransportFailure::from_byte);
                debug!("{:?} #{}: resend requested ({:?})", command, sequence.number, failure);
                if failure == Some(TransportFailure::InvalidSequenceNumber) {
                    sequence.sync = true;
                }
                continue;
            }
            if response.sequence.number != sequence.number {
                debug!(
                    "stale reply #{} while waiting for #{}",
                    response.sequence.number, sequence.number
                );
                continue;
            }

            self.synced = true;
            self.number = next_sequence(sequence.number);
            return Self::check_status(command, response);
        }
    }

    fn check_status(command: FtpCommand, response: Response<'_>) -> Result<Reply> {
        match response.status() {
            Some(ResponseStatus::Success) => Ok(Reply {
                status: ResponseStatus::Success,
                data: response.data.to_vec(),
            }),
            Some(ResponseStatus::AbortTransfer) => {
                let code = response.data.first().copied().and_then(AbortCode::from_byte);
                bail!("{:?} aborted by client: {:?}", command, code)
            }
            Some(status) => bail!("{:?} rejected: {:?}", command, status),
            None => bail!("{:?}: unknown status {:#04x}", command, response.status),
        }
    }

    pub fn client_info(&mut self) -> Result<ClientInfo> {
        let reply = self.exchange(FtpCommand::GetClientInfo, &[])?;
        let info = ClientInfo::decode(&reply.data).context("Malformed client info")?;
        if info.command_timeout > 0 {
            let advertised = Duration::from_millis(u64::from(info.command_timeout) * 100);
            debug!("client command timeout {:?}", advertised);
            self.command_timeout = Some(advertised);
        }
        Ok(info)
    }

    pub fn image_state(&mut self) -> Result<ImageState> {
        let reply = self.exchange_within(FtpCommand::GetImageState, &[], self.long_timeout())?;
        let Some(state) = reply.data.first().copied().and_then(ImageState::from_byte) else {
            bail!("Malformed image state reply {:02x?}", reply.data);
        };
        Ok(state)
    }

    pub fn start_transfer(&mut self) -> Result<()> {
        self.exchange(FtpCommand::StartTransfer, &[]).map(drop)
    }

    /// Send the Unlock block; the client erases the staging slot before it answers.
    pub fn unlock(&mut self, block: &[u8]) -> Result<()> {
        self.exchange_within(FtpCommand::WriteChunk, block, self.long_timeout())
            .map(drop)
    }

    pub fn write_chunk(&mut self, block: &[u8]) -> Result<()> {
        self.exchange(FtpCommand::WriteChunk, block).map(drop)
    }

    pub fn end_transfer(&mut self) -> Result<()> {
        self.exchange_within(FtpCommand::EndTransfer, &[], self.long_timeout())
            .map(drop)
    }
}
