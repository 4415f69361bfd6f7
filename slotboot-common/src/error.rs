// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Result taxonomy of the update core.

use crate::config::ConfigError;
use crate::flash::FlashError;
use crate::link::LinkError;
use crate::protocol::AbortCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlError {
    #[error("invalid arguments")]
    InvalidArguments,
    #[error("image or metadata verification failed")]
    VerificationFailed,
    #[error("address out of range")]
    AddressOutOfRange,
    #[error("flash write failed")]
    CommandProcessing,
    #[error("unknown or unauthorized command")]
    UnknownCommand,
    #[error("command block too short")]
    BlockTooShort,
    #[error("payload larger than the write chunk")]
    PayloadTooLarge,
    #[error("image is not newer than the one it replaces")]
    RollbackFailure,
    #[error("erase failed")]
    EraseFailed,
    #[error("frame larger than the receive buffer")]
    BufferOverload,
    #[error("frame shorter than its header")]
    BufferUnderload,
    #[error("frame failed validation")]
    FrameValidation,
    #[error("link failure")]
    Communication,
    #[error("link: {0}")]
    Link(#[from] LinkError),
    #[error("flash: {0}")]
    Flash(#[from] FlashError),
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

impl BlError {
    /// Cause code reported to the host in an abort response.
    pub fn abort_code(&self) -> AbortCode {
        match self {
            BlError::VerificationFailed | BlError::UnknownCommand | BlError::BlockTooShort => {
                AbortCode::InvalidFile
            }
            BlError::AddressOutOfRange => AbortCode::AddressError,
            BlError::CommandProcessing => AbortCode::WriteError,
            BlError::EraseFailed => AbortCode::EraseError,
            BlError::RollbackFailure => AbortCode::AppVersionError,
            BlError::Flash(FlashError::Read) => AbortCode::ReadError,
            _ => AbortCode::Generic,
        }
    }
}
