// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Portable core of the slotboot firmware-update client.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std` mode for embedded targets
//! - `std` feature: Enables `std` support for host tools
//! - `defmt` / `log` features: Select the logging backend
//!
//! The device side is [`ftp::FtpEngine`] driving a [`link::Link`] and a
//! [`flash::FlashDevice`], plus [`boot::select_boot`] at start-up. The host
//! side reuses the wire types in [`protocol`] and the codec in [`frame`].

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// Must come first so the logging macros are visible to every module.
mod fmt;

pub mod boot;
pub mod command;
pub mod config;
pub mod copy;
pub mod error;
pub mod flash;
pub mod frame;
pub mod ftp;
pub mod image;
pub mod link;
pub mod protocol;
pub mod verify;

// Re-export commonly used types
pub use boot::{select_boot, BootDecision, BootOutcome, HoldReason, LoadResult};
pub use config::{BootConfig, ConfigError, FlashLayout, SentinelPolicy};
pub use error::BlError;
pub use flash::{FlashDevice, FlashError};
pub use ftp::{Activity, FtpEngine, RESET_DELAY_MS};
pub use image::Footer;
pub use link::{ComStatus, Link, LinkError};
pub use protocol::{AbortCode, FtpCommand, ImageState, ResponseStatus, TransportFailure};
