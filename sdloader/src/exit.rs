// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::payload::{PayloadDescriptor, PayloadError};
use crate::update::UpdateError;

/// How a boot attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExitStatus {
    Success,
    StorageUnavailable,
    PayloadMissing,
    PayloadTooLarge,
    /// Both volume buttons held: boot the stock firmware.
    AlternateBoot,
    HandshakeFailed,
    OffsetFailed,
    ChunkReadFailed,
    ChunkRejected,
}

impl ExitStatus {
    /// Stable integer code, as reported to whatever runs after the loader.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::StorageUnavailable => -1,
            Self::PayloadMissing => -2,
            Self::PayloadTooLarge => -3,
            Self::HandshakeFailed => -4,
            Self::OffsetFailed => -5,
            Self::ChunkReadFailed => -6,
            Self::ChunkRejected => -7,
            Self::AlternateBoot => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<PayloadError> for ExitStatus {
    fn from(e: PayloadError) -> Self {
        match e {
            PayloadError::Missing => Self::PayloadMissing,
            PayloadError::TooLarge { .. } => Self::PayloadTooLarge,
        }
    }
}

impl From<UpdateError> for ExitStatus {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::HandshakeFailed => Self::HandshakeFailed,
            UpdateError::OffsetFailed => Self::OffsetFailed,
            UpdateError::ChunkReadFailed => Self::ChunkReadFailed,
            UpdateError::ChunkRejected(_) => Self::ChunkRejected,
        }
    }
}

/// What the board does once the loader logic has returned. The loader
/// never comes back from any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Continuation {
    /// Relocate the staged payload to the payload base and jump to it.
    Chainload(PayloadDescriptor),
    PowerOff,
    /// Clear the PMIC wake sources first, so an RTC alarm cannot bring the
    /// console straight back up.
    PowerOffNoWake,
    /// Reset through the panic path with this code in the scratch register.
    SafeHalt(u32),
}

pub struct ExitDispatcher;

impl ExitDispatcher {
    /// Chainload only on success with a staged payload; power off otherwise.
    pub fn dispatch(status: ExitStatus, payload: Option<PayloadDescriptor>) -> Continuation {
        match (status, payload) {
            (ExitStatus::Success, Some(payload)) => {
                info!("chainloading {} bytes from {:#x}", payload.size, payload.src_address);
                Continuation::Chainload(payload)
            }
            (status, _) => {
                info!("exit status {}, powering off", status.code());
                Continuation::PowerOff
            }
        }
    }
}
