// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Boot logic of the SD second-stage loader.
//!
//! Everything here talks to the hardware through the traits in [`hal`], so
//! the whole decision and update flow runs on a host under test. The board
//! crate supplies the real ports and carries out the [`Continuation`] the
//! [`Loader`] returns.
//!
//! Two things to keep in mind when deploying this:
//! - the staged payload is not authenticated in any way;
//! - the companion chip is polled without a timeout, so a chip that stops
//!   answering hangs the loader until the console is power cycled.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod boot;
pub mod display;
pub mod exit;
pub mod hal;
pub mod max77620;
pub mod modchip;
pub mod payload;
pub mod update;

pub use boot::{Board, BootConfig, Loader};
pub use exit::{Continuation, ExitDispatcher, ExitStatus};
pub use hal::FsError;
pub use payload::PayloadDescriptor;

#[cfg(test)]
mod tests;
