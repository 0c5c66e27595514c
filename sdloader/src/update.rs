// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Companion chip firmware update.
//!
//! `firmware.bin` on the SD card is offered to the chip when its embedded
//! version is newer than what the chip reports, or when `.force_update`
//! exists. The image is streamed in 64-byte chunks; the chip acknowledges
//! each one before the next is sent.

use consts::{FIRMWARE_PATH, FIRMWARE_VERSION_OFFSET, FORCE_UPDATE_MARKER, UPDATE_RESULT_DWELL_MS};
use crc::{Crc, CRC_32_ISCSI};
use embedded_hal::delay::DelayNs;
use modchip_protocol::{Status, CHUNK_SIZE};

use crate::display::{Display, Screen};
use crate::hal::{CommandChannel, File, Storage};
use crate::modchip::Modchip;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateError {
    /// Handshake, update mode entry or PING went unanswered or failed.
    HandshakeFailed,
    /// The chip refused the SET_OFFSET command.
    OffsetFailed,
    /// The firmware image could not be read.
    ChunkReadFailed,
    /// The chip refused a chunk with this status.
    ChunkRejected(Status),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateOutcome {
    NoUpdateNeeded,
    Updated,
    Failed(UpdateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateState {
    Idle,
    Handshake,
    VersionCheck { companion: u32 },
    NoUpdateNeeded,
    Transfer,
    Done,
    Failed(UpdateError),
    Terminal(UpdateOutcome),
}

/// Integer transfer percentage. Never goes backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    total: u64,
    sent: u64,
    shown: Option<u8>,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            sent: 0,
            shown: None,
        }
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        // sent <= total, so this is at most 100
        (self.sent.min(self.total) * 100 / self.total) as u8
    }

    /// Counts `bytes` more as sent. Returns the percentage when it differs
    /// from the last one returned, which is when the bar needs a redraw.
    pub fn advance(&mut self, bytes: u64) -> Option<u8> {
        self.sent = self.sent.saturating_add(bytes).min(self.total);
        let percent = self.percent();
        if self.shown == Some(percent) {
            return None;
        }
        self.shown = Some(percent);
        Some(percent)
    }
}

pub struct Updater<'b, S, C, D, T> {
    storage: &'b mut S,
    modchip: &'b mut Modchip<C>,
    display: &'b mut D,
    delay: &'b mut T,
    state: UpdateState,
}

impl<'b, S, C, D, T> Updater<'b, S, C, D, T>
where
    S: Storage,
    C: CommandChannel,
    D: Display,
    T: DelayNs,
{
    pub fn new(storage: &'b mut S, modchip: &'b mut Modchip<C>, display: &'b mut D, delay: &'b mut T) -> Self {
        Self {
            storage,
            modchip,
            display,
            delay,
            state: UpdateState::Idle,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Runs to completion.
    pub fn run(mut self) -> UpdateOutcome {
        loop {
            if let UpdateState::Terminal(outcome) = self.step() {
                return outcome;
            }
        }
    }

    /// Performs the work of the current state and moves to the next one.
    pub fn step(&mut self) -> UpdateState {
        let next = match self.state {
            UpdateState::Idle => UpdateState::Handshake,
            UpdateState::Handshake => self.handshake(),
            UpdateState::VersionCheck { companion } => {
                if self.update_wanted(companion) {
                    UpdateState::Transfer
                } else {
                    UpdateState::NoUpdateNeeded
                }
            }
            UpdateState::NoUpdateNeeded => UpdateState::Terminal(UpdateOutcome::NoUpdateNeeded),
            UpdateState::Transfer => match self.transfer() {
                Ok(()) => UpdateState::Done,
                Err(e) => UpdateState::Failed(e),
            },
            UpdateState::Done => {
                if self.storage.exists(FORCE_UPDATE_MARKER) {
                    if let Err(e) = self.storage.unlink(FORCE_UPDATE_MARKER) {
                        warn!("cannot remove {}: {:?}", FORCE_UPDATE_MARKER, e);
                    }
                }
                info!("companion firmware updated");
                self.show_result(Screen::UpdateDone);
                UpdateState::Terminal(UpdateOutcome::Updated)
            }
            UpdateState::Failed(e) => {
                error!("companion update failed: {:?}", e);
                self.show_result(Screen::UpdateFailed);
                UpdateState::Terminal(UpdateOutcome::Failed(e))
            }
            UpdateState::Terminal(outcome) => UpdateState::Terminal(outcome),
        };

        trace!("update state {:?} -> {:?}", self.state, next);
        self.state = next;
        next
    }

    fn handshake(&mut self) -> UpdateState {
        self.modchip.frame_mut().encode_handshake();
        let reply = match self.modchip.transact(&mut *self.delay) {
            Ok(reply) => reply,
            Err(_) => return UpdateState::Failed(UpdateError::HandshakeFailed),
        };

        let status = reply.status();
        if !status.is_success() {
            warn!("handshake refused: {:?}", status);
            return UpdateState::Failed(UpdateError::HandshakeFailed);
        }

        let companion = reply.version();
        info!("companion firmware version {}", companion);
        UpdateState::VersionCheck { companion }
    }

    /// Any trouble reading the candidate image means no update.
    fn update_wanted(&mut self, companion: u32) -> bool {
        let candidate = match self.candidate_version() {
            Some(version) => version,
            None => {
                info!("no usable {}", FIRMWARE_PATH);
                return false;
            }
        };

        if self.storage.exists(FORCE_UPDATE_MARKER) {
            info!("update forced, candidate version {}", candidate);
            return true;
        }

        if candidate > companion {
            info!("candidate version {} is newer than {}", candidate, companion);
            true
        } else {
            debug!("candidate version {} is not newer than {}", candidate, companion);
            false
        }
    }

    fn candidate_version(&mut self) -> Option<u32> {
        let mut file = self.storage.open(FIRMWARE_PATH).ok()?;
        file.seek(FIRMWARE_VERSION_OFFSET).ok()?;

        let mut word = [0u8; 4];
        match file.read(&mut word) {
            Ok(4) => Some(u32::from_le_bytes(word)),
            _ => None,
        }
    }

    fn transfer(&mut self) -> Result<(), UpdateError> {
        let mut file = self.storage.open(FIRMWARE_PATH).map_err(|e| {
            warn!("cannot open {}: {:?}", FIRMWARE_PATH, e);
            UpdateError::ChunkReadFailed
        })?;
        let total = file.size();

        self.modchip.frame_mut().encode_update_mode();
        self.modchip
            .transact(&mut *self.delay)
            .map_err(|_| UpdateError::HandshakeFailed)?;

        self.modchip.frame_mut().encode_ping();
        let status = self
            .modchip
            .transact(&mut *self.delay)
            .map_err(|_| UpdateError::HandshakeFailed)?
            .status();
        if !status.is_success() {
            warn!("ping refused: {:?}", status);
            return Err(UpdateError::HandshakeFailed);
        }

        self.modchip.frame_mut().encode_set_offset(0);
        let status = self
            .modchip
            .transact(&mut *self.delay)
            .map_err(|_| UpdateError::OffsetFailed)?
            .status();
        if !status.is_success() {
            warn!("offset refused: {:?}", status);
            return Err(UpdateError::OffsetFailed);
        }

        info!("sending {} bytes of companion firmware", total);

        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let mut progress = Progress::new(total);
        if let Some(percent) = progress.advance(0) {
            self.display.show_progress(percent);
        }
        self.display.set_backlight(true);

        let mut remaining = total;
        let mut index: u32 = 0;
        while remaining > 0 {
            // Always a full chunk request; past the end of the image the
            // frame keeps whatever the previous chunk left there.
            let chunk = self.modchip.frame_mut().chunk_mut();
            let read = file.read(chunk).map_err(|e| {
                warn!("reading chunk {} failed: {:?}", index, e);
                UpdateError::ChunkReadFailed
            })?;
            if read == 0 {
                warn!("{} ended {} bytes early", FIRMWARE_PATH, remaining);
                return Err(UpdateError::ChunkReadFailed);
            }
            trace!("chunk {}: {} bytes, crc {:#x}", index, read, crc.checksum(&chunk[..read]));

            let status = match self.modchip.transact(&mut *self.delay) {
                Ok(reply) => reply.status(),
                // No reply: report whatever the last block said.
                Err(_) => return Err(UpdateError::ChunkRejected(self.modchip.frame().status())),
            };
            if !status.is_success() {
                warn!("chunk {} refused: {:?}", index, status);
                return Err(UpdateError::ChunkRejected(status));
            }

            let sent = remaining.min(CHUNK_SIZE as u64);
            remaining -= sent;
            index += 1;
            if let Some(percent) = progress.advance(sent) {
                self.display.show_progress(percent);
            }
        }

        Ok(())
    }

    fn show_result(&mut self, screen: Screen) {
        self.display.show(screen);
        self.display.set_backlight(true);
        self.delay.delay_ms(UPDATE_RESULT_DWELL_MS);
    }
}
