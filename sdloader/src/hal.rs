// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ports the boot logic needs from the board. The loader binary backs them
//! with the external hardware library; tests back them with doubles.

use bitflags::bitflags;
use modchip_protocol::Frame;

bitflags! {
    /// Physical buttons, in the bit layout `btn_read()` reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ButtonState: u32 {
        const POWER = 1 << 0;
        const VOL_DOWN = 1 << 1;
        const VOL_UP = 1 << 2;
    }
}

impl ButtonState {
    pub fn both_volume(&self) -> bool {
        self.contains(Self::VOL_UP | Self::VOL_DOWN)
    }

    pub fn volume_up_only(&self) -> bool {
        self.contains(Self::VOL_UP) && !self.contains(Self::VOL_DOWN)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ButtonState {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "ButtonState({=u32:#x})", self.bits())
    }
}

pub trait Buttons {
    fn read(&mut self) -> ButtonState;
}

/// Block exchange with the companion chip over the eMMC controller.
pub trait CommandChannel {
    type Error: core::fmt::Debug;

    fn send(&mut self, frame: &Frame) -> Result<(), Self::Error>;

    fn receive(&mut self, frame: &mut Frame) -> Result<(), Self::Error>;

    /// Release the controller. Called before every terminal action.
    fn finish(&mut self);
}

/// Filesystem failures, as far as the boot logic cares to tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FsError {
    NotMounted,
    NotFound,
    Exists,
    Denied,
    /// Any other driver result code.
    Io(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FileInfo {
    pub size: u64,
}

/// An open file. Closed on drop.
pub trait File {
    fn size(&self) -> u64;

    fn seek(&mut self, pos: u64) -> Result<(), FsError>;

    /// Reads up to `buf.len()` bytes; fewer only at end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError>;
}

/// The removable SD card.
pub trait Storage {
    type File: File;

    fn mount(&mut self) -> Result<(), FsError>;

    fn unmount(&mut self);

    fn stat(&mut self, path: &str) -> Result<FileInfo, FsError>;

    fn open(&mut self, path: &str) -> Result<Self::File, FsError>;

    fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError>;

    fn unlink(&mut self, path: &str) -> Result<(), FsError>;

    fn mkdir(&mut self, path: &str) -> Result<(), FsError>;

    fn exists(&mut self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    /// Reads the whole of `path` into the start of `buf`, returning the
    /// number of bytes read.
    fn read_to(&mut self, path: &str, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut file = self.open(path)?;
        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }
}

/// Power management IC.
pub trait Pmic {
    type Error: core::fmt::Debug;

    /// Whether this power-on was caused by an RTC alarm.
    fn alarm_wake(&mut self) -> Result<bool, Self::Error>;

    /// Disarm every RTC alarm so the console does not wake again.
    fn stop_rtc_alarms(&mut self) -> Result<(), Self::Error>;

    /// Clear the soft-reset and alarm wake sources.
    fn disable_wake_events(&mut self) -> Result<(), Self::Error>;

    fn power_off(&mut self) -> Result<(), Self::Error>;
}
