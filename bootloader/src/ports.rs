// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! The `sdloader` ports, backed by the hardware library.

use core::ffi::{c_uint, c_void};
use core::ptr;

use consts::FRAMEBUFFER_ADDR;
use defmt::{trace, warn};
use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use modchip_protocol::{Frame, CHANNEL_ARG, CHANNEL_OPCODE, FRAME_SIZE};
use sdloader::display::Panel;
use sdloader::hal::{ButtonState, Buttons, CommandChannel, File, FileInfo, FsError, Storage};
use sdloader::payload::MAX_PATH;

use crate::ffi::{self, FIL, FILINFO, FRESULT};

#[derive(Debug, defmt::Format)]
pub struct SdmmcError;

/// Companion chip link: single-block transfers on the eMMC controller,
/// under a command code the eMMC itself ignores.
pub struct SdmmcChannel {
    sdmmc: &'static mut ffi::sdmmc_t,
}

impl SdmmcChannel {
    pub fn new(sdmmc: &'static mut ffi::sdmmc_t) -> Self {
        let ok = unsafe {
            ffi::sdmmc_init(
                sdmmc,
                ffi::SDMMC_4,
                ffi::SDMMC_VOLTAGE_1V8,
                ffi::SDMMC_BUS_WIDTH_1BIT,
                ffi::SDMMC_SPEED_MMC_IDENT,
            )
        };
        if ok == 0 {
            warn!("eMMC controller init failed");
        }
        Self { sdmmc }
    }

    fn transfer(&mut self, data: *mut c_void, is_read: bool) -> Result<(), SdmmcError> {
        let mut cmd = ffi::sdmmc_command_t {
            opcode: CHANNEL_OPCODE.into(),
            arg: CHANNEL_ARG,
            resp: [0; 4],
            flags: ffi::SDMMC_RSP_R1,
        };
        let mut req = ffi::sdmmc_request_t {
            data,
            blksz: FRAME_SIZE as u32,
            num_blocks: 1,
            is_multi_block: false,
            is_read,
            is_auto_cmd12: false,
        };
        match unsafe { ffi::sdmmc_send_cmd(self.sdmmc, &mut cmd, &mut req, ptr::null_mut()) } {
            0 => Err(SdmmcError),
            _ => Ok(()),
        }
    }
}

impl CommandChannel for SdmmcChannel {
    type Error = SdmmcError;

    fn send(&mut self, frame: &Frame) -> Result<(), SdmmcError> {
        // Writes only read from the buffer.
        self.transfer(frame.as_bytes().as_ptr() as *mut c_void, false)
    }

    fn receive(&mut self, frame: &mut Frame) -> Result<(), SdmmcError> {
        self.transfer(frame.as_bytes_mut().as_mut_ptr().cast(), true)
    }

    fn finish(&mut self) {
        unsafe { ffi::sdmmc_finish(self.sdmmc) }
    }
}

const FR_INVALID_NAME: FRESULT = 6;

type CPath = heapless::Vec<u8, { MAX_PATH + 1 }>;

fn c_path(path: &str) -> Result<CPath, FsError> {
    let mut buf = CPath::new();
    buf.extend_from_slice(path.as_bytes())
        .map_err(|_| FsError::Io(FR_INVALID_NAME))?;
    buf.push(0).map_err(|_| FsError::Io(FR_INVALID_NAME))?;
    Ok(buf)
}

fn check(res: FRESULT) -> Result<(), FsError> {
    match res {
        ffi::FR_OK => Ok(()),
        ffi::FR_NO_FILE | ffi::FR_NO_PATH => Err(FsError::NotFound),
        ffi::FR_EXIST => Err(FsError::Exists),
        ffi::FR_DENIED => Err(FsError::Denied),
        ffi::FR_NOT_ENABLED | ffi::FR_NO_FILESYSTEM => Err(FsError::NotMounted),
        other => Err(FsError::Io(other)),
    }
}

/// The SD card through FatFs.
pub struct FatStorage;

impl Storage for FatStorage {
    type File = FatFile;

    fn mount(&mut self) -> Result<(), FsError> {
        if unsafe { ffi::mount_sd() } {
            Ok(())
        } else {
            Err(FsError::NotMounted)
        }
    }

    fn unmount(&mut self) {
        unsafe { ffi::unmount_sd() }
    }

    fn stat(&mut self, path: &str) -> Result<FileInfo, FsError> {
        let path = c_path(path)?;
        let mut info = FILINFO::zeroed();
        check(unsafe { ffi::f_stat(path.as_ptr().cast(), &mut info) })?;
        Ok(FileInfo { size: info.fsize })
    }

    fn open(&mut self, path: &str) -> Result<FatFile, FsError> {
        let size = self.stat(path)?.size;
        let path = c_path(path)?;
        let mut fil = FIL::zeroed();
        check(unsafe { ffi::f_open(&mut fil, path.as_ptr().cast(), ffi::FA_READ) })?;
        Ok(FatFile { fil, size })
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError> {
        let (from, to) = (c_path(from)?, c_path(to)?);
        check(unsafe { ffi::f_rename(from.as_ptr().cast(), to.as_ptr().cast()) })
    }

    fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        let path = c_path(path)?;
        check(unsafe { ffi::f_unlink(path.as_ptr().cast()) })
    }

    fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        let path = c_path(path)?;
        check(unsafe { ffi::f_mkdir(path.as_ptr().cast()) })
    }
}

pub struct FatFile {
    fil: FIL,
    size: u64,
}

impl File for FatFile {
    fn size(&self) -> u64 {
        self.size
    }

    fn seek(&mut self, pos: u64) -> Result<(), FsError> {
        check(unsafe { ffi::f_lseek(&mut self.fil, pos) })
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut read: c_uint = 0;
        check(unsafe { ffi::f_read(&mut self.fil, buf.as_mut_ptr().cast(), buf.len() as c_uint, &mut read) })?;
        Ok(read as usize)
    }
}

impl Drop for FatFile {
    fn drop(&mut self) {
        let res = unsafe { ffi::f_close(&mut self.fil) };
        if res != ffi::FR_OK {
            warn!("f_close failed: {}", res);
        }
    }
}

pub struct BtnReader;

impl Buttons for BtnReader {
    fn read(&mut self) -> ButtonState {
        ButtonState::from_bits_truncate(unsafe { ffi::btn_read() })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum I2cError {
    /// The library reported a failed transfer.
    Transfer,
    /// The library only does register writes and register reads.
    Unsupported,
}

impl i2c::Error for I2cError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Transfer => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Self::Unsupported => ErrorKind::Other,
        }
    }
}

/// The power I2C bus (I2C5) with the PMIC on it.
pub struct PowerI2c;

impl ErrorType for PowerI2c {
    type Error = I2cError;
}

impl I2c for PowerI2c {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), I2cError> {
        let ok = match operations {
            [Operation::Write([reg, data @ ..])] => unsafe {
                ffi::i2c_send(ffi::I2C_5, address, *reg, data.as_ptr().cast(), data.len())
            },
            [Operation::Write([reg]), Operation::Read(buf)] => unsafe {
                ffi::i2c_query(ffi::I2C_5, address, *reg, buf.as_mut_ptr().cast(), buf.len())
            },
            _ => return Err(I2cError::Unsupported),
        };
        trace!("i2c {=u8:#x}: {}", address, ok);
        if ok {
            Ok(())
        } else {
            Err(I2cError::Transfer)
        }
    }
}

/// The built-in panel, scanning out of SDRAM.
#[derive(Default)]
pub struct TegraPanel {
    sdram_up: bool,
}

impl Panel for TegraPanel {
    fn prepare(&mut self) {
        if !self.sdram_up {
            unsafe { ffi::sdram_init() };
            self.sdram_up = true;
        }
    }

    fn init(&mut self) {
        unsafe {
            ffi::display_init();
            ffi::display_init_framebuffer(FRAMEBUFFER_ADDR as *mut c_void);
        }
    }

    fn set_backlight(&mut self, on: bool) {
        unsafe { ffi::display_backlight(on) }
    }

    fn end(&mut self) {
        unsafe { ffi::display_end() }
    }
}
