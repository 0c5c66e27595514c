// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Bindings to the hardware library the loader links against: clock and
//! pinmux bring-up, SDMMC, FatFs, I2C, buttons and the display controller.
//!
//! Struct layouts follow the library headers as built with exFAT and long
//! file names enabled.

#![allow(non_camel_case_types)]

use core::ffi::{c_char, c_int, c_uint, c_void};

/// Opaque `sdmmc_t`. Only ever handled by pointer; sized generously.
#[repr(C, align(8))]
pub struct sdmmc_t {
    _opaque: [u8; 512],
}

impl sdmmc_t {
    pub const fn zeroed() -> Self {
        Self { _opaque: [0; 512] }
    }
}

#[repr(C)]
pub struct sdmmc_command_t {
    pub opcode: u32,
    pub arg: u32,
    pub resp: [u32; 4],
    pub flags: u32,
}

#[repr(C)]
pub struct sdmmc_request_t {
    pub data: *mut c_void,
    pub blksz: u32,
    pub num_blocks: u32,
    pub is_multi_block: bool,
    pub is_read: bool,
    pub is_auto_cmd12: bool,
}

pub const SDMMC_4: c_uint = 3;
pub const SDMMC_VOLTAGE_1V8: c_uint = 1;
pub const SDMMC_BUS_WIDTH_1BIT: c_uint = 0;
pub const SDMMC_SPEED_MMC_IDENT: c_uint = 0;

pub const SDMMC_RSP_PRESENT: u32 = 1 << 0;
pub const SDMMC_RSP_CRC: u32 = 1 << 2;
pub const SDMMC_RSP_OPCODE: u32 = 1 << 4;
pub const SDMMC_RSP_R1: u32 = SDMMC_RSP_PRESENT | SDMMC_RSP_CRC | SDMMC_RSP_OPCODE;

pub type FRESULT = c_uint;
pub const FR_OK: FRESULT = 0;
pub const FR_NO_FILE: FRESULT = 4;
pub const FR_NO_PATH: FRESULT = 5;
pub const FR_DENIED: FRESULT = 7;
pub const FR_EXIST: FRESULT = 8;
pub const FR_NOT_ENABLED: FRESULT = 12;
pub const FR_NO_FILESYSTEM: FRESULT = 13;

pub const FA_READ: u8 = 0x01;

#[repr(C)]
pub struct FILINFO {
    pub fsize: u64,
    pub fdate: u16,
    pub ftime: u16,
    pub fattrib: u8,
    pub altname: [c_char; 13],
    pub fname: [c_char; 256],
}

impl FILINFO {
    pub const fn zeroed() -> Self {
        Self {
            fsize: 0,
            fdate: 0,
            ftime: 0,
            fattrib: 0,
            altname: [0; 13],
            fname: [0; 256],
        }
    }
}

/// Opaque `FIL`, including its sector buffer.
#[repr(C, align(8))]
pub struct FIL {
    _opaque: [u8; 768],
}

impl FIL {
    pub const fn zeroed() -> Self {
        Self { _opaque: [0; 768] }
    }
}

pub const I2C_5: c_uint = 4;

extern "C" {
    pub fn nx_hwinit();
    pub fn fuse_init();
    pub fn sdram_init();

    pub fn sdmmc_init(sdmmc: *mut sdmmc_t, controller: c_uint, voltage: c_uint, width: c_uint, speed: c_uint) -> c_int;
    pub fn sdmmc_send_cmd(
        sdmmc: *mut sdmmc_t,
        cmd: *mut sdmmc_command_t,
        req: *mut sdmmc_request_t,
        num_blocks_out: *mut u32,
    ) -> c_int;
    pub fn sdmmc_finish(sdmmc: *mut sdmmc_t);

    pub fn mount_sd() -> bool;
    pub fn unmount_sd();

    pub fn f_stat(path: *const c_char, fno: *mut FILINFO) -> FRESULT;
    pub fn f_open(fp: *mut FIL, path: *const c_char, mode: u8) -> FRESULT;
    pub fn f_close(fp: *mut FIL) -> FRESULT;
    pub fn f_lseek(fp: *mut FIL, ofs: u64) -> FRESULT;
    pub fn f_read(fp: *mut FIL, buff: *mut c_void, btr: c_uint, br: *mut c_uint) -> FRESULT;
    pub fn f_rename(old: *const c_char, new: *const c_char) -> FRESULT;
    pub fn f_unlink(path: *const c_char) -> FRESULT;
    pub fn f_mkdir(path: *const c_char) -> FRESULT;

    pub fn i2c_send(device: c_uint, addr: u8, reg: u8, src: *const c_void, len: usize) -> bool;
    pub fn i2c_query(device: c_uint, addr: u8, reg: u8, dst: *mut c_void, len: usize) -> bool;

    pub fn btn_read() -> u32;

    pub fn display_init();
    pub fn display_init_framebuffer(fb: *mut c_void);
    pub fn display_backlight(enable: bool);
    pub fn display_end();
}
