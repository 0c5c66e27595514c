// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

mod cs;
mod ffi;
mod platform;
mod ports;
mod time_driver;

#[cfg(feature = "debug")]
use defmt_rtt as _;

use core::arch::global_asm;
use core::ptr::{self, addr_of, addr_of_mut};

use consts::{FRAMEBUFFER_ADDR, PANIC_CODE_LOADER, STAGING_ADDR, STAGING_SIZE};
use defmt::info;
use sdloader::display::{Canvas, FramebufferDisplay};
use sdloader::max77620::Max77620;
use sdloader::modchip::Modchip;
use sdloader::{Board, BootConfig, Loader};
use static_cell::StaticCell;

use ports::{BtnReader, FatStorage, PowerI2c, SdmmcChannel, TegraPanel};

#[cfg(not(feature = "debug"))]
mod dummy_logging {
    #[defmt::global_logger]
    struct Logger;

    unsafe impl defmt::Logger for Logger {
        fn acquire() {}

        unsafe fn flush() {}

        unsafe fn release() {}

        unsafe fn write(_bytes: &[u8]) {}
    }
}

// Every mode gets the same stack with IRQ and FIQ masked; the loader ends
// up in SVC mode.
global_asm!(
    r#"
    .section .text.start, "ax"
    .global _start
    .arm
_start:
    mrs     r0, cpsr
    bic     r0, r0, #0x1f
    orr     r0, r0, #0xc0
    ldr     r2, =STACK_TOP
    orr     r1, r0, #0x12
    msr     cpsr_c, r1
    mov     sp, r2
    orr     r1, r0, #0x11
    msr     cpsr_c, r1
    mov     sp, r2
    orr     r1, r0, #0x17
    msr     cpsr_c, r1
    mov     sp, r2
    orr     r1, r0, #0x1b
    msr     cpsr_c, r1
    mov     sp, r2
    orr     r1, r0, #0x1f
    msr     cpsr_c, r1
    mov     sp, r2
    orr     r1, r0, #0x13
    msr     cpsr_c, r1
    mov     sp, r2
    bl      loader_init
    b       .
    .ltorg
"#
);

extern "C" {
    static mut __bss_start: u8;
    static mut __bss_end: u8;
    static __chainloader_lma: u8;
    static mut __chainloader_start: u8;
    static mut __chainloader_end: u8;
}

#[no_mangle]
unsafe extern "C" fn loader_init() -> ! {
    let start = addr_of_mut!(__bss_start);
    let len = addr_of!(__bss_end) as usize - start as usize;
    ptr::write_bytes(start, 0, len);

    // The relocator's window is free once the boot ROM has handed over.
    let dst = addr_of_mut!(__chainloader_start);
    let len = addr_of!(__chainloader_end) as usize - dst as usize;
    ptr::copy_nonoverlapping(addr_of!(__chainloader_lma), dst, len);

    main()
}

static EMMC: StaticCell<ffi::sdmmc_t> = StaticCell::new();

fn main() -> ! {
    unsafe {
        ffi::nx_hwinit();
        ffi::fuse_init();
    }
    info!("sdloader {}", env!("CARGO_PKG_VERSION"));

    let config = if cfg!(feature = "update-capable") {
        BootConfig::UPDATE
    } else {
        BootConfig::PRIMARY
    };

    let channel = SdmmcChannel::new(EMMC.init(ffi::sdmmc_t::zeroed()));

    // Neither region overlaps the image: the linker keeps the loader below
    // the staging area, and the framebuffer is in SDRAM.
    let staging = unsafe { core::slice::from_raw_parts_mut(STAGING_ADDR as *mut u8, STAGING_SIZE) };
    let fb = unsafe { core::slice::from_raw_parts_mut(FRAMEBUFFER_ADDR as *mut u32, Canvas::LEN) };

    let board = Board {
        storage: FatStorage,
        modchip: Modchip::new(channel),
        pmic: Max77620::new(PowerI2c),
        buttons: BtnReader,
        display: FramebufferDisplay::new(fb, TegraPanel::default()),
        delay: embassy_time::Delay,
        staging,
    };

    let mut loader = Loader::new(config, board);
    let continuation = loader.run();
    info!("exit: {}", continuation);

    let mut board = loader.into_board();
    platform::finish(continuation, &mut board.pmic)
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    defmt::error!("panic: {}", defmt::Display2Format(info));
    platform::safe_halt(PANIC_CODE_LOADER)
}
