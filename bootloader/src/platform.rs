// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! The terminal actions. None of these return.

use core::ptr::{read_volatile, write_volatile};

use consts::{PAYLOAD_BASE_ADDR, STAGING_ADDR};
use defmt::{error, info};
use sdloader::hal::Pmic;
use sdloader::max77620::Max77620;
use sdloader::{Continuation, PayloadDescriptor};

use crate::ports::PowerI2c;

const PMC_BASE: usize = 0x7000_E400;
const APBDEV_PMC_SCRATCH200: usize = 0x840;

const TMR_BASE: usize = 0x6000_5000;
const TIMER_TMR9_TMR_PTV: usize = 0x80;
const TIMER_WDT4_CONFIG: usize = 0x180;
const TIMER_WDT4_COMMAND: usize = 0x188;
const TIMER_WDT4_UNLOCK_PATTERN: usize = 0x18C;

const TIMER_EN: u32 = 1 << 31;
const TIMER_PER_EN: u32 = 1 << 30;
const TIMER_MAGIC_PTRN: u32 = 0xC45A;
const TIMER_START_CNT: u32 = 1 << 0;
const TIMER_PMCRESET_EN: u32 = 1 << 15;

const fn timer_src(tmr: u32) -> u32 {
    tmr & 0xF
}

const fn timer_per(per: u32) -> u32 {
    (per & 0xFF) << 4
}

unsafe fn write_reg(base: usize, offset: usize, val: u32) {
    write_volatile((base + offset) as *mut u32, val);
}

/// Carries out what the loader decided.
pub fn finish(continuation: Continuation, pmic: &mut Max77620<PowerI2c>) -> ! {
    match continuation {
        Continuation::Chainload(payload) => chainload(payload),
        Continuation::PowerOff => power_off(pmic),
        Continuation::PowerOffNoWake => {
            if let Err(e) = pmic.disable_wake_events() {
                error!("disabling wake events failed: {}", e);
            }
            power_off(pmic)
        }
        Continuation::SafeHalt(code) => safe_halt(code),
    }
}

fn power_off(pmic: &mut Max77620<PowerI2c>) -> ! {
    info!("powering off");
    if let Err(e) = pmic.power_off() {
        error!("power off failed: {}", e);
    }
    loop {
        core::hint::spin_loop();
    }
}

/// Leaves a code in PMC scratch for the next boot stage and resets through
/// watchdog 4.
pub fn safe_halt(code: u32) -> ! {
    unsafe {
        write_reg(PMC_BASE, APBDEV_PMC_SCRATCH200, code);
        write_reg(TMR_BASE, TIMER_WDT4_UNLOCK_PATTERN, TIMER_MAGIC_PTRN);
        write_reg(TMR_BASE, TIMER_TMR9_TMR_PTV, TIMER_EN | TIMER_PER_EN);
        write_reg(TMR_BASE, TIMER_WDT4_CONFIG, timer_src(9) | timer_per(1) | TIMER_PMCRESET_EN);
        write_reg(TMR_BASE, TIMER_WDT4_COMMAND, TIMER_START_CNT);
    }
    loop {
        core::hint::spin_loop();
    }
}

fn chainload(payload: PayloadDescriptor) -> ! {
    info!("chainloading {} bytes", payload.size);
    debug_assert_eq!(payload.src_address, STAGING_ADDR);
    let words = payload.size.div_ceil(4);
    unsafe {
        relocate(
            PAYLOAD_BASE_ADDR as *mut u32,
            payload.src_address as *const u32,
            words,
        )
    }
}

/// Copies the staged payload over the loader image and jumps to it.
///
/// Lives in `.chainloader`, which startup copies below the stack, since the
/// copy overwrites the code it would otherwise be running from. The regions
/// may overlap; the destination is lower, so a forward copy is safe.
///
/// # Safety
///
/// Never returns to the caller and destroys everything at the destination.
#[link_section = ".chainloader"]
#[inline(never)]
unsafe extern "C" fn relocate(dst: *mut u32, src: *const u32, words: usize) -> ! {
    // Volatile accesses keep the loop from turning into a memcpy call,
    // which would land in the overwritten image.
    let mut i = 0;
    while i < words {
        write_volatile(dst.add(i), read_volatile(src.add(i)));
        i += 1;
    }
    core::arch::asm!("bx {entry}", entry = in(reg) dst, options(noreturn))
}
