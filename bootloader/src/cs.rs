// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Single-core critical sections: mask IRQ and FIQ in the CPSR.

use core::arch::asm;

use critical_section::RawRestoreState;

struct CpsrCriticalSection;
critical_section::set_impl!(CpsrCriticalSection);

const CPSR_IRQ_FIQ: u32 = 0xC0;

unsafe impl critical_section::Impl for CpsrCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let cpsr: u32;
        asm!(
            "mrs {cpsr}, cpsr",
            "orr {tmp}, {cpsr}, {mask}",
            "msr cpsr_c, {tmp}",
            cpsr = out(reg) cpsr,
            tmp = out(reg) _,
            mask = in(reg) CPSR_IRQ_FIQ,
            options(nostack, preserves_flags),
        );
        cpsr
    }

    unsafe fn release(cpsr: RawRestoreState) {
        // Only restore the mask bits the matching acquire saw.
        if cpsr & CPSR_IRQ_FIQ != CPSR_IRQ_FIQ {
            asm!(
                "mrs {tmp}, cpsr",
                "bic {tmp}, {tmp}, {mask}",
                "orr {tmp}, {tmp}, {saved}",
                "msr cpsr_c, {tmp}",
                tmp = out(reg) _,
                mask = in(reg) CPSR_IRQ_FIQ,
                saved = in(reg) cpsr & CPSR_IRQ_FIQ,
                options(nostack, preserves_flags),
            );
        }
    }
}
