// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! `embassy-time` driver over the free-running microsecond counter.
//!
//! The loader never awaits, so there are no alarms: `Delay` busy-waits on
//! `now()`.

use core::cell::Cell;
use core::ptr::read_volatile;

use critical_section::Mutex;
use embassy_time_driver::{AlarmHandle, Driver};

const TIMERUS_CNTR_1US: *const u32 = 0x6000_5010 as *const u32;

struct TimerUs {
    /// Last value handed out; its high word counts counter wraps.
    last: Mutex<Cell<u64>>,
}

impl Driver for TimerUs {
    fn now(&self) -> u64 {
        critical_section::with(|cs| {
            let last = self.last.borrow(cs);
            let count = unsafe { read_volatile(TIMERUS_CNTR_1US) };
            let prev = last.get();
            let mut high = prev >> 32;
            if count < prev as u32 {
                high += 1;
            }
            let now = high << 32 | u64::from(count);
            last.set(now);
            now
        })
    }

    unsafe fn allocate_alarm(&self) -> Option<AlarmHandle> {
        None
    }

    fn set_alarm_callback(&self, _alarm: AlarmHandle, _callback: fn(*mut ()), _ctx: *mut ()) {}

    fn set_alarm(&self, _alarm: AlarmHandle, _timestamp: u64) -> bool {
        false
    }
}

embassy_time_driver::time_driver_impl!(static DRIVER: TimerUs = TimerUs {
    last: Mutex::new(Cell::new(0)),
});
