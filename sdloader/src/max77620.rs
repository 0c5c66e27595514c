// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! MAX77620 power management IC, as much of it as the loader touches.

use embedded_hal::i2c::I2c;

use crate::hal::Pmic;

/// Power/control block address.
pub const PWR_ADDR: u8 = 0x3C;
/// RTC block address.
pub const RTC_ADDR: u8 = 0x68;

pub const REG_IRQTOP: u8 = 0x05;
pub const IRQTOP_RTC: u8 = 1 << 3;

pub const REG_ONOFFCNFG1: u8 = 0x41;
pub const ONOFFCNFG1_PWR_OFF: u8 = 1 << 1;

pub const REG_ONOFFCNFG2: u8 = 0x42;
pub const ONOFFCNFG2_SFT_RST_WK: u8 = 1 << 7;
pub const ONOFFCNFG2_WK_ALARM1: u8 = 1 << 2;
pub const ONOFFCNFG2_WK_ALARM2: u8 = 1 << 1;

pub const RTC_REG_UPDATE0: u8 = 0x04;
pub const RTC_WRITE_UPDATE: u8 = 1 << 0;
pub const RTC_READ_UPDATE: u8 = 1 << 4;

/// ALARM1 seconds; ALARM1 and ALARM2 follow as 7 registers each.
pub const RTC_REG_ALARM1_SEC: u8 = 0x0E;
pub const RTC_ALARM_REGS: u8 = 7 * 2;
pub const RTC_ALARM_EN: u8 = 1 << 7;

pub struct Max77620<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Max77620<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_reg(&mut self, addr: u8, reg: u8) -> Result<u8, I2C::Error> {
        let mut val = [0];
        self.i2c.write_read(addr, &[reg], &mut val)?;
        Ok(val[0])
    }

    fn write_reg(&mut self, addr: u8, reg: u8, val: u8) -> Result<(), I2C::Error> {
        self.i2c.write(addr, &[reg, val])
    }
}

impl<I2C: I2c> Pmic for Max77620<I2C> {
    type Error = I2C::Error;

    fn alarm_wake(&mut self) -> Result<bool, Self::Error> {
        Ok(self.read_reg(PWR_ADDR, REG_IRQTOP)? & IRQTOP_RTC != 0)
    }

    fn stop_rtc_alarms(&mut self) -> Result<(), Self::Error> {
        // Latch the RTC clock into the registers, edit them, write them back.
        self.write_reg(RTC_ADDR, RTC_REG_UPDATE0, RTC_READ_UPDATE)?;

        for reg in RTC_REG_ALARM1_SEC..RTC_REG_ALARM1_SEC + RTC_ALARM_REGS {
            let val = self.read_reg(RTC_ADDR, reg)?;
            self.write_reg(RTC_ADDR, reg, val & !RTC_ALARM_EN)?;
        }

        self.write_reg(RTC_ADDR, RTC_REG_UPDATE0, RTC_WRITE_UPDATE)
    }

    fn disable_wake_events(&mut self) -> Result<(), Self::Error> {
        let val = self.read_reg(PWR_ADDR, REG_ONOFFCNFG2)?;
        let mask = ONOFFCNFG2_SFT_RST_WK | ONOFFCNFG2_WK_ALARM1 | ONOFFCNFG2_WK_ALARM2;
        self.write_reg(PWR_ADDR, REG_ONOFFCNFG2, val & !mask)
    }

    fn power_off(&mut self) -> Result<(), Self::Error> {
        self.write_reg(PWR_ADDR, REG_ONOFFCNFG1, ONOFFCNFG1_PWR_OFF)
    }
}
