// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! The boot decision: what the buttons, the SD card and the PMIC say about
//! where this boot goes next.

use consts::{MOUNT_RETRY_DELAY_MS, PANIC_CODE_BYPASS_FUSE};
use embedded_hal::delay::DelayNs;

use crate::display::{Display, Screen};
use crate::exit::{Continuation, ExitDispatcher, ExitStatus};
use crate::fmt::Dbg;
use crate::hal::{ButtonState, Buttons, CommandChannel, Pmic, Storage};
use crate::modchip::Modchip;
use crate::payload::{self, PayloadDescriptor};
use crate::update::{UpdateOutcome, Updater};

/// Which loader flavour this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootConfig {
    /// Run the companion firmware update before loading the payload.
    /// Also changes the button mapping: VOL_UP alone selects the alternate
    /// boot and there is no keep-awake.
    pub update_capable: bool,
}

impl BootConfig {
    pub const PRIMARY: Self = Self { update_capable: false };
    pub const UPDATE: Self = Self { update_capable: true };
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::PRIMARY
    }
}

/// Everything the loader drives.
pub struct Board<'a, S, C, P, B, D, T> {
    pub storage: S,
    pub modchip: Modchip<C>,
    pub pmic: P,
    pub buttons: B,
    pub display: D,
    pub delay: T,
    /// The staging region a payload is read into.
    pub staging: &'a mut [u8],
}

pub struct Loader<'a, S, C, P, B, D, T> {
    config: BootConfig,
    board: Board<'a, S, C, P, B, D, T>,
}

impl<'a, S, C, P, B, D, T> Loader<'a, S, C, P, B, D, T>
where
    S: Storage,
    C: CommandChannel,
    P: Pmic,
    B: Buttons,
    D: Display,
    T: DelayNs,
{
    pub fn new(config: BootConfig, board: Board<'a, S, C, P, B, D, T>) -> Self {
        Self { config, board }
    }

    pub fn board(&self) -> &Board<'a, S, C, P, B, D, T> {
        &self.board
    }

    pub fn into_board(self) -> Board<'a, S, C, P, B, D, T> {
        self.board
    }

    /// Makes the boot decision. Storage is unmounted and the companion
    /// channel released before any continuation is returned.
    pub fn run(&mut self) -> Continuation {
        let buttons = self.board.buttons.read();
        debug!("buttons at boot: {:?}", buttons);

        // Tells the chip the glitch worked.
        self.board.modchip.sleep();

        let mut status = None;
        if !self.mount() {
            status = Some(ExitStatus::StorageUnavailable);
        }

        if self.config.update_capable {
            if buttons.volume_up_only() {
                status = Some(ExitStatus::AlternateBoot);
            }
        } else {
            if buttons.both_volume() {
                status = Some(ExitStatus::AlternateBoot);
            }
            if buttons.volume_up_only() {
                info!("keeping companion awake");
            } else {
                self.board.modchip.sleep();
            }
        }

        if let Some(continuation) = self.wake_check() {
            return continuation;
        }

        let mut staged = None;
        let status = match status {
            Some(status) => status,
            None => {
                payload::migrate_legacy(&mut self.board.storage);

                if self.config.update_capable {
                    if let Some(continuation) = self.update() {
                        return continuation;
                    }
                }

                match payload::load(&mut self.board.storage, &mut self.board.staging[..]) {
                    Ok(descriptor) => {
                        staged = Some(descriptor);
                        ExitStatus::Success
                    }
                    Err(e) => {
                        warn!("payload not staged: {:?}", e);
                        e.into()
                    }
                }
            }
        };

        self.conclude(status, staged)
    }

    fn conclude(&mut self, status: ExitStatus, staged: Option<PayloadDescriptor>) -> Continuation {
        match status {
            ExitStatus::Success => {
                self.teardown();
                ExitDispatcher::dispatch(status, staged)
            }
            ExitStatus::AlternateBoot => {
                // The chip got its 0x55 before anything else happened.
                info!("alternate boot requested");
                self.safe_halt()
            }
            status => self.error_screen(status),
        }
    }

    /// Mounts the card, retrying once after a short wait.
    fn mount(&mut self) -> bool {
        if self.board.storage.mount().is_ok() {
            return true;
        }

        warn!("mount failed, retrying in {} ms", MOUNT_RETRY_DELAY_MS);
        self.board.delay.delay_ms(MOUNT_RETRY_DELAY_MS);

        match self.board.storage.mount() {
            Ok(()) => true,
            Err(e) => {
                error!("mount failed: {:?}", e);
                false
            }
        }
    }

    /// A power-on caused by an RTC alarm (the console's own scheduled wake)
    /// is turned straight back into a power off.
    fn wake_check(&mut self) -> Option<Continuation> {
        match self.board.pmic.alarm_wake() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!("cannot read wake source: {:?}", Dbg(&e));
                return None;
            }
        }

        info!("woken by RTC alarm, powering off");
        self.teardown();
        if let Err(e) = self.board.pmic.stop_rtc_alarms() {
            warn!("cannot stop RTC alarms: {:?}", Dbg(&e));
        }
        Some(Continuation::PowerOffNoWake)
    }

    /// Runs the companion update. `None` means nothing was updated and the
    /// boot carries on; otherwise the update result ends the boot.
    fn update(&mut self) -> Option<Continuation> {
        let outcome = Updater::new(
            &mut self.board.storage,
            &mut self.board.modchip,
            &mut self.board.display,
            &mut self.board.delay,
        )
        .run();

        let status = match outcome {
            UpdateOutcome::NoUpdateNeeded => return None,
            UpdateOutcome::Updated => ExitStatus::Success,
            UpdateOutcome::Failed(e) => e.into(),
        };

        self.board.display.set_backlight(false);
        self.board.display.shutdown();
        self.teardown();
        Some(ExitDispatcher::dispatch(status, None))
    }

    /// Shows what went wrong and waits for POWER. Both volume buttons
    /// instead take the alternate boot.
    fn error_screen(&mut self, status: ExitStatus) -> Continuation {
        let screen = match status {
            ExitStatus::StorageUnavailable => Screen::NoSd,
            ExitStatus::PayloadTooLarge => Screen::BigBin,
            _ => Screen::NoBin,
        };
        error!("boot failed: {:?}", status);

        self.board.display.show(screen);
        self.board.display.set_backlight(true);

        loop {
            let buttons = self.board.buttons.read();
            if buttons.contains(ButtonState::POWER) {
                break;
            }
            if buttons.both_volume() {
                info!("alternate boot requested from error screen");
                return self.safe_halt();
            }
        }

        self.board.display.set_backlight(false);
        self.board.display.shutdown();
        self.teardown();
        ExitDispatcher::dispatch(status, None)
    }

    fn safe_halt(&mut self) -> Continuation {
        self.teardown();
        Continuation::SafeHalt(PANIC_CODE_BYPASS_FUSE)
    }

    fn teardown(&mut self) {
        self.board.modchip.finish();
        self.board.storage.unmount();
    }
}
