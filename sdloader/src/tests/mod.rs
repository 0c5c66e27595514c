// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::{FIRMWARE_VERSION_OFFSET, STAGING_SIZE};

use self::mock::{FakeChip, Log, MockButtons, MockDelay, MockPmic, MockStorage, RecordingDisplay};
use crate::boot::Board;
use crate::hal::ButtonState;
use crate::modchip::Modchip;

mod mock;
mod update;

/// Polls allowed per exchange before a test gives up on the chip.
const POLL_LIMIT: u32 = 1000;

type TestBoard<'a> = Board<'a, MockStorage, FakeChip, MockPmic, MockButtons, RecordingDisplay, MockDelay>;

fn staging() -> Vec<u8> {
    vec![0; STAGING_SIZE]
}

fn board<'a>(
    log: &Log,
    storage: MockStorage,
    chip: FakeChip,
    buttons: impl IntoIterator<Item = ButtonState>,
    staging: &'a mut [u8],
) -> TestBoard<'a> {
    Board {
        storage,
        modchip: Modchip::with_attempt_limit(chip, POLL_LIMIT),
        pmic: MockPmic::new(log),
        buttons: MockButtons::new(buttons),
        display: RecordingDisplay::new(log),
        delay: MockDelay::default(),
        staging,
    }
}

/// A companion firmware image of `len` bytes carrying `version`.
fn firmware(version: u32, len: usize) -> Vec<u8> {
    let at = FIRMWARE_VERSION_OFFSET as usize;
    assert!(
        len >= at + 4,
        "a {len} byte image cannot carry a version at {at:#x}, use at least {} bytes",
        at + 4
    );
    let mut image: Vec<u8> = (0..len).map(|i| i as u8).collect();
    image[at..at + 4].copy_from_slice(&version.to_le_bytes());
    image
}
