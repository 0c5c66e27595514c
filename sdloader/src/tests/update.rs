// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::{FIRMWARE_PATH, FORCE_UPDATE_MARKER, PANIC_CODE_BYPASS_FUSE, UPDATE_RESULT_DWELL_MS};
use modchip_protocol::{tag, Status, CHUNK_SIZE};

use super::mock::{Event, FakeChip, Log, MockDelay, MockStorage, RecordingDisplay};
use super::{board, firmware, staging, POLL_LIMIT};
use crate::boot::{BootConfig, Loader};
use crate::display::Screen;
use crate::exit::Continuation;
use crate::hal::ButtonState;
use crate::modchip::{Modchip, ModchipError};
use crate::update::{Progress, UpdateError, UpdateOutcome, UpdateState, Updater};

/// Everything an [`Updater`] borrows, owned in one place.
struct Rig {
    log: Log,
    storage: MockStorage,
    modchip: Modchip<FakeChip>,
    display: RecordingDisplay,
    delay: MockDelay,
}

impl Rig {
    fn new(companion: u32) -> Self {
        let log = Log::default();
        let mut storage = MockStorage::new(&log);
        storage.mounted = true;
        let mut chip = FakeChip::new(&log);
        chip.version = companion;
        Self {
            storage,
            modchip: Modchip::with_attempt_limit(chip, POLL_LIMIT),
            display: RecordingDisplay::new(&log),
            delay: MockDelay::default(),
            log,
        }
    }

    fn chip(&mut self) -> &mut FakeChip {
        self.modchip.channel_mut()
    }

    fn updater(&mut self) -> Updater<'_, MockStorage, FakeChip, RecordingDisplay, MockDelay> {
        Updater::new(&mut self.storage, &mut self.modchip, &mut self.display, &mut self.delay)
    }

    fn run(&mut self) -> UpdateOutcome {
        self.updater().run()
    }

    fn progress(&self) -> Vec<u8> {
        self.log
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(percent) => Some(percent),
                _ => None,
            })
            .collect()
    }
}

/// Candidate 5 over companion 3, ten clean chunks: done, marker gone.
#[test]
fn newer_firmware_is_sent() {
    let mut rig = Rig::new(3);
    let image = firmware(5, 10 * CHUNK_SIZE);
    rig.storage.files.insert(FIRMWARE_PATH.into(), image.clone());
    rig.storage.files.insert(FORCE_UPDATE_MARKER.into(), Vec::new());

    assert_eq!(rig.run(), UpdateOutcome::Updated);

    let chunks = &rig.modchip.channel().chunks;
    assert_eq!(chunks.len(), 10);
    assert_eq!(chunks.concat(), image);
    assert_eq!(
        rig.log.sent()[..3],
        [tag::HANDSHAKE, tag::UPDATE_MODE, tag::PING]
    );
    assert_eq!(rig.log.sent()[3], tag::SET_OFFSET);
    assert_eq!(rig.log.count(|e| *e == Event::Show(Screen::UpdateDone)), 1);
    assert!(!rig.storage.files.contains_key(FORCE_UPDATE_MARKER));
    assert!(rig.delay.total_ms() >= u64::from(UPDATE_RESULT_DWELL_MS));
}

/// Same or older firmware on the card is left alone.
#[test]
fn same_version_is_not_sent() {
    let mut rig = Rig::new(5);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(5, 6 * CHUNK_SIZE));

    assert_eq!(rig.run(), UpdateOutcome::NoUpdateNeeded);
    assert_eq!(rig.log.sent(), [tag::HANDSHAKE]);
    assert_eq!(rig.log.count(|e| matches!(e, Event::Show(_) | Event::Progress(_))), 0);
}

/// The force marker overrides the version comparison.
#[test]
fn marker_forces_update() {
    let mut rig = Rig::new(9);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(2, 6 * CHUNK_SIZE));
    rig.storage.files.insert(FORCE_UPDATE_MARKER.into(), Vec::new());

    assert_eq!(rig.run(), UpdateOutcome::Updated);
    assert_eq!(rig.modchip.channel().chunks.len(), 6);
}

/// Once updated, the same card does not trigger a second update.
#[test]
fn update_is_idempotent() {
    let mut rig = Rig::new(3);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(5, 6 * CHUNK_SIZE));
    rig.storage.files.insert(FORCE_UPDATE_MARKER.into(), Vec::new());
    assert_eq!(rig.run(), UpdateOutcome::Updated);

    rig.chip().version = 5;
    assert_eq!(rig.run(), UpdateOutcome::NoUpdateNeeded);
    assert_eq!(rig.modchip.channel().chunks.len(), 6);
}

/// A missing, truncated or unreadable image means no update.
#[test]
fn unusable_candidate_means_no_update() {
    let mut rig = Rig::new(0);
    assert_eq!(rig.run(), UpdateOutcome::NoUpdateNeeded);

    let mut rig = Rig::new(0);
    rig.storage.files.insert(FIRMWARE_PATH.into(), vec![0xFF; 0x152]);
    assert_eq!(rig.run(), UpdateOutcome::NoUpdateNeeded);

    let mut rig = Rig::new(0);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(5, 6 * CHUNK_SIZE));
    rig.storage.broken.insert(FIRMWARE_PATH.into(), 0);
    assert_eq!(rig.run(), UpdateOutcome::NoUpdateNeeded);
}

/// A rejected chunk ends the transfer there; the marker stays for a retry.
#[test]
fn rejected_chunk_aborts_transfer() {
    let mut rig = Rig::new(3);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(5, 10 * CHUNK_SIZE));
    rig.storage.files.insert(FORCE_UPDATE_MARKER.into(), Vec::new());
    rig.chip().reject_chunk = Some((4, Status::FlashFailed));

    assert_eq!(
        rig.run(),
        UpdateOutcome::Failed(UpdateError::ChunkRejected(Status::FlashFailed))
    );
    // Chunks 0..=4 went out, nothing after the refused one.
    assert_eq!(rig.modchip.channel().chunks.len(), 5);
    assert!(rig.storage.files.contains_key(FORCE_UPDATE_MARKER));
    assert_eq!(rig.log.count(|e| *e == Event::Show(Screen::UpdateFailed)), 1);
    assert!(rig.delay.total_ms() >= u64::from(UPDATE_RESULT_DWELL_MS));
}

#[test]
fn refused_handshake_fails() {
    let mut rig = Rig::new(3);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(5, 6 * CHUNK_SIZE));
    rig.chip().handshake_status = Status::Unimplemented;

    assert_eq!(rig.run(), UpdateOutcome::Failed(UpdateError::HandshakeFailed));
    assert_eq!(rig.log.sent(), [tag::HANDSHAKE]);
}

#[test]
fn refused_ping_fails() {
    let mut rig = Rig::new(3);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(5, 6 * CHUNK_SIZE));
    rig.chip().ping_status = Status::InvalidLength;

    assert_eq!(rig.run(), UpdateOutcome::Failed(UpdateError::HandshakeFailed));
}

#[test]
fn refused_offset_fails() {
    let mut rig = Rig::new(3);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(5, 6 * CHUNK_SIZE));
    rig.chip().offset_status = Status::InvalidOffset;

    assert_eq!(rig.run(), UpdateOutcome::Failed(UpdateError::OffsetFailed));
    assert!(rig.modchip.channel().chunks.is_empty());
}

/// The image becomes unreadable halfway through the transfer.
#[test]
fn unreadable_chunk_fails() {
    let mut rig = Rig::new(3);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(5, 10 * CHUNK_SIZE));
    rig.storage.broken.insert(FIRMWARE_PATH.into(), 0x180);

    assert_eq!(rig.run(), UpdateOutcome::Failed(UpdateError::ChunkReadFailed));
    assert_eq!(rig.modchip.channel().chunks.len(), 6);
}

/// The last chunk is requested in full; bytes past the end of the image
/// are whatever the previous chunk left in the frame.
#[test]
fn short_final_chunk_keeps_stale_bytes() {
    let mut rig = Rig::new(3);
    let image = firmware(5, 6 * CHUNK_SIZE + 10);
    rig.storage.files.insert(FIRMWARE_PATH.into(), image.clone());

    assert_eq!(rig.run(), UpdateOutcome::Updated);

    let chunks = &rig.modchip.channel().chunks;
    assert_eq!(chunks.len(), 7);
    assert_eq!(chunks[6][..10], image[6 * CHUNK_SIZE..]);
    assert_eq!(chunks[6][10..], chunks[5][10..]);
}

/// The bar is drawn once per distinct percentage, never backwards.
#[test]
fn progress_redraws_on_change_only() {
    let mut rig = Rig::new(3);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(5, 300 * CHUNK_SIZE));

    assert_eq!(rig.run(), UpdateOutcome::Updated);

    let progress = rig.progress();
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(progress.len(), 101);
}

#[test]
fn progress_tracker() {
    let mut progress = Progress::new(3 * CHUNK_SIZE as u64);
    assert_eq!(progress.advance(0), Some(0));
    assert_eq!(progress.advance(0), None);
    assert_eq!(progress.advance(CHUNK_SIZE as u64), Some(33));
    assert_eq!(progress.advance(CHUNK_SIZE as u64), Some(66));
    assert_eq!(progress.advance(u64::MAX), Some(100));
    assert_eq!(progress.percent(), 100);
    assert_eq!(progress.advance(1), None);

    assert_eq!(Progress::new(0).percent(), 100);
}

/// Replies are recognised by the complemented tag alone; blocks one off
/// from it are polled past.
#[test]
fn near_miss_replies_are_skipped() {
    let mut rig = Rig::new(3);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(5, 6 * CHUNK_SIZE));
    rig.chip().near_misses = true;
    rig.chip().busy_polls = 3;

    assert_eq!(rig.run(), UpdateOutcome::Updated);
    // Handshake, mode, ping, offset and six chunks, six polls each.
    assert_eq!(rig.modchip.channel().polls, 10 * 6);
}

#[test]
fn silent_chip_gives_up_with_limit() {
    let log = Log::default();
    let mut chip = FakeChip::new(&log);
    chip.silent = true;
    let mut modchip = Modchip::with_attempt_limit(chip, 25);
    let mut delay = MockDelay::default();

    modchip.frame_mut().encode_handshake();
    assert_eq!(
        modchip.transact(&mut delay).map(|_| ()),
        Err(ModchipError::NoResponse { attempts: 25 })
    );
    assert_eq!(delay.total_ms(), 25 * 10);
}

#[test]
fn states_in_order() {
    let mut rig = Rig::new(1);
    rig.storage.files.insert(FIRMWARE_PATH.into(), firmware(2, 6 * CHUNK_SIZE));

    let mut updater = rig.updater();
    assert_eq!(updater.state(), UpdateState::Idle);
    assert_eq!(updater.step(), UpdateState::Handshake);
    assert_eq!(updater.step(), UpdateState::VersionCheck { companion: 1 });
    assert_eq!(updater.step(), UpdateState::Transfer);
    assert_eq!(updater.step(), UpdateState::Done);
    assert_eq!(updater.step(), UpdateState::Terminal(UpdateOutcome::Updated));
    assert_eq!(updater.step(), UpdateState::Terminal(UpdateOutcome::Updated));
}

/// Update-capable loader: a successful update powers off instead of
/// chainloading, even with a payload on the card.
#[test]
fn update_flow_never_chainloads() {
    let log = Log::default();
    let storage = MockStorage::new(&log)
        .with_file("payload.bin", [1u8; 16])
        .with_file(FIRMWARE_PATH, firmware(5, 10 * CHUNK_SIZE))
        .with_file(FORCE_UPDATE_MARKER, Vec::new());
    let mut chip = FakeChip::new(&log);
    chip.version = 3;
    let mut staging = staging();

    let mut loader = Loader::new(
        BootConfig::UPDATE,
        board(&log, storage, chip, [ButtonState::empty()], &mut staging),
    );
    assert_eq!(loader.run(), Continuation::PowerOff);

    assert_eq!(log.sent()[0], tag::SLEEP);
    assert_eq!(log.count(|e| *e == Event::Sent(tag::SLEEP)), 1);
    assert_eq!(log.count(|e| *e == Event::Show(Screen::UpdateDone)), 1);
    assert!(log.last(&Event::PanelOff).is_some());
    log.assert_torn_down();

    let board = loader.into_board();
    assert!(!board.storage.files.contains_key(FORCE_UPDATE_MARKER));
    assert_eq!(board.modchip.channel().chunks.len(), 10);
    assert!(staging.iter().all(|&b| b == 0));
}

/// A failed update also ends in power off.
#[test]
fn update_failure_powers_off() {
    let log = Log::default();
    let storage = MockStorage::new(&log)
        .with_file("payload.bin", [1u8; 16])
        .with_file(FIRMWARE_PATH, firmware(5, 6 * CHUNK_SIZE));
    let mut chip = FakeChip::new(&log);
    chip.version = 3;
    chip.reject_chunk = Some((0, Status::EraseFailed));
    let mut staging = staging();

    let continuation = Loader::new(
        BootConfig::UPDATE,
        board(&log, storage, chip, [ButtonState::empty()], &mut staging),
    )
    .run();

    assert_eq!(continuation, Continuation::PowerOff);
    assert_eq!(log.count(|e| *e == Event::Show(Screen::UpdateFailed)), 1);
    log.assert_torn_down();
}

/// Nothing to update: the update-capable loader boots the payload.
#[test]
fn update_flow_boots_when_current() {
    let log = Log::default();
    let storage = MockStorage::new(&log)
        .with_file("payload.bin", [1u8; 16])
        .with_file(FIRMWARE_PATH, firmware(3, 6 * CHUNK_SIZE));
    let mut chip = FakeChip::new(&log);
    chip.version = 3;
    let mut staging = staging();

    // Both volume buttons mean nothing to this flavour.
    let both = ButtonState::VOL_UP | ButtonState::VOL_DOWN;
    let continuation = Loader::new(BootConfig::UPDATE, board(&log, storage, chip, [both], &mut staging)).run();

    assert!(matches!(continuation, Continuation::Chainload(_)));
    assert_eq!(log.sent(), [tag::SLEEP, tag::HANDSHAKE]);
    log.assert_torn_down();
}

/// In the update-capable loader VOL_UP alone is the alternate boot.
#[test]
fn update_flow_volume_up_is_alternate_boot() {
    let log = Log::default();
    let storage = MockStorage::new(&log)
        .with_file("payload.bin", [1u8; 16])
        .with_file(FIRMWARE_PATH, firmware(5, 6 * CHUNK_SIZE));
    let mut staging = staging();

    let continuation = Loader::new(
        BootConfig::UPDATE,
        board(&log, storage, FakeChip::new(&log), [ButtonState::VOL_UP], &mut staging),
    )
    .run();

    assert_eq!(continuation, Continuation::SafeHalt(PANIC_CODE_BYPASS_FUSE));
    assert_eq!(log.sent(), [tag::SLEEP]);
    log.assert_torn_down();
}
