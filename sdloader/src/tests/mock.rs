// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use modchip_protocol::{reply_tag, tag, Frame, Status};

use crate::display::{Display, Screen};
use crate::hal::{ButtonState, Buttons, CommandChannel, File, FileInfo, FsError, Pmic, Storage};

/// Something a port did, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Sent(u8),
    Finish,
    Mount,
    Unmount,
    Show(Screen),
    Progress(u8),
    Backlight(bool),
    PanelOff,
    StopAlarms,
}

#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<Event>>>);

impl Log {
    pub fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn sent(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Sent(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub fn last(&self, event: &Event) -> Option<usize> {
        self.0.borrow().iter().rposition(|e| e == event)
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.0.borrow().iter().filter(|&e| pred(e)).count()
    }

    /// The channel was released and the card unmounted after the last thing
    /// either of them was asked to do.
    pub fn assert_torn_down(&self) {
        let events = self.events();
        let finish = self.last(&Event::Finish).expect("channel never finished");
        let unmount = self.last(&Event::Unmount).expect("storage never unmounted");
        let last_sent = events.iter().rposition(|e| matches!(e, Event::Sent(_)));
        let last_mount = self.last(&Event::Mount);
        assert!(last_sent.map_or(true, |sent| sent < finish), "frame sent after finish: {events:?}");
        assert!(last_mount.map_or(true, |mount| mount < unmount), "mounted after unmount: {events:?}");
    }
}

pub struct MockFile {
    data: Vec<u8>,
    pos: usize,
    fail_from: Option<usize>,
}

impl File for MockFile {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn seek(&mut self, pos: u64) -> Result<(), FsError> {
        self.pos = pos as usize;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        if self.fail_from.is_some_and(|at| self.pos >= at) {
            return Err(FsError::Io(1));
        }
        let start = self.pos.min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n;
        Ok(n)
    }
}

/// A FAT volume in a hash map. Like FatFs, renaming onto an existing file
/// and creating an existing directory both fail.
pub struct MockStorage {
    pub files: HashMap<String, Vec<u8>>,
    pub dirs: HashSet<String>,
    /// Reads of these files fail once past the given offset.
    pub broken: HashMap<String, usize>,
    /// How many mount attempts fail before one succeeds.
    pub failing_mounts: u32,
    pub mount_attempts: u32,
    pub mounted: bool,
    log: Log,
}

impl MockStorage {
    pub fn new(log: &Log) -> Self {
        Self {
            files: HashMap::new(),
            dirs: HashSet::new(),
            broken: HashMap::new(),
            failing_mounts: 0,
            mount_attempts: 0,
            mounted: false,
            log: log.clone(),
        }
    }

    pub fn with_file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), data.into());
        self
    }

    fn check_mounted(&self) -> Result<(), FsError> {
        if self.mounted {
            Ok(())
        } else {
            Err(FsError::NotMounted)
        }
    }
}

impl Storage for MockStorage {
    type File = MockFile;

    fn mount(&mut self) -> Result<(), FsError> {
        self.mount_attempts += 1;
        if self.failing_mounts > 0 {
            self.failing_mounts -= 1;
            return Err(FsError::Io(3));
        }
        self.mounted = true;
        self.log.push(Event::Mount);
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
        self.log.push(Event::Unmount);
    }

    fn stat(&mut self, path: &str) -> Result<FileInfo, FsError> {
        self.check_mounted()?;
        if let Some(data) = self.files.get(path) {
            return Ok(FileInfo { size: data.len() as u64 });
        }
        if self.dirs.contains(path) {
            return Ok(FileInfo { size: 0 });
        }
        Err(FsError::NotFound)
    }

    fn open(&mut self, path: &str) -> Result<MockFile, FsError> {
        self.check_mounted()?;
        let data = self.files.get(path).ok_or(FsError::NotFound)?.clone();
        Ok(MockFile {
            data,
            pos: 0,
            fail_from: self.broken.get(path).copied(),
        })
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError> {
        self.check_mounted()?;
        if self.files.contains_key(to) {
            return Err(FsError::Exists);
        }
        let data = self.files.remove(from).ok_or(FsError::NotFound)?;
        self.files.insert(to.into(), data);
        Ok(())
    }

    fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        self.check_mounted()?;
        self.files.remove(path).map(|_| ()).ok_or(FsError::NotFound)
    }

    fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        self.check_mounted()?;
        if !self.dirs.insert(path.into()) {
            return Err(FsError::Exists);
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChipError {
    /// Nothing to read back yet.
    Busy,
}

/// Companion chip double. Answers every polled request after
/// `busy_polls` empty polls, optionally preceded by near-miss blocks.
pub struct FakeChip {
    pub version: u32,
    pub handshake_status: Status,
    pub ping_status: Status,
    pub offset_status: Status,
    /// Refuse the chunk with this index.
    pub reject_chunk: Option<(usize, Status)>,
    pub busy_polls: u32,
    /// Before the real reply, hand back blocks tagged one off the complement.
    pub near_misses: bool,
    /// Never answer anything.
    pub silent: bool,
    pub chunks: Vec<[u8; 64]>,
    pub polls: u32,
    pending: VecDeque<Option<Frame>>,
    log: Log,
}

impl FakeChip {
    pub fn new(log: &Log) -> Self {
        Self {
            version: 0,
            handshake_status: Status::Success,
            ping_status: Status::Success,
            offset_status: Status::Success,
            reject_chunk: None,
            busy_polls: 0,
            near_misses: false,
            silent: false,
            chunks: Vec::new(),
            polls: 0,
            pending: VecDeque::new(),
            log: log.clone(),
        }
    }

    fn reply(&mut self, request: &Frame) -> Option<Frame> {
        let sent = request.tag();
        // The reply block is the request with its header rewritten.
        let mut reply = request.clone();
        match sent {
            tag::SLEEP => return None,
            tag::HANDSHAKE => reply.encode_handshake_reply(self.handshake_status, self.version),
            tag::UPDATE_MODE => reply.encode_reply(sent, Status::Success),
            tag::PING => reply.encode_reply(sent, self.ping_status),
            tag::SET_OFFSET => reply.encode_reply(sent, self.offset_status),
            tag::CHUNK => {
                let index = self.chunks.len();
                let mut data = [0; 64];
                data.copy_from_slice(request.chunk());
                self.chunks.push(data);
                let status = match self.reject_chunk {
                    Some((at, status)) if at == index => status,
                    _ => Status::Success,
                };
                reply.encode_reply(sent, status);
            }
            other => panic!("unexpected frame tag {other:#x}"),
        }
        Some(reply)
    }
}

impl CommandChannel for FakeChip {
    type Error = ChipError;

    fn send(&mut self, frame: &Frame) -> Result<(), ChipError> {
        self.log.push(Event::Sent(frame.tag()));
        if self.silent {
            return Ok(());
        }
        if let Some(reply) = self.reply(frame) {
            for _ in 0..self.busy_polls {
                self.pending.push_back(None);
            }
            if self.near_misses {
                for miss in [reply_tag(frame.tag()).wrapping_add(1), reply_tag(frame.tag()).wrapping_sub(1)] {
                    let mut block = reply.clone();
                    block.set_tag(miss);
                    self.pending.push_back(Some(block));
                }
            }
            self.pending.push_back(Some(reply));
        }
        Ok(())
    }

    fn receive(&mut self, frame: &mut Frame) -> Result<(), ChipError> {
        self.polls += 1;
        match self.pending.pop_front() {
            Some(Some(reply)) => {
                *frame = reply;
                Ok(())
            }
            _ => Err(ChipError::Busy),
        }
    }

    fn finish(&mut self) {
        self.log.push(Event::Finish);
    }
}

/// Plays back button snapshots; the last one repeats forever.
pub struct MockButtons {
    states: VecDeque<ButtonState>,
    last: ButtonState,
    pub reads: u32,
}

impl MockButtons {
    pub fn new(states: impl IntoIterator<Item = ButtonState>) -> Self {
        Self {
            states: states.into_iter().collect(),
            last: ButtonState::empty(),
            reads: 0,
        }
    }
}

impl Buttons for MockButtons {
    fn read(&mut self) -> ButtonState {
        self.reads += 1;
        if let Some(state) = self.states.pop_front() {
            self.last = state;
        }
        self.last
    }
}

#[derive(Debug)]
pub struct PmicFault;

pub struct MockPmic {
    pub alarm: Result<bool, ()>,
    pub alarms_stopped: bool,
    log: Log,
}

impl MockPmic {
    pub fn new(log: &Log) -> Self {
        Self {
            alarm: Ok(false),
            alarms_stopped: false,
            log: log.clone(),
        }
    }
}

impl Pmic for MockPmic {
    type Error = PmicFault;

    fn alarm_wake(&mut self) -> Result<bool, PmicFault> {
        self.alarm.map_err(|()| PmicFault)
    }

    fn stop_rtc_alarms(&mut self) -> Result<(), PmicFault> {
        self.alarms_stopped = true;
        self.log.push(Event::StopAlarms);
        Ok(())
    }

    fn disable_wake_events(&mut self) -> Result<(), PmicFault> {
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), PmicFault> {
        Ok(())
    }
}

pub struct RecordingDisplay {
    log: Log,
}

impl RecordingDisplay {
    pub fn new(log: &Log) -> Self {
        Self { log: log.clone() }
    }
}

impl Display for RecordingDisplay {
    fn show(&mut self, screen: Screen) {
        self.log.push(Event::Show(screen));
    }

    fn show_progress(&mut self, percent: u8) {
        self.log.push(Event::Progress(percent));
    }

    fn set_backlight(&mut self, on: bool) {
        self.log.push(Event::Backlight(on));
    }

    fn shutdown(&mut self) {
        self.log.push(Event::PanelOff);
    }
}

/// Adds up the time it was asked to wait.
#[derive(Default)]
pub struct MockDelay {
    pub total_ns: u64,
}

impl MockDelay {
    pub fn total_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}
