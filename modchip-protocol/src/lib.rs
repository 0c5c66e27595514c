// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Loader to companion chip ("modchip") protocol.
//! The loader is the host. The chip sits on the eMMC bus and answers a
//! repurposed GO_IDLE_STATE command carrying a single 512-byte block, one
//! block per direction per exchange.
//!
//! Byte 0 of a frame is its tag. Fixed tags select a mode, length tags
//! (2, 6, 64) say how many payload bytes follow. A reply carries the bitwise
//! complement of the tag it answers; that is the only thing that makes a
//! block a reply.

#![no_std]

/// Size of one exchanged block.
pub const FRAME_SIZE: usize = 512;

/// eMMC opcode used to address the chip (MMC_GO_IDLE_STATE).
pub const CHANNEL_OPCODE: u16 = 0;

/// Sentinel argument that turns the opcode into a chip command.
pub const CHANNEL_ARG: u32 = 0xAA54_58BA;

/// Bytes of firmware carried by one transfer frame.
pub const CHUNK_SIZE: usize = 64;

/// Frame tags.
pub mod tag {
    /// Ack / sleep. The first one tells the chip the glitch worked.
    pub const SLEEP: u8 = 0x55;
    /// Begin the version handshake.
    pub const HANDSHAKE: u8 = 0x44;
    /// Switch the chip into its firmware update mode.
    pub const UPDATE_MODE: u8 = 0xAA;
    /// Length tag of a PING frame (command word only).
    pub const PING: u8 = 2;
    /// Length tag of a SET_OFFSET frame (command word + u32 offset).
    pub const SET_OFFSET: u8 = 6;
    /// Length tag of a firmware chunk.
    pub const CHUNK: u8 = super::CHUNK_SIZE as u8;
}

/// Tag a reply to `sent` must carry.
pub const fn reply_tag(sent: u8) -> u8 {
    !sent
}

/// Command words carried by length-tagged frames, little endian at byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Command {
    Ping = 0x0001,
    SetOffset = 0x0002,
}

/// Status word a reply carries at byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Success,
    InvalidPackageLength,
    InvalidOffset,
    InvalidLength,
    EraseFailed,
    FlashFailed,
    Unimplemented,
    Unknown(u32),
}

impl Status {
    pub const SUCCESS: u32 = 0x7000_0000;
    pub const INVALID_PACKAGE_LENGTH: u32 = 0x6000_0001;
    pub const INVALID_OFFSET: u32 = 0x6000_0002;
    pub const INVALID_LENGTH: u32 = 0x6000_0003;
    pub const ERASE_FAILED: u32 = 0x6000_0004;
    pub const FLASH_FAILED: u32 = 0x6000_0005;
    pub const UNIMPLEMENTED: u32 = 0x5000_0000;

    pub fn from_word(word: u32) -> Self {
        match word {
            Self::SUCCESS => Self::Success,
            Self::INVALID_PACKAGE_LENGTH => Self::InvalidPackageLength,
            Self::INVALID_OFFSET => Self::InvalidOffset,
            Self::INVALID_LENGTH => Self::InvalidLength,
            Self::ERASE_FAILED => Self::EraseFailed,
            Self::FLASH_FAILED => Self::FlashFailed,
            Self::UNIMPLEMENTED => Self::Unimplemented,
            other => Self::Unknown(other),
        }
    }

    pub fn word(&self) -> u32 {
        match self {
            Self::Success => Self::SUCCESS,
            Self::InvalidPackageLength => Self::INVALID_PACKAGE_LENGTH,
            Self::InvalidOffset => Self::INVALID_OFFSET,
            Self::InvalidLength => Self::INVALID_LENGTH,
            Self::EraseFailed => Self::ERASE_FAILED,
            Self::FlashFailed => Self::FLASH_FAILED,
            Self::Unimplemented => Self::UNIMPLEMENTED,
            Self::Unknown(word) => *word,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// One 512-byte block. Requests and replies share the same buffer: encoding
/// only touches the header bytes of the frame kind, the rest keeps whatever
/// the previous exchange left there.
#[derive(Clone)]
pub struct Frame {
    buf: [u8; FRAME_SIZE],
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    /// Offset of the status word in a reply.
    pub const STATUS_OFFSET: usize = 1;
    /// Offset of the version word in a handshake reply.
    pub const VERSION_OFFSET: usize = 5;

    pub const fn new() -> Self {
        Self { buf: [0; FRAME_SIZE] }
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.buf
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; FRAME_SIZE] {
        &mut self.buf
    }

    pub fn tag(&self) -> u8 {
        self.buf[0]
    }

    pub fn set_tag(&mut self, tag: u8) {
        self.buf[0] = tag;
    }

    pub fn encode_sleep(&mut self) {
        self.set_tag(tag::SLEEP);
    }

    pub fn encode_handshake(&mut self) {
        self.set_tag(tag::HANDSHAKE);
    }

    pub fn encode_update_mode(&mut self) {
        self.set_tag(tag::UPDATE_MODE);
    }

    pub fn encode_ping(&mut self) {
        self.set_tag(tag::PING);
        self.set_command(Command::Ping);
    }

    pub fn encode_set_offset(&mut self, offset: u32) {
        self.set_tag(tag::SET_OFFSET);
        self.set_command(Command::SetOffset);
        self.buf[3..7].copy_from_slice(&offset.to_le_bytes());
    }

    /// Tags the frame as a firmware chunk and hands out its data bytes.
    pub fn chunk_mut(&mut self) -> &mut [u8] {
        self.set_tag(tag::CHUNK);
        &mut self.buf[1..1 + CHUNK_SIZE]
    }

    pub fn chunk(&self) -> &[u8] {
        &self.buf[1..1 + CHUNK_SIZE]
    }

    pub fn command(&self) -> u16 {
        u16::from_le_bytes([self.buf[1], self.buf[2]])
    }

    pub fn offset(&self) -> u32 {
        self.word(3)
    }

    /// Whether this frame answers a request tagged `sent`.
    pub fn is_reply_to(&self, sent: u8) -> bool {
        self.tag() == reply_tag(sent)
    }

    pub fn status(&self) -> Status {
        Status::from_word(self.word(Self::STATUS_OFFSET))
    }

    /// Firmware version the chip reports in its handshake reply.
    pub fn version(&self) -> u32 {
        self.word(Self::VERSION_OFFSET)
    }

    /// Chip side: turn this frame into the reply to `sent`.
    pub fn encode_reply(&mut self, sent: u8, status: Status) {
        self.set_tag(reply_tag(sent));
        self.set_word(Self::STATUS_OFFSET, status.word());
    }

    /// Chip side: reply to a handshake.
    pub fn encode_handshake_reply(&mut self, status: Status, version: u32) {
        self.encode_reply(tag::HANDSHAKE, status);
        self.set_word(Self::VERSION_OFFSET, version);
    }

    fn set_command(&mut self, command: Command) {
        self.buf[1..3].copy_from_slice(&(command as u16).to_le_bytes());
    }

    fn word(&self, offset: usize) -> u32 {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.buf[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    fn set_word(&mut self, offset: usize, word: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frame").field("tag", &self.tag()).finish_non_exhaustive()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Frame {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Frame {{ tag: {=u8:#x} }}", self.tag())
    }
}
