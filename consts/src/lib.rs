// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Address the boot ROM loads RCM payloads to, and where a chainloaded
/// payload is relocated before the jump.
pub const PAYLOAD_BASE_ADDR: u32 = 0x4001_0000;

/// Start of the staging region a validated `payload.bin` is read into.
/// The loader itself must end below this address.
pub const STAGING_ADDR: u32 = 0x4002_1000;

/// Size of the staging region: the ROM-reserved window up to the end of IRAM.
pub const STAGING_SIZE: usize = 0x1F000;

/// Largest loader image that fits between the payload base and the staging region.
pub const LOADER_MAX_SIZE: u32 = STAGING_ADDR - PAYLOAD_BASE_ADDR;

/// Low IRAM window the chainload relocator is copied to at startup.
/// Nothing else lives here once the loader is running, so the relocator
/// survives overwriting the loader image at [`PAYLOAD_BASE_ADDR`].
pub const CHAINLOADER_ADDR: u32 = 0x4000_3000;
pub const CHAINLOADER_SIZE: u32 = 0x1000;

/// Top of the loader stack (grows down towards the relocator).
pub const STACK_TOP: u32 = 0x4000_F000;

/// SDRAM framebuffer. 1280 rows of 768 pixels (720 visible + 48 padding),
/// rotated: the panel is mounted in portrait.
pub const FRAMEBUFFER_ADDR: u32 = 0xC000_0000;
pub const FB_WIDTH: usize = 1280;
pub const FB_HEIGHT: usize = 720;
pub const FB_STRIDE: usize = 720 + 48;

/// Wait before the single mount retry.
pub const MOUNT_RETRY_DELAY_MS: u32 = 500;

/// Interval between polls of the companion device.
pub const MODCHIP_POLL_INTERVAL_MS: u32 = 10;

/// How long the update result glyph stays on screen before power off.
pub const UPDATE_RESULT_DWELL_MS: u32 = 3000;

/// Payload candidates, searched in order.
pub const PAYLOAD_PATHS: [&str; 3] = ["payload.bin", "bootloader/payload.bin", "atmosphere/payload.bin"];

/// Candidate companion firmware image.
pub const FIRMWARE_PATH: &str = "firmware.bin";

/// Offset of the little-endian u32 version inside [`FIRMWARE_PATH`].
pub const FIRMWARE_VERSION_OFFSET: u64 = 0x150;

/// Zero-byte marker forcing an update regardless of version.
pub const FORCE_UPDATE_MARKER: &str = ".force_update";

/// Directory legacy root files are moved into.
pub const ATMOSPHERE_DIR: &str = "atmosphere";

/// Files that used to live at the SD root.
pub const LEGACY_ROOT_FILES: [&str; 2] = ["package3", "stratosphere.romfs"];

/// Panic code telling package1 to skip fuse programming.
pub const PANIC_CODE_BYPASS_FUSE: u32 = 0x21;

/// Panic code written when the loader itself panics.
pub const PANIC_CODE_LOADER: u32 = 0x10;
