// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Locating, size-checking and staging the next-stage payload.
//!
//! The staged image is trusted as-is: nothing here checks a signature or a
//! checksum, so anyone who can write the SD card decides what runs next.

use consts::{ATMOSPHERE_DIR, LEGACY_ROOT_FILES, PAYLOAD_PATHS, STAGING_ADDR, STAGING_SIZE};
use heapless::String;

use crate::hal::{FsError, Storage};

/// Longest path the loader ever builds.
pub const MAX_PATH: usize = 64;

/// A payload sitting in the staging region, ready to be chainloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PayloadDescriptor {
    pub src_address: u32,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadError {
    /// Absent, empty, or not fully readable.
    Missing,
    TooLarge { size: u64 },
}

/// Whether a payload of `size` bytes may be staged.
pub fn size_fits(size: u64) -> bool {
    size > 0 && size <= STAGING_SIZE as u64
}

/// Finds the first payload candidate on storage and reads it into `staging`.
///
/// `staging` is the staging region (or a stand-in for it); it must hold at
/// least [`STAGING_SIZE`] bytes.
pub fn load<S: Storage>(storage: &mut S, staging: &mut [u8]) -> Result<PayloadDescriptor, PayloadError> {
    let Some((path, size)) = PAYLOAD_PATHS
        .iter()
        .find_map(|path| storage.stat(path).ok().map(|info| (*path, info.size)))
    else {
        info!("no payload found");
        return Err(PayloadError::Missing);
    };

    if size > STAGING_SIZE as u64 {
        warn!("{} is {} bytes, limit is {}", path, size, STAGING_SIZE);
        return Err(PayloadError::TooLarge { size });
    }
    if size == 0 {
        warn!("{} is empty", path);
        return Err(PayloadError::Missing);
    }

    // Bounded by STAGING_SIZE above.
    let size = size as usize;
    let Some(dest) = staging.get_mut(..size) else {
        error!("staging buffer holds {} bytes, need {}", staging.len(), size);
        return Err(PayloadError::Missing);
    };

    match storage.read_to(path, dest) {
        Ok(read) if read == size => {
            info!("staged {} ({} bytes)", path, size);
            Ok(PayloadDescriptor {
                src_address: STAGING_ADDR,
                size,
            })
        }
        Ok(read) => {
            warn!("short read of {}: {} of {} bytes", path, read, size);
            Err(PayloadError::Missing)
        }
        Err(e) => {
            warn!("reading {} failed: {:?}", path, e);
            Err(PayloadError::Missing)
        }
    }
}

/// Moves files older setups kept at the SD root into `atmosphere/`.
/// Best effort: failures are logged and left for the next boot.
pub fn migrate_legacy<S: Storage>(storage: &mut S) {
    for name in LEGACY_ROOT_FILES {
        if !storage.exists(name) {
            continue;
        }

        let Some(dest) = join(ATMOSPHERE_DIR, name) else {
            continue;
        };

        match storage.mkdir(ATMOSPHERE_DIR) {
            Ok(()) | Err(FsError::Exists) => {}
            Err(e) => {
                warn!("cannot create {}: {:?}", ATMOSPHERE_DIR, e);
                continue;
            }
        }

        if storage.exists(&dest) {
            if let Err(e) = storage.unlink(&dest) {
                warn!("cannot replace {}: {:?}", dest.as_str(), e);
                continue;
            }
        }

        match storage.rename(name, &dest) {
            Ok(()) => info!("moved {} to {}", name, dest.as_str()),
            Err(e) => warn!("moving {} failed: {:?}", name, e),
        }
    }
}

/// `dir/name`, or `None` if it would not fit in [`MAX_PATH`].
pub fn join(dir: &str, name: &str) -> Option<String<MAX_PATH>> {
    let mut path = String::new();
    path.push_str(dir).ok()?;
    path.push('/').ok()?;
    path.push_str(name).ok()?;
    Some(path)
}
