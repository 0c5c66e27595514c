// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::MODCHIP_POLL_INTERVAL_MS;
use embedded_hal::delay::DelayNs;
use modchip_protocol::Frame;

use crate::fmt::Dbg;
use crate::hal::CommandChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModchipError {
    /// No reply within the attempt limit.
    NoResponse { attempts: u32 },
}

/// Companion chip driver. Owns the one frame buffer every exchange reuses.
pub struct Modchip<C> {
    channel: C,
    frame: Frame,
    attempt_limit: Option<u32>,
}

impl<C: CommandChannel> Modchip<C> {
    /// Polls forever. The chip's latency is not bounded anywhere, so a chip
    /// that never answers hangs the loader here.
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            frame: Frame::new(),
            attempt_limit: None,
        }
    }

    /// Gives up after `attempts` polls of one exchange.
    pub fn with_attempt_limit(channel: C, attempts: u32) -> Self {
        Self {
            channel,
            frame: Frame::new(),
            attempt_limit: Some(attempts),
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Ack after a successful glitch; as a second frame it puts the chip to sleep.
    pub fn sleep(&mut self) {
        self.frame.encode_sleep();
        self.post();
    }

    /// Sends the frame as it stands, without waiting for a reply.
    pub fn post(&mut self) {
        if let Err(e) = self.channel.send(&self.frame) {
            warn!("modchip send of tag {:#x} failed: {:?}", self.frame.tag(), Dbg(&e));
        }
    }

    /// Sends the frame as it stands and polls until the chip answers it.
    ///
    /// Only a block tagged with the complement of the sent tag counts as the
    /// answer; anything else, including receive errors, is polled again.
    pub fn transact(&mut self, delay: &mut impl DelayNs) -> Result<&Frame, ModchipError> {
        let sent = self.frame.tag();
        self.post();

        let mut attempts: u32 = 0;
        loop {
            delay.delay_ms(MODCHIP_POLL_INTERVAL_MS);
            attempts = attempts.saturating_add(1);

            match self.channel.receive(&mut self.frame) {
                Ok(()) if self.frame.is_reply_to(sent) => break,
                Ok(()) => trace!("modchip poll {}: tag {:#x} is not a reply to {:#x}", attempts, self.frame.tag(), sent),
                Err(e) => trace!("modchip poll {} failed: {:?}", attempts, Dbg(&e)),
            }

            if let Some(limit) = self.attempt_limit {
                if attempts >= limit {
                    warn!("modchip gave no reply to {:#x} in {} polls", sent, attempts);
                    return Err(ModchipError::NoResponse { attempts });
                }
            }
        }

        trace!("modchip reply to {:#x} after {} polls", sent, attempts);
        Ok(&self.frame)
    }

    pub fn finish(&mut self) {
        self.channel.finish();
    }
}
