// SPDX-License-Identifier: MIT

//! Dual-bank OTA update state machine.
//!
//! `Idle -> Receiving -> Verifying -> Updating`, with a failure edge back
//! to Idle from every non-Idle state. The engine buffers transport-sized
//! chunks into a 4KB sector buffer and writes whole sectors to the
//! inactive bank; the image is verified by CRC read-back before the boot
//! info record is ever touched, so a failed update leaves the previously
//! active bank bootable.
//!
//! The engine owns no hardware: the flash driver and the cached boot info
//! record are threaded into each call.

use crate::boot_info::{self, Bank, BankInfo, BootInfo};
use crate::config::{BANK_SIZE, FLASH_SECTOR_SIZE};
use crate::flash::{crc16_of, erase_region, FlashDriver};

const SECTOR: usize = FLASH_SECTOR_SIZE as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaState {
    Idle,
    Receiving,
    Verifying,
    Updating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaError {
    /// `start` while a session is already active.
    AlreadyInProgress,
    /// Size zero or above bank capacity.
    InvalidSize,
    /// `data`/`end` without an active session.
    NotReceiving,
    /// More data than the declared image size.
    Overflow,
    EraseFailed,
    WriteFailed,
    /// Size or CRC mismatch, or the read-back needed to verify failed.
    VerifyFailed,
    /// Boot info could not be persisted; no reset is triggered.
    CommitFailed,
}

impl OtaError {
    /// Error code byte carried in the `[ERROR, code]` notification.
    pub fn code(self) -> u8 {
        match self {
            OtaError::AlreadyInProgress => 0x01,
            OtaError::InvalidSize => 0x02,
            OtaError::NotReceiving => 0x03,
            OtaError::Overflow => 0x04,
            OtaError::EraseFailed => 0x05,
            OtaError::WriteFailed => 0x06,
            OtaError::VerifyFailed => 0x07,
            OtaError::CommitFailed => 0x08,
        }
    }
}

impl core::fmt::Display for OtaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OtaError::AlreadyInProgress => "update already in progress",
            OtaError::InvalidSize => "invalid image size",
            OtaError::NotReceiving => "no update session active",
            OtaError::Overflow => "more data than declared image size",
            OtaError::EraseFailed => "target bank erase failed",
            OtaError::WriteFailed => "image write failed",
            OtaError::VerifyFailed => "image verification failed",
            OtaError::CommitFailed => "boot info commit failed",
        };
        f.write_str(s)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OtaError {}

/// The OTA state machine. One instance per device; at most one session at
/// a time.
pub struct OtaEngine {
    state: OtaState,
    target_bank: Bank,
    total_size: u32,
    received_size: u32,
    expected_crc: u16,
    target_version: u8,
    sector_buffer: [u8; SECTOR],
    buffer_offset: usize,
}

impl OtaEngine {
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
            target_bank: Bank::B,
            total_size: 0,
            received_size: 0,
            expected_crc: 0,
            target_version: 0,
            sector_buffer: [0; SECTOR],
            buffer_offset: 0,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Percentage of the declared image size already written to flash.
    pub fn progress(&self) -> u8 {
        if self.total_size == 0 {
            return 0;
        }
        (self.received_size * 100 / self.total_size) as u8
    }

    /// Begin an update session targeting the inactive bank.
    ///
    /// Erases exactly the sectors the image will occupy. A failed erase
    /// aborts back to Idle; partial erase of the not-yet-valid target bank
    /// is safe.
    pub fn start<F: FlashDriver>(
        &mut self,
        flash: &mut F,
        boot: &BootInfo,
        size: u32,
        expected_crc: u16,
        version: u8,
    ) -> Result<(), OtaError> {
        if self.state != OtaState::Idle {
            return Err(OtaError::AlreadyInProgress);
        }
        if size == 0 || size > BANK_SIZE {
            return Err(OtaError::InvalidSize);
        }

        let target = boot.active_bank.other();

        #[cfg(feature = "defmt")]
        defmt::info!(
            "ota start: size={} crc=0x{:04x} version={} target=0x{:08x}",
            size,
            expected_crc,
            version,
            target.address()
        );

        if erase_region(flash, target.address(), size).is_err() {
            return Err(OtaError::EraseFailed);
        }

        self.state = OtaState::Receiving;
        self.target_bank = target;
        self.total_size = size;
        self.received_size = 0;
        self.expected_crc = expected_crc;
        self.target_version = version;
        self.buffer_offset = 0;
        Ok(())
    }

    /// Append a chunk of image data.
    ///
    /// Chunks are MTU-sized; flash writes are sector-sized. Bytes collect
    /// in the sector buffer and each full sector goes out at
    /// `target + received_size`.
    pub fn data<F: FlashDriver>(&mut self, flash: &mut F, chunk: &[u8]) -> Result<(), OtaError> {
        if self.state != OtaState::Receiving {
            return Err(OtaError::NotReceiving);
        }

        let pending = self.received_size as usize + self.buffer_offset + chunk.len();
        if pending > self.total_size as usize {
            self.abort();
            return Err(OtaError::Overflow);
        }

        let mut remaining = chunk;
        while !remaining.is_empty() {
            let room = SECTOR - self.buffer_offset;
            let take = remaining.len().min(room);
            self.sector_buffer[self.buffer_offset..self.buffer_offset + take]
                .copy_from_slice(&remaining[..take]);
            self.buffer_offset += take;
            remaining = &remaining[take..];

            if self.buffer_offset == SECTOR {
                self.flush_sector(flash, SECTOR)?;
            }
        }

        Ok(())
    }

    /// Finish the session: flush, verify, and commit the bank switch.
    ///
    /// On success the caller must trigger a device reset so the new
    /// image's first boot happens deliberately. On commit failure both the
    /// persisted and cached boot info are left unchanged.
    pub fn end<F: FlashDriver>(
        &mut self,
        flash: &mut F,
        boot: &mut BootInfo,
    ) -> Result<(), OtaError> {
        if self.state != OtaState::Receiving {
            return Err(OtaError::NotReceiving);
        }

        if self.buffer_offset > 0 {
            let len = self.buffer_offset;
            self.flush_sector(flash, len)?;
        }

        self.state = OtaState::Verifying;

        if self.received_size != self.total_size {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "ota size mismatch: {} != {}",
                self.received_size,
                self.total_size
            );
            self.abort();
            return Err(OtaError::VerifyFailed);
        }

        let target = self.target_bank;
        let written_crc = match crc16_of(flash, target.address(), self.total_size) {
            Ok(crc) => crc,
            Err(_) => {
                self.abort();
                return Err(OtaError::VerifyFailed);
            }
        };
        if written_crc != self.expected_crc {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "ota crc mismatch: expected 0x{:04x}, got 0x{:04x}",
                self.expected_crc,
                written_crc
            );
            self.abort();
            return Err(OtaError::VerifyFailed);
        }

        self.state = OtaState::Updating;

        let mut updated = *boot;
        *updated.bank_mut(target) = BankInfo {
            address: target.address(),
            size: self.total_size,
            crc16: written_crc,
            valid: true,
            version: self.target_version,
        };
        updated.active_bank = target;
        updated.boot_attempt_count = 0;

        if boot_info::commit(flash, &updated).is_err() {
            self.abort();
            return Err(OtaError::CommitFailed);
        }

        *boot = updated;
        self.abort();
        Ok(())
    }

    /// Force-clear the session back to Idle. Touches no flash, so it is
    /// safe from any state and can never strand future updates.
    pub fn abort(&mut self) {
        self.state = OtaState::Idle;
        self.total_size = 0;
        self.received_size = 0;
        self.expected_crc = 0;
        self.target_version = 0;
        self.buffer_offset = 0;
    }

    fn flush_sector<F: FlashDriver>(&mut self, flash: &mut F, len: usize) -> Result<(), OtaError> {
        let addr = self.target_bank.address() + self.received_size;
        if flash.write(addr, &self.sector_buffer[..len]).is_err() {
            self.abort();
            return Err(OtaError::WriteFailed);
        }
        self.received_size += len as u32;
        self.buffer_offset = 0;
        Ok(())
    }
}

impl Default for OtaEngine {
    fn default() -> Self {
        Self::new()
    }
}
