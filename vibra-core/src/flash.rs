// SPDX-License-Identifier: MIT

//! Raw flash abstraction and bank-level helpers.
//!
//! The vendor flash driver is consumed through [`FlashDriver`]; everything
//! above it (sector-aligned erase loops, chunked CRC read-back) lives here
//! so it can run against an in-memory flash on the host.

use crc::{Crc, CRC_16_IBM_3740};

use crate::config::FLASH_SECTOR_SIZE;

/// CRC-16/IBM-3740 (CCITT-FALSE) - used for firmware images and boot info.
pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Read-back chunk size for CRC verification. Small enough to live on the
/// stack; verification must never depend on heap availability.
const VERIFY_CHUNK: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    EraseFailed,
    WriteFailed,
    ReadFailed,
    /// Erase address not on a sector boundary.
    Unaligned,
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            FlashError::EraseFailed => "flash erase failed",
            FlashError::WriteFailed => "flash write failed",
            FlashError::ReadFailed => "flash read failed",
            FlashError::Unaligned => "erase address not sector aligned",
        };
        f.write_str(s)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FlashError {}

/// Raw NOR flash operations, addressed by byte offset.
///
/// `erase_sector` erases the 4KB sector starting at `addr` (must be sector
/// aligned); `write`/`read` may be sub-sector.
pub trait FlashDriver {
    fn erase_sector(&mut self, addr: u32) -> Result<(), FlashError>;
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError>;
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError>;
}

/// Erase `ceil(len / SECTOR_SIZE)` sectors starting at `addr`.
///
/// Aborts on the first failing sector; a partial erase of a not-yet-valid
/// bank is harmless.
pub fn erase_region<F: FlashDriver>(flash: &mut F, addr: u32, len: u32) -> Result<(), FlashError> {
    if addr % FLASH_SECTOR_SIZE != 0 {
        return Err(FlashError::Unaligned);
    }

    let sectors = len.div_ceil(FLASH_SECTOR_SIZE);
    for i in 0..sectors {
        flash.erase_sector(addr + i * FLASH_SECTOR_SIZE)?;
    }
    Ok(())
}

/// Compute CRC16 over `len` bytes of flash starting at `addr` by chunked
/// read-back.
pub fn crc16_of<F: FlashDriver>(flash: &mut F, addr: u32, len: u32) -> Result<u16, FlashError> {
    let mut digest = CRC16.digest();
    let mut chunk = [0u8; VERIFY_CHUNK];
    let mut offset = 0u32;

    while offset < len {
        let n = ((len - offset) as usize).min(VERIFY_CHUNK);
        flash.read(addr + offset, &mut chunk[..n])?;
        digest.update(&chunk[..n]);
        offset += n as u32;
    }

    Ok(digest.finalize())
}
