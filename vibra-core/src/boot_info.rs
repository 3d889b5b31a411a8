// SPDX-License-Identifier: MIT

//! Persisted boot info record - which bank is active, and what each bank
//! holds.
//!
//! The record lives in its own flash sector and carries a magic number and
//! trailing CRC16. A load that fails the integrity check is treated the
//! same as an absent record: the device falls back to a freshly
//! initialized default so it can always boot.
//!
//! Bank selection is pure logic on the decoded record so the boot-time
//! loader policy can be tested without hardware.

use crate::config::{
    BANK_A_ADDR, BANK_B_ADDR, BOOT_INFO_ADDR, BOOT_INFO_LEN, BOOT_INFO_MAGIC,
    BOOT_INFO_SCHEMA_VERSION, MAX_BOOT_ATTEMPTS,
};
use crate::flash::{FlashDriver, FlashError, CRC16};

/// One of the two firmware banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bank {
    A,
    B,
}

impl Bank {
    pub fn other(self) -> Bank {
        match self {
            Bank::A => Bank::B,
            Bank::B => Bank::A,
        }
    }

    pub fn address(self) -> u32 {
        match self {
            Bank::A => BANK_A_ADDR,
            Bank::B => BANK_B_ADDR,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Bank::A => 0,
            Bank::B => 1,
        }
    }

    fn from_byte(b: u8) -> Option<Bank> {
        match b {
            0 => Some(Bank::A),
            1 => Some(Bank::B),
            _ => None,
        }
    }
}

/// Describes the firmware held by one bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BankInfo {
    pub address: u32,
    pub size: u32,
    pub crc16: u16,
    pub valid: bool,
    pub version: u8,
}

impl BankInfo {
    fn empty(bank: Bank) -> Self {
        Self {
            address: bank.address(),
            size: 0,
            crc16: 0,
            valid: false,
            version: 0,
        }
    }

    const ENCODED_LEN: usize = 12;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.address.to_le_bytes());
        out[4..8].copy_from_slice(&self.size.to_le_bytes());
        out[8..10].copy_from_slice(&self.crc16.to_le_bytes());
        out[10] = u8::from(self.valid);
        out[11] = self.version;
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            address: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            crc16: u16::from_le_bytes([buf[8], buf[9]]),
            valid: buf[10] != 0,
            version: buf[11],
        }
    }
}

/// The boot info record (40 bytes serialized).
///
/// Layout, all little-endian:
/// ```text
///  0..4   magic
///  4..6   schema_version
///  6..8   reserved
///  8..20  bank_a
/// 20..32  bank_b
/// 32      active_bank (0 = A, 1 = B)
/// 33      boot_attempt_count
/// 34      max_boot_attempts
/// 35      reserved
/// 36..38  crc16 over bytes 0..36
/// 38..40  reserved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootInfo {
    pub magic: u32,
    pub schema_version: u16,
    pub bank_a: BankInfo,
    pub bank_b: BankInfo,
    pub active_bank: Bank,
    pub boot_attempt_count: u8,
    pub max_boot_attempts: u8,
}

const CRC_OFFSET: usize = 36;

impl BootInfo {
    /// Invariant-satisfying default: bank A active and assumed valid
    /// (it holds the factory firmware), bank B empty.
    pub fn default_new() -> Self {
        let mut bank_a = BankInfo::empty(Bank::A);
        bank_a.valid = true;
        bank_a.version = 1;

        Self {
            magic: BOOT_INFO_MAGIC,
            schema_version: BOOT_INFO_SCHEMA_VERSION,
            bank_a,
            bank_b: BankInfo::empty(Bank::B),
            active_bank: Bank::A,
            boot_attempt_count: 0,
            max_boot_attempts: MAX_BOOT_ATTEMPTS,
        }
    }

    pub fn bank(&self, bank: Bank) -> &BankInfo {
        match bank {
            Bank::A => &self.bank_a,
            Bank::B => &self.bank_b,
        }
    }

    pub fn bank_mut(&mut self, bank: Bank) -> &mut BankInfo {
        match bank {
            Bank::A => &mut self.bank_a,
            Bank::B => &mut self.bank_b,
        }
    }

    /// Serialize to the fixed 40-byte image, computing the trailing CRC.
    pub fn to_bytes(&self) -> [u8; BOOT_INFO_LEN] {
        let mut buf = [0u8; BOOT_INFO_LEN];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..6].copy_from_slice(&self.schema_version.to_le_bytes());
        self.bank_a.encode(&mut buf[8..8 + BankInfo::ENCODED_LEN]);
        self.bank_b.encode(&mut buf[20..20 + BankInfo::ENCODED_LEN]);
        buf[32] = self.active_bank.to_byte();
        buf[33] = self.boot_attempt_count;
        buf[34] = self.max_boot_attempts;

        let crc = CRC16.checksum(&buf[..CRC_OFFSET]);
        buf[CRC_OFFSET..CRC_OFFSET + 2].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode and integrity-check a serialized record.
    ///
    /// Returns `None` on short input, bad magic, out-of-range active bank,
    /// or CRC mismatch - the caller treats all of these as "absent".
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < BOOT_INFO_LEN {
            return None;
        }

        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != BOOT_INFO_MAGIC {
            return None;
        }

        let stored_crc = u16::from_le_bytes([buf[CRC_OFFSET], buf[CRC_OFFSET + 1]]);
        if CRC16.checksum(&buf[..CRC_OFFSET]) != stored_crc {
            return None;
        }

        Some(Self {
            magic,
            schema_version: u16::from_le_bytes([buf[4], buf[5]]),
            bank_a: BankInfo::decode(&buf[8..8 + BankInfo::ENCODED_LEN]),
            bank_b: BankInfo::decode(&buf[20..20 + BankInfo::ENCODED_LEN]),
            active_bank: Bank::from_byte(buf[32])?,
            boot_attempt_count: buf[33],
            max_boot_attempts: buf[34],
        })
    }

    /// Pick the bank the loader should execute.
    ///
    /// The active bank wins while it is valid and under the attempt limit;
    /// after `max_boot_attempts` failed boots the other bank is used if it
    /// holds valid firmware.
    pub fn select_boot_bank(&self) -> Bank {
        let active = self.active_bank;
        let exhausted = self.boot_attempt_count >= self.max_boot_attempts;

        if self.bank(active).valid && !exhausted {
            return active;
        }
        if self.bank(active.other()).valid {
            return active.other();
        }
        active
    }

    /// Count one boot attempt. The loader persists the updated record
    /// before jumping; the running firmware calls [`Self::confirm_boot`]
    /// once it is up.
    pub fn record_boot_attempt(&mut self) {
        self.boot_attempt_count = self.boot_attempt_count.saturating_add(1);
    }

    /// Mark the current boot as good.
    pub fn confirm_boot(&mut self) {
        self.boot_attempt_count = 0;
    }
}

// --- Flash-backed registry operations ---

/// Read the boot info record from its fixed slot.
///
/// Fails soft: any read error, bad magic, or CRC mismatch yields `None`
/// so the device can still boot with a default record.
pub fn load<F: FlashDriver>(flash: &mut F) -> Option<BootInfo> {
    let mut buf = [0u8; BOOT_INFO_LEN];
    flash.read(BOOT_INFO_ADDR, &mut buf).ok()?;
    BootInfo::from_bytes(&buf)
}

/// Construct and persist the default record.
pub fn init_default<F: FlashDriver>(flash: &mut F) -> Result<BootInfo, FlashError> {
    let info = BootInfo::default_new();
    commit(flash, &info)?;
    Ok(info)
}

/// Startup path: load the persisted record, or fall back to a fresh
/// default when it is absent or corrupt.
pub fn load_or_init<F: FlashDriver>(flash: &mut F) -> Result<BootInfo, FlashError> {
    match load(flash) {
        Some(info) => Ok(info),
        None => {
            #[cfg(feature = "defmt")]
            defmt::warn!("boot info absent or corrupt, writing defaults");
            init_default(flash)
        }
    }
}

/// Recompute the CRC, erase the boot-info sector, and write the record.
///
/// There is an erase-then-write window in which power loss corrupts the
/// only copy. That risk is accepted for this sector alone; firmware bank
/// content is always written and verified before this is called.
pub fn commit<F: FlashDriver>(flash: &mut F, info: &BootInfo) -> Result<(), FlashError> {
    let bytes = info.to_bytes();
    flash.erase_sector(BOOT_INFO_ADDR)?;
    flash.write(BOOT_INFO_ADDR, &bytes)?;
    Ok(())
}
