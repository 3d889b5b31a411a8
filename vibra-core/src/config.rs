// SPDX-License-Identifier: MIT

//! Flash layout and protocol configuration constants.

// --- Flash layout ---
//
// 1MB NOR flash, 4KB erase sectors. The vendor bootloader owns the first
// sector; everything here must stay sector aligned.
//
// 0x00_0000 - 0x00_1000: vendor bootloader (not ours)
// 0x00_1000 - 0x00_2000: boot info (one sector, record is 40 bytes)
// 0x00_2000 - 0x03_8000: bank A (216 KB)
// 0x03_8000 - 0x06_E000: bank B (216 KB)
// 0x06_E000 - ...      : bonding/data partition (behind SecurityStore)

pub const FLASH_SECTOR_SIZE: u32 = 4096;

pub const BOOT_INFO_ADDR: u32 = 0x0000_1000;
pub const BANK_A_ADDR: u32 = 0x0000_2000;
pub const BANK_B_ADDR: u32 = 0x0003_8000;
pub const BANK_SIZE: u32 = 216 * 1024;

// Layout sanity: banks sector aligned and non-overlapping.
const _: () = assert!(BANK_A_ADDR % FLASH_SECTOR_SIZE == 0);
const _: () = assert!(BANK_B_ADDR % FLASH_SECTOR_SIZE == 0);
const _: () = assert!(BANK_SIZE % FLASH_SECTOR_SIZE == 0);
const _: () = assert!(BANK_A_ADDR + BANK_SIZE <= BANK_B_ADDR);
const _: () = assert!(BOOT_INFO_ADDR + FLASH_SECTOR_SIZE <= BANK_A_ADDR);

// --- Boot info ---

/// "JLOT" - magic for the persisted boot info record.
pub const BOOT_INFO_MAGIC: u32 = 0x4A4C_4F54;
pub const BOOT_INFO_SCHEMA_VERSION: u16 = 0x0001;
/// Serialized size of the boot info record.
pub const BOOT_INFO_LEN: usize = 40;
/// Boot attempts before the loader rolls back to the other bank.
pub const MAX_BOOT_ATTEMPTS: u8 = 3;

// --- Motor ---

/// Duty cycle scale: 10000 = 100.00%.
pub const MOTOR_DUTY_MAX: u16 = 10000;

// --- Security ---

/// Accepted packets between counter checkpoints (flash wear trade-off).
pub const COUNTER_SAVE_INTERVAL: u32 = 256;
/// Largest plausible counter jump from packet loss.
pub const COUNTER_MAX_DELTA: u64 = 1 << 30;
/// Counters are carried as LE48 on the wire.
pub const COUNTER_MAX: u64 = (1 << 48) - 1;

// --- Device info ---

pub const DEVICE_INFO_HEADER: u8 = 0xB0;
pub const FW_VERSION_MAJOR: u8 = 1;
pub const FW_VERSION_MINOR: u8 = 2;
