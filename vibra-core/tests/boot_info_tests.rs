// SPDX-License-Identifier: MIT

//! Unit tests for the boot info record and its flash-backed registry.

mod common;

use common::MemFlash;
use vibra_core::boot_info::{self, Bank, BootInfo};
use vibra_core::config::{BOOT_INFO_ADDR, BOOT_INFO_LEN, BOOT_INFO_MAGIC, MAX_BOOT_ATTEMPTS};
use vibra_core::{BANK_A_ADDR, BANK_B_ADDR};

#[test]
fn test_default_new() {
    let info = BootInfo::default_new();

    assert_eq!(info.magic, BOOT_INFO_MAGIC);
    assert_eq!(info.active_bank, Bank::A);
    assert_eq!(info.boot_attempt_count, 0);
    assert_eq!(info.max_boot_attempts, MAX_BOOT_ATTEMPTS);

    assert!(info.bank_a.valid);
    assert_eq!(info.bank_a.version, 1);
    assert_eq!(info.bank_a.address, BANK_A_ADDR);

    assert!(!info.bank_b.valid);
    assert_eq!(info.bank_b.version, 0);
    assert_eq!(info.bank_b.address, BANK_B_ADDR);
}

#[test]
fn test_bank_other() {
    assert_eq!(Bank::A.other(), Bank::B);
    assert_eq!(Bank::B.other(), Bank::A);
}

#[test]
fn test_serialized_length() {
    let info = BootInfo::default_new();
    assert_eq!(info.to_bytes().len(), BOOT_INFO_LEN);
}

#[test]
fn test_roundtrip() {
    let mut info = BootInfo::default_new();
    info.active_bank = Bank::B;
    info.boot_attempt_count = 2;
    info.bank_b.valid = true;
    info.bank_b.size = 0x1234;
    info.bank_b.crc16 = 0xBEEF;
    info.bank_b.version = 7;

    let decoded = BootInfo::from_bytes(&info.to_bytes()).unwrap();
    assert_eq!(decoded, info);
}

#[test]
fn test_magic_is_little_endian_at_start() {
    let bytes = BootInfo::default_new().to_bytes();
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    assert_eq!(magic, BOOT_INFO_MAGIC);
}

#[test]
fn test_from_bytes_rejects_wrong_magic() {
    let mut bytes = BootInfo::default_new().to_bytes();
    bytes[0] ^= 0xFF;
    assert!(BootInfo::from_bytes(&bytes).is_none());
}

#[test]
fn test_from_bytes_rejects_corrupt_crc() {
    let mut bytes = BootInfo::default_new().to_bytes();
    bytes[36] ^= 0x01;
    assert!(BootInfo::from_bytes(&bytes).is_none());
}

#[test]
fn test_from_bytes_rejects_corrupt_body() {
    let mut bytes = BootInfo::default_new().to_bytes();
    bytes[33] = 99; // boot_attempt_count no longer matches the CRC
    assert!(BootInfo::from_bytes(&bytes).is_none());
}

#[test]
fn test_from_bytes_rejects_short_input() {
    let bytes = BootInfo::default_new().to_bytes();
    assert!(BootInfo::from_bytes(&bytes[..BOOT_INFO_LEN - 1]).is_none());
}

#[test]
fn test_from_bytes_rejects_out_of_range_active_bank() {
    // Rebuild a record with active_bank = 2 and a matching CRC: it must
    // still be rejected, not mapped to some undefined bank.
    let mut bytes = BootInfo::default_new().to_bytes();
    bytes[32] = 2;
    let crc = vibra_core::flash::CRC16.checksum(&bytes[..36]);
    bytes[36..38].copy_from_slice(&crc.to_le_bytes());
    assert!(BootInfo::from_bytes(&bytes).is_none());
}

// --- Registry operations ---

#[test]
fn test_load_from_blank_flash_is_absent() {
    let mut flash = MemFlash::new();
    assert!(boot_info::load(&mut flash).is_none());
}

#[test]
fn test_load_fails_soft_on_read_error() {
    let mut flash = MemFlash::new();
    flash.fail_read = true;
    assert!(boot_info::load(&mut flash).is_none());
}

#[test]
fn test_commit_then_load() {
    let mut flash = MemFlash::new();
    let mut info = BootInfo::default_new();
    info.active_bank = Bank::B;
    info.bank_b.valid = true;

    boot_info::commit(&mut flash, &info).unwrap();
    assert_eq!(boot_info::load(&mut flash).unwrap(), info);
}

#[test]
fn test_load_or_init_writes_defaults_on_blank_flash() {
    let mut flash = MemFlash::new();
    let info = boot_info::load_or_init(&mut flash).unwrap();

    assert_eq!(info, BootInfo::default_new());
    // The default must have been persisted, not just returned.
    assert_eq!(boot_info::load(&mut flash).unwrap(), info);
}

#[test]
fn test_load_or_init_falls_back_on_corruption() {
    let mut flash = MemFlash::new();
    let mut info = BootInfo::default_new();
    info.active_bank = Bank::B;
    boot_info::commit(&mut flash, &info).unwrap();

    // Corrupt one byte of the stored record.
    let addr = BOOT_INFO_ADDR as usize + 10;
    flash.data[addr] ^= 0xFF;

    let loaded = boot_info::load_or_init(&mut flash).unwrap();
    assert_eq!(loaded, BootInfo::default_new());
}

#[test]
fn test_commit_propagates_erase_failure() {
    let mut flash = MemFlash::new();
    flash.fail_erase_at = Some(BOOT_INFO_ADDR);
    assert!(boot_info::commit(&mut flash, &BootInfo::default_new()).is_err());
}

// --- Boot bank selection ---

#[test]
fn test_select_active_bank_when_valid() {
    let info = BootInfo::default_new();
    assert_eq!(info.select_boot_bank(), Bank::A);
}

#[test]
fn test_select_rolls_back_after_max_attempts() {
    let mut info = BootInfo::default_new();
    info.active_bank = Bank::B;
    info.bank_b.valid = true;
    info.boot_attempt_count = info.max_boot_attempts;

    assert_eq!(info.select_boot_bank(), Bank::A);
}

#[test]
fn test_select_stays_on_active_when_fallback_invalid() {
    let mut info = BootInfo::default_new();
    info.boot_attempt_count = info.max_boot_attempts;
    // Bank B never held firmware; there is nowhere to roll back to.
    assert_eq!(info.select_boot_bank(), Bank::A);
}

#[test]
fn test_select_skips_invalid_active_bank() {
    let mut info = BootInfo::default_new();
    info.active_bank = Bank::B; // marked invalid in the default record
    assert_eq!(info.select_boot_bank(), Bank::A);
}

#[test]
fn test_boot_attempt_accounting() {
    let mut info = BootInfo::default_new();
    info.record_boot_attempt();
    info.record_boot_attempt();
    assert_eq!(info.boot_attempt_count, 2);

    info.confirm_boot();
    assert_eq!(info.boot_attempt_count, 0);
}

#[test]
fn test_record_boot_attempt_saturates() {
    let mut info = BootInfo::default_new();
    info.boot_attempt_count = u8::MAX;
    info.record_boot_attempt();
    assert_eq!(info.boot_attempt_count, u8::MAX);
}
