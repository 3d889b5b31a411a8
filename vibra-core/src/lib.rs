// SPDX-License-Identifier: MIT

//! Core logic for a BLE-controlled vibration motor with dual-bank OTA.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std` mode for embedded targets
//! - `std` feature: Enables `std` support for host tools and tests
//! - `defmt` feature: Enables defmt logging on embedded targets
//!
//! Hardware is abstracted behind small traits so the whole crate can be
//! exercised on the host:
//! - [`flash::FlashDriver`] - raw NOR flash (erase/write/read)
//! - [`security::SecurityStore`] - bonding key/counter persistence
//! - [`dispatch::MotorDrive`] - PWM motor output (0..=10000 duty scale)
//! - [`dispatch::SystemControl`] - battery gauge and device reset

#![cfg_attr(not(feature = "std"), no_std)]

pub mod boot_info;
pub mod config;
pub mod dispatch;
pub mod flash;
pub mod notify;
pub mod ota;
pub mod protocol;
pub mod security;

// Re-export commonly used types
pub use boot_info::{Bank, BankInfo, BootInfo};
pub use config::{BANK_A_ADDR, BANK_B_ADDR, BANK_SIZE, BOOT_INFO_ADDR, FLASH_SECTOR_SIZE};
pub use dispatch::{DeviceContext, Dispatcher, MotorDrive, SystemControl};
pub use flash::{FlashDriver, FlashError};
pub use ota::{OtaEngine, OtaError, OtaState};
pub use protocol::{AttStatus, CharacteristicId, OtaCommand, OtaStatus};
pub use security::{AuthError, ReplayConfig, ReplayGuard, SecurityStore};
