// SPDX-License-Identifier: MIT

//! Shared in-memory collaborators for integration tests.

#![allow(dead_code)]

use vibra_core::dispatch::{MotorDrive, MotorFault, SystemControl};
use vibra_core::flash::{FlashDriver, FlashError};
use vibra_core::protocol::{CMD_SET_DUTY, MOTOR_AUTH_LEN};
use vibra_core::security::{cmac32, SecurityStore, SIGNED_PREFIX_LEN};
use vibra_core::FLASH_SECTOR_SIZE;

pub const FLASH_SIZE: usize = 1024 * 1024;

/// Vec-backed NOR flash with failure injection.
pub struct MemFlash {
    pub data: Vec<u8>,
    pub erase_count: u32,
    pub fail_erase_at: Option<u32>,
    pub fail_write: bool,
    pub fail_read: bool,
}

impl MemFlash {
    pub fn new() -> Self {
        Self {
            data: vec![0xFF; FLASH_SIZE],
            erase_count: 0,
            fail_erase_at: None,
            fail_write: false,
            fail_read: false,
        }
    }
}

impl FlashDriver for MemFlash {
    fn erase_sector(&mut self, addr: u32) -> Result<(), FlashError> {
        if self.fail_erase_at == Some(addr) {
            return Err(FlashError::EraseFailed);
        }
        if addr % FLASH_SECTOR_SIZE != 0 {
            return Err(FlashError::Unaligned);
        }
        let start = addr as usize;
        let end = start + FLASH_SECTOR_SIZE as usize;
        if end > self.data.len() {
            return Err(FlashError::EraseFailed);
        }
        self.data[start..end].fill(0xFF);
        self.erase_count += 1;
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        if self.fail_write {
            return Err(FlashError::WriteFailed);
        }
        let start = addr as usize;
        let end = start + data.len();
        if end > self.data.len() {
            return Err(FlashError::WriteFailed);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        if self.fail_read {
            return Err(FlashError::ReadFailed);
        }
        let start = addr as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(FlashError::ReadFailed);
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}

/// In-memory bonding store with save counters.
#[derive(Default)]
pub struct MemStore {
    pub bonding: Option<([u8; 16], u64)>,
    pub counter_saves: u32,
    pub bonding_saves: u32,
}

impl SecurityStore for MemStore {
    fn load_bonding(&mut self) -> Option<([u8; 16], u64)> {
        self.bonding
    }

    fn save_bonding(&mut self, csrk: &[u8; 16], counter: u64) {
        self.bonding = Some((*csrk, counter));
        self.bonding_saves += 1;
    }

    fn save_counter(&mut self, counter: u64) {
        if let Some((_, ref mut stored)) = self.bonding {
            *stored = counter;
        }
        self.counter_saves += 1;
    }

    fn clear_bonding(&mut self) {
        self.bonding = None;
    }
}

#[derive(Default)]
pub struct TestMotor {
    pub duty: Option<u16>,
    pub calls: u32,
    pub fail: bool,
}

impl MotorDrive for TestMotor {
    fn set_duty(&mut self, duty: u16) -> Result<(), MotorFault> {
        if self.fail {
            return Err(MotorFault);
        }
        self.duty = Some(duty);
        self.calls += 1;
        Ok(())
    }
}

pub struct TestSystem {
    pub battery: u8,
    pub resets: u32,
}

impl Default for TestSystem {
    fn default() -> Self {
        Self {
            battery: 87,
            resets: 0,
        }
    }
}

impl SystemControl for TestSystem {
    fn battery_percent(&mut self) -> u8 {
        self.battery
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

/// Build a well-formed 20-byte authenticated motor packet signed with
/// `key`.
pub fn auth_packet(key: &[u8; 16], counter: u64, duty: u8) -> [u8; MOTOR_AUTH_LEN] {
    let mut packet = [0u8; MOTOR_AUTH_LEN];
    packet[0] = CMD_SET_DUTY;
    for i in 0..6 {
        packet[1 + i] = (counter >> (8 * i)) as u8;
    }
    packet[7] = duty;
    // bytes 8..16 reserved, zero
    let mac = cmac32(key, &packet[..SIGNED_PREFIX_LEN]);
    packet[16..20].copy_from_slice(&mac.to_le_bytes());
    packet
}
