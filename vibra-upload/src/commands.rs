// SPDX-License-Identifier: MIT

//! Command implementations.
//!
//! `simulate` drives the exact same update engine the device runs,
//! against a Vec-backed flash, so an image can be validated end to end
//! before any hardware sees it.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use vibra_core::boot_info::{self, BootInfo};
use vibra_core::flash::{FlashDriver, FlashError, CRC16};
use vibra_core::ota::OtaEngine;
use vibra_core::{BANK_SIZE, FLASH_SECTOR_SIZE};

/// DATA packet payload ceiling: opcode + seq must still fit a 247-byte
/// BLE MTU alongside the payload.
const MAX_MTU: usize = 244;

/// Show image size, CRC16 and whether it fits a bank.
pub fn info(file: &Path) -> Result<()> {
    let firmware = read_firmware(file)?;
    let size = firmware.len() as u32;
    let crc16 = CRC16.checksum(&firmware);
    let sectors = size.div_ceil(FLASH_SECTOR_SIZE);

    println!("Firmware: {}", file.display());
    println!("  Size:    {} bytes ({} sectors)", size, sectors);
    println!("  CRC16:   0x{:04x}", crc16);
    println!(
        "  Bank fit: {} ({} / {} bytes)",
        if size <= BANK_SIZE { "yes" } else { "NO" },
        size,
        BANK_SIZE
    );

    Ok(())
}

/// Generate the START / DATA / FINISH packet stream for an image.
///
/// With `--out` the packets are written length-prefixed (u16 LE) for
/// replay by transport glue; otherwise a hex dump goes to stdout.
pub fn packets(file: &Path, mtu: usize, version: u8, out: Option<&Path>) -> Result<()> {
    let firmware = read_firmware(file)?;
    let stream = packet_stream(&firmware, mtu, version)?;

    match out {
        Some(path) => {
            let mut encoded = Vec::new();
            for packet in &stream {
                encoded.extend_from_slice(&(packet.len() as u16).to_le_bytes());
                encoded.extend_from_slice(packet);
            }
            fs::write(path, &encoded)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {} packets to {}", stream.len(), path.display());
        }
        None => {
            for packet in &stream {
                let hex: String = packet.iter().map(|b| format!("{:02x}", b)).collect();
                println!("{}", hex);
            }
        }
    }

    Ok(())
}

/// Feed an image through the update engine against an in-memory flash
/// and report the resulting boot info.
pub fn simulate(file: &Path, version: u8, mtu: usize) -> Result<()> {
    let firmware = read_firmware(file)?;
    if mtu == 0 || mtu > MAX_MTU {
        bail!("mtu must be between 1 and {}", MAX_MTU);
    }

    let size = firmware.len() as u32;
    let crc16 = CRC16.checksum(&firmware);

    let mut flash = SimFlash::new();
    let mut boot = boot_info::load_or_init(&mut flash)?;
    let mut engine = OtaEngine::new();

    println!(
        "Simulating update: {} bytes, CRC16 0x{:04x}, version {}",
        size, crc16, version
    );
    println!(
        "Active bank before: {:?} (version {})",
        boot.active_bank,
        boot.bank(boot.active_bank).version
    );

    engine.start(&mut flash, &boot, size, crc16, version)?;

    let pb = ProgressBar::new(size as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {bytes}/{total_bytes}")?
            .progress_chars("#>-"),
    );

    for chunk in firmware.chunks(mtu) {
        engine.data(&mut flash, chunk)?;
        pb.inc(chunk.len() as u64);
    }
    pb.finish();

    engine.end(&mut flash, &mut boot)?;

    report(&mut flash, &boot, size)?;
    Ok(())
}

fn report(flash: &mut SimFlash, boot: &BootInfo, size: u32) -> Result<()> {
    let target = boot.active_bank;
    let info = boot.bank(target);

    println!();
    println!("Update committed:");
    println!("  Active bank:  {:?}", target);
    println!("  Version:      {}", info.version);
    println!("  Size:         {} bytes", info.size);
    println!("  CRC16:        0x{:04x}", info.crc16);

    // Cross-check against what actually landed in the simulated flash.
    let written = vibra_core::flash::crc16_of(flash, info.address, size)?;
    if written != info.crc16 {
        bail!(
            "flash contents disagree with boot info: 0x{:04x} != 0x{:04x}",
            written,
            info.crc16
        );
    }
    let persisted = boot_info::load(flash)
        .context("boot info did not survive a reload from simulated flash")?;
    if persisted != *boot {
        bail!("persisted boot info disagrees with the committed record");
    }

    println!("  Verification: OK");
    Ok(())
}

/// Build the wire packets for one update session.
fn packet_stream(firmware: &[u8], mtu: usize, version: u8) -> Result<Vec<Vec<u8>>> {
    if mtu == 0 || mtu > MAX_MTU {
        bail!("mtu must be between 1 and {}", MAX_MTU);
    }
    let size = firmware.len() as u32;
    if size == 0 || size > BANK_SIZE {
        bail!(
            "image size {} is outside the valid range 1..={}",
            size,
            BANK_SIZE
        );
    }

    let crc16 = CRC16.checksum(firmware);
    let mut stream = Vec::with_capacity(firmware.len() / mtu + 2);

    let mut start = vec![0x01];
    start.extend_from_slice(&size.to_le_bytes());
    start.extend_from_slice(&crc16.to_le_bytes());
    start.push(version);
    stream.push(start);

    for (seq, chunk) in firmware.chunks(mtu).enumerate() {
        let mut data = vec![0x02];
        data.extend_from_slice(&(seq as u16).to_le_bytes());
        data.extend_from_slice(chunk);
        stream.push(data);
    }

    stream.push(vec![0x03]);
    Ok(stream)
}

fn read_firmware(file: &Path) -> Result<Vec<u8>> {
    let firmware =
        fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    if firmware.is_empty() {
        bail!("{} is empty", file.display());
    }
    Ok(firmware)
}

/// Vec-backed flash standing in for the device part.
struct SimFlash {
    data: Vec<u8>,
}

impl SimFlash {
    fn new() -> Self {
        Self {
            data: vec![0xFF; 1024 * 1024],
        }
    }
}

impl FlashDriver for SimFlash {
    fn erase_sector(&mut self, addr: u32) -> Result<(), FlashError> {
        if addr % FLASH_SECTOR_SIZE != 0 {
            return Err(FlashError::Unaligned);
        }
        let start = addr as usize;
        let end = start + FLASH_SECTOR_SIZE as usize;
        if end > self.data.len() {
            return Err(FlashError::EraseFailed);
        }
        self.data[start..end].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        let start = addr as usize;
        let end = start + data.len();
        if end > self.data.len() {
            return Err(FlashError::WriteFailed);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let start = addr as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(FlashError::ReadFailed);
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}
