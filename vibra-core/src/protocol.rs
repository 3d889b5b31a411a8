// SPDX-License-Identifier: MIT

//! Wire formats for the motor-control and OTA characteristics.
//!
//! All field extraction goes through the bounds-checked [`ByteReader`];
//! malformed buffers come back as a tagged [`ParseError`], never an
//! out-of-bounds read.
//!
//! Canonical OTA framing (one protocol revision, not a merge of both
//! historical ones): START carries size, CRC16 and version; FINISH is a
//! bare opcode.

use crate::config::{DEVICE_INFO_HEADER, FW_VERSION_MAJOR, FW_VERSION_MINOR};

/// Logical characteristic a transport buffer was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CharacteristicId {
    MotorControl,
    OtaData,
    DeviceInfo,
}

/// Transport-visible status, mirroring ATT error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttStatus {
    Ok,
    InvalidLength,
    ValueNotAllowed,
    InsufficientAuth,
    InsufficientEncryption,
}

impl AttStatus {
    pub fn code(self) -> u8 {
        match self {
            AttStatus::Ok => 0x00,
            AttStatus::InvalidLength => 0x0D,
            AttStatus::ValueNotAllowed => 0x0E,
            AttStatus::InsufficientAuth => 0x05,
            AttStatus::InsufficientEncryption => 0x0F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Buffer too short for the field being read.
    Truncated,
    /// Buffer length does not match any defined packet form.
    BadLength,
    /// First byte is not a defined opcode.
    UnknownOpcode,
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ParseError::Truncated => "buffer truncated",
            ParseError::BadLength => "unexpected packet length",
            ParseError::UnknownOpcode => "unknown opcode",
        };
        f.write_str(s)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParseError {}

/// Cursor over a received buffer with bounds-checked reads.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        let b = *self.buf.get(self.pos).ok_or(ParseError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, ParseError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, ParseError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// 48-bit little-endian counter, widened to u64.
    pub fn read_u48_le(&mut self) -> Result<u64, ParseError> {
        let b = self.take(6)?;
        Ok(u64::from(b[0])
            | u64::from(b[1]) << 8
            | u64::from(b[2]) << 16
            | u64::from(b[3]) << 24
            | u64::from(b[4]) << 32
            | u64::from(b[5]) << 40)
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos.checked_add(n).ok_or(ParseError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(ParseError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }
}

// --- Motor control characteristic ---

/// Legacy packet: `[duty_lo, duty_hi]`.
pub const MOTOR_LEGACY_LEN: usize = 2;
/// Authenticated packet: `cmd:1, counter:6, duty:1, reserved:8, mac:4`.
pub const MOTOR_AUTH_LEN: usize = 20;
/// The single defined authenticated opcode.
pub const CMD_SET_DUTY: u8 = 0x01;

/// A parsed motor-control write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorRequest {
    /// Unauthenticated 2-byte form, duty on the 0..=10000 scale.
    Legacy { duty: u16 },
    /// Authenticated 20-byte form, duty on the 0..=255 scale.
    Authenticated {
        counter: u64,
        duty: u8,
        mac: u32,
    },
}

impl MotorRequest {
    /// Classify and decode a motor-control write by its length.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        match data.len() {
            MOTOR_LEGACY_LEN => {
                let mut r = ByteReader::new(data);
                Ok(MotorRequest::Legacy {
                    duty: r.read_u16_le()?,
                })
            }
            MOTOR_AUTH_LEN => {
                let mut r = ByteReader::new(data);
                let cmd = r.read_u8()?;
                if cmd != CMD_SET_DUTY {
                    return Err(ParseError::UnknownOpcode);
                }
                let counter = r.read_u48_le()?;
                let duty = r.read_u8()?;
                r.take(8)?; // reserved
                let mac = r.read_u32_le()?;
                Ok(MotorRequest::Authenticated { counter, duty, mac })
            }
            _ => Err(ParseError::BadLength),
        }
    }
}

/// Rescale an authenticated-packet duty (0..=255) to the PWM scale
/// (0..=10000).
pub fn rescale_duty(duty: u8) -> u16 {
    (u32::from(duty) * 10000 / 255) as u16
}

// --- OTA characteristic ---

pub const OTA_OP_START: u8 = 0x01;
pub const OTA_OP_DATA: u8 = 0x02;
pub const OTA_OP_FINISH: u8 = 0x03;

const OTA_START_LEN: usize = 8;

/// A decoded OTA command. `Data` borrows its payload from the transport
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaCommand<'a> {
    Start { size: u32, crc16: u16, version: u8 },
    Data { seq: u16, payload: &'a [u8] },
    Finish,
}

impl<'a> OtaCommand<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        let mut r = ByteReader::new(data);
        match r.read_u8()? {
            OTA_OP_START => {
                if data.len() != OTA_START_LEN {
                    return Err(ParseError::BadLength);
                }
                Ok(OtaCommand::Start {
                    size: r.read_u32_le()?,
                    crc16: r.read_u16_le()?,
                    version: r.read_u8()?,
                })
            }
            OTA_OP_DATA => Ok(OtaCommand::Data {
                seq: r.read_u16_le()?,
                payload: r.remaining(),
            }),
            OTA_OP_FINISH => {
                if data.len() != 1 {
                    return Err(ParseError::BadLength);
                }
                Ok(OtaCommand::Finish)
            }
            _ => Err(ParseError::UnknownOpcode),
        }
    }
}

/// Device-to-peer OTA notification, sent as `[status, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaStatus {
    /// Bank erased, ready for data.
    Ready,
    /// Percent of the image written.
    Progress(u8),
    /// Committed; device resets next.
    Success,
    /// Session failed with an [`crate::ota::OtaError`] code byte.
    Error(u8),
}

impl OtaStatus {
    pub fn to_bytes(self) -> [u8; 2] {
        match self {
            OtaStatus::Ready => [0x01, 0x00],
            OtaStatus::Progress(pct) => [0x02, pct],
            OtaStatus::Success => [0x03, 0x00],
            OtaStatus::Error(code) => [0xFF, code],
        }
    }
}

// --- Device info characteristic ---

pub const DEVICE_INFO_LEN: usize = 6;

/// Fixed-format device info response:
/// `[header, cmd, motor_count, fw_lo, fw_hi, battery]`.
pub fn device_info_response(battery_percent: u8) -> [u8; DEVICE_INFO_LEN] {
    [
        DEVICE_INFO_HEADER,
        0x00,
        0x01,
        FW_VERSION_MINOR,
        FW_VERSION_MAJOR,
        battery_percent.min(100),
    ]
}
