// SPDX-License-Identifier: MIT

//! Routes transport-delivered buffers to the motor, OTA engine, or
//! device-info responder, and maps every internal outcome to a
//! transport-visible [`AttStatus`].
//!
//! The dispatcher is the only component that translates internal errors
//! into peer-visible codes; security rejections deliberately collapse
//! into generic failures so a probing peer learns nothing extra.
//!
//! All state is held in explicitly owned objects (no globals): the
//! dispatcher owns the cached boot info, the OTA engine, the replay
//! guard, and the notification queue, and hardware collaborators are
//! threaded in per call through [`DeviceContext`].

use crate::boot_info::{self, BootInfo};
use crate::config::MOTOR_DUTY_MAX;
use crate::flash::{FlashDriver, FlashError};
use crate::notify::NotificationQueue;
use crate::ota::{OtaEngine, OtaState};
use crate::protocol::{
    device_info_response, rescale_duty, AttStatus, CharacteristicId, MotorRequest, OtaCommand,
    OtaStatus, ParseError, DEVICE_INFO_LEN,
};
use crate::security::{AuthError, ReplayConfig, ReplayGuard, SecurityStore};

/// Error code byte for an OTA frame that failed to parse.
const OTA_ERR_BAD_FRAME: u8 = 0x09;
/// Error code byte for an out-of-order DATA sequence number.
const OTA_ERR_BAD_SEQ: u8 = 0x0A;

/// PWM motor output. Duty is on the 0..=10000 scale (0.00%..100.00%).
pub trait MotorDrive {
    fn set_duty(&mut self, duty: u16) -> Result<(), MotorFault>;
}

/// The PWM collaborator rejected the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorFault;

/// Battery gauge and reset, both vendor-provided.
pub trait SystemControl {
    fn battery_percent(&mut self) -> u8;
    fn reset(&mut self);
}

/// Hardware collaborators, threaded into each dispatcher call.
pub struct DeviceContext<'a, F, S, M, C> {
    pub flash: &'a mut F,
    pub store: &'a mut S,
    pub motor: &'a mut M,
    pub system: &'a mut C,
}

/// Top-level command router. One instance per device, constructed at
/// startup.
pub struct Dispatcher {
    boot: BootInfo,
    ota: OtaEngine,
    guard: ReplayGuard,
    notifications: NotificationQueue,
    next_seq: u16,
}

impl Dispatcher {
    /// Startup: load (or default-initialize) boot info and restore
    /// bonding state.
    pub fn new<F, S>(
        flash: &mut F,
        store: &mut S,
        config: ReplayConfig,
    ) -> Result<Self, FlashError>
    where
        F: FlashDriver,
        S: SecurityStore,
    {
        Ok(Self {
            boot: boot_info::load_or_init(flash)?,
            ota: OtaEngine::new(),
            guard: ReplayGuard::load(store, config),
            notifications: NotificationQueue::new(),
            next_seq: 0,
        })
    }

    /// Handle a characteristic write from the transport.
    pub fn handle_write<F, S, M, C>(
        &mut self,
        ctx: &mut DeviceContext<'_, F, S, M, C>,
        characteristic: CharacteristicId,
        data: &[u8],
    ) -> AttStatus
    where
        F: FlashDriver,
        S: SecurityStore,
        M: MotorDrive,
        C: SystemControl,
    {
        match characteristic {
            CharacteristicId::MotorControl => self.handle_motor_write(ctx, data),
            CharacteristicId::OtaData => self.handle_ota_write(ctx, data),
            // Device info is read-only.
            CharacteristicId::DeviceInfo => AttStatus::ValueNotAllowed,
        }
    }

    /// Handle a characteristic read. Only device info is readable.
    pub fn handle_read<F, S, M, C>(
        &mut self,
        ctx: &mut DeviceContext<'_, F, S, M, C>,
        characteristic: CharacteristicId,
    ) -> Option<[u8; DEVICE_INFO_LEN]>
    where
        C: SystemControl,
    {
        match characteristic {
            CharacteristicId::DeviceInfo => {
                Some(device_info_response(ctx.system.battery_percent()))
            }
            _ => None,
        }
    }

    /// Next queued `[status, value]` notification for the peer.
    pub fn pop_notification(&mut self) -> Option<[u8; 2]> {
        self.notifications.pop().map(OtaStatus::to_bytes)
    }

    pub fn on_bonding_complete<S: SecurityStore>(&mut self, store: &mut S, csrk: &[u8; 16]) {
        self.guard.on_bonding_complete(store, csrk);
    }

    /// Connection dropped: flush the replay counter and clear any stuck
    /// OTA session so a reconnecting peer can always start over.
    pub fn on_disconnect<S: SecurityStore>(&mut self, store: &mut S) {
        self.guard.on_disconnect(store);
        self.ota.abort();
    }

    pub fn on_power_loss<S: SecurityStore>(&mut self, store: &mut S) {
        self.guard.on_power_loss(store);
    }

    pub fn boot_info(&self) -> &BootInfo {
        &self.boot
    }

    pub fn ota_state(&self) -> OtaState {
        self.ota.state()
    }

    pub fn ota_progress(&self) -> u8 {
        self.ota.progress()
    }

    pub fn is_bonded(&self) -> bool {
        self.guard.is_bonded()
    }

    fn handle_motor_write<F, S, M, C>(
        &mut self,
        ctx: &mut DeviceContext<'_, F, S, M, C>,
        data: &[u8],
    ) -> AttStatus
    where
        S: SecurityStore,
        M: MotorDrive,
    {
        let request = match MotorRequest::parse(data) {
            Ok(request) => request,
            Err(ParseError::BadLength | ParseError::Truncated) => return AttStatus::InvalidLength,
            Err(ParseError::UnknownOpcode) => return AttStatus::ValueNotAllowed,
        };

        let duty = match request {
            MotorRequest::Legacy { duty } => {
                if duty > MOTOR_DUTY_MAX {
                    return AttStatus::ValueNotAllowed;
                }
                duty
            }
            MotorRequest::Authenticated { counter, duty, mac } => {
                if let Err(e) = self.guard.verify(ctx.store, data, counter, mac) {
                    return match e {
                        AuthError::NotBonded => AttStatus::InsufficientEncryption,
                        AuthError::ReplayRejected => AttStatus::ValueNotAllowed,
                        AuthError::AuthFailed => AttStatus::InsufficientAuth,
                    };
                }
                rescale_duty(duty)
            }
        };

        match ctx.motor.set_duty(duty.min(MOTOR_DUTY_MAX)) {
            Ok(()) => AttStatus::Ok,
            Err(MotorFault) => AttStatus::ValueNotAllowed,
        }
    }

    fn handle_ota_write<F, S, M, C>(
        &mut self,
        ctx: &mut DeviceContext<'_, F, S, M, C>,
        data: &[u8],
    ) -> AttStatus
    where
        F: FlashDriver,
        C: SystemControl,
    {
        let command = match OtaCommand::parse(data) {
            Ok(command) => command,
            Err(_) => {
                // A malformed frame mid-session means the peer and device
                // disagree; kill the session rather than strand it.
                self.ota.abort();
                self.notifications.publish(OtaStatus::Error(OTA_ERR_BAD_FRAME));
                return AttStatus::ValueNotAllowed;
            }
        };

        match command {
            OtaCommand::Start {
                size,
                crc16,
                version,
            } => match self.ota.start(ctx.flash, &self.boot, size, crc16, version) {
                Ok(()) => {
                    self.next_seq = 0;
                    self.notifications.publish(OtaStatus::Ready);
                    AttStatus::Ok
                }
                Err(e) => {
                    self.notifications.publish(OtaStatus::Error(e.code()));
                    AttStatus::ValueNotAllowed
                }
            },
            OtaCommand::Data { seq, payload } => {
                if seq != self.next_seq {
                    self.ota.abort();
                    self.notifications.publish(OtaStatus::Error(OTA_ERR_BAD_SEQ));
                    return AttStatus::ValueNotAllowed;
                }
                match self.ota.data(ctx.flash, payload) {
                    Ok(()) => {
                        self.next_seq = self.next_seq.wrapping_add(1);
                        self.notifications
                            .publish(OtaStatus::Progress(self.ota.progress()));
                        AttStatus::Ok
                    }
                    Err(e) => {
                        self.notifications.publish(OtaStatus::Error(e.code()));
                        AttStatus::ValueNotAllowed
                    }
                }
            }
            OtaCommand::Finish => match self.ota.end(ctx.flash, &mut self.boot) {
                Ok(()) => {
                    self.notifications.publish(OtaStatus::Success);
                    // Boot the new image deliberately, not as a side
                    // effect of whatever runs next.
                    ctx.system.reset();
                    AttStatus::Ok
                }
                Err(e) => {
                    self.notifications.publish(OtaStatus::Error(e.code()));
                    AttStatus::ValueNotAllowed
                }
            },
        }
    }
}
