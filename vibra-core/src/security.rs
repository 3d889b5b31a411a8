// SPDX-License-Identifier: MIT

//! Replay-protected packet authentication.
//!
//! Every authenticated command carries a monotonically increasing 48-bit
//! counter and a 32-bit MAC (AES-CMAC-128 truncated) computed under the
//! CSRK installed at bonding time. The guard keeps the last accepted
//! counter in RAM and checkpoints it through [`SecurityStore`] every
//! `save_interval` packets; disconnect and power-down force a checkpoint
//! so a reboot can never re-open an already-spent counter window.

use aes::Aes128;
use cmac::{Cmac, Mac};

use crate::config::{COUNTER_MAX_DELTA, COUNTER_SAVE_INTERVAL};

/// Number of packet bytes covered by the MAC.
pub const SIGNED_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuthError {
    /// No peer bonded; no detail about counter/MAC is leaked.
    NotBonded,
    /// Counter not strictly increasing, or an implausible jump.
    ReplayRejected,
    /// MAC mismatch.
    AuthFailed,
}

impl core::fmt::Display for AuthError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            AuthError::NotBonded => "no bonded peer",
            AuthError::ReplayRejected => "counter replayed or out of window",
            AuthError::AuthFailed => "authentication failed",
        };
        f.write_str(s)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AuthError {}

/// Bonding persistence collaborator (vendor key-value storage).
pub trait SecurityStore {
    /// Returns the bonded CSRK and last checkpointed counter, if any.
    fn load_bonding(&mut self) -> Option<([u8; 16], u64)>;
    fn save_bonding(&mut self, csrk: &[u8; 16], counter: u64);
    fn save_counter(&mut self, counter: u64);
    fn clear_bonding(&mut self);
}

/// Tuning knobs for the replay window.
#[derive(Debug, Clone, Copy)]
pub struct ReplayConfig {
    /// Accepted packets between counter checkpoints. At most
    /// `save_interval - 1` counter values are replayable after an unclean
    /// power cut, and only if no disconnect flush ran first.
    pub save_interval: u32,
    /// Largest counter jump tolerated for packet loss; anything bigger is
    /// treated as forged or corrupt.
    pub max_counter_delta: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            save_interval: COUNTER_SAVE_INTERVAL,
            max_counter_delta: COUNTER_MAX_DELTA,
        }
    }
}

/// Verifies inbound authenticated packets and owns the bonding state.
pub struct ReplayGuard {
    csrk: [u8; 16],
    last_counter: u64,
    packets_since_save: u32,
    bonded: bool,
    config: ReplayConfig,
}

impl ReplayGuard {
    /// Fresh, unbonded guard.
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            csrk: [0; 16],
            last_counter: 0,
            packets_since_save: 0,
            bonded: false,
            config,
        }
    }

    /// Startup path: restore bonding state from persistent storage.
    pub fn load<S: SecurityStore>(store: &mut S, config: ReplayConfig) -> Self {
        let mut guard = Self::new(config);
        if let Some((csrk, counter)) = store.load_bonding() {
            guard.csrk = csrk;
            guard.last_counter = counter;
            guard.bonded = true;
        }
        guard
    }

    pub fn is_bonded(&self) -> bool {
        self.bonded
    }

    pub fn last_counter(&self) -> u64 {
        self.last_counter
    }

    /// Verify a packet's counter and MAC; advance the counter only on
    /// full success.
    ///
    /// `packet` is the raw packet; the MAC covers its first
    /// [`SIGNED_PREFIX_LEN`] bytes. A counter below the last accepted one
    /// means the 48-bit counter wrapped or was forged: bonding is cleared
    /// so the peer must re-pair.
    pub fn verify<S: SecurityStore>(
        &mut self,
        store: &mut S,
        packet: &[u8],
        counter: u64,
        mac: u32,
    ) -> Result<(), AuthError> {
        if !self.bonded {
            return Err(AuthError::NotBonded);
        }

        if counter <= self.last_counter {
            if counter < self.last_counter {
                #[cfg(feature = "defmt")]
                defmt::warn!("counter went backwards, clearing bonding");
                self.clear_bonding(store);
            }
            return Err(AuthError::ReplayRejected);
        }
        if counter - self.last_counter > self.config.max_counter_delta {
            return Err(AuthError::ReplayRejected);
        }

        let signed = packet.get(..SIGNED_PREFIX_LEN).ok_or(AuthError::AuthFailed)?;
        if cmac32(&self.csrk, signed) != mac {
            return Err(AuthError::AuthFailed);
        }

        self.last_counter = counter;
        self.packets_since_save += 1;
        if self.packets_since_save >= self.config.save_interval {
            store.save_counter(self.last_counter);
            self.packets_since_save = 0;
        }

        Ok(())
    }

    /// Install a freshly bonded key. Bonding is rare, so the state is
    /// persisted immediately, which also closes the replay window.
    pub fn on_bonding_complete<S: SecurityStore>(&mut self, store: &mut S, csrk: &[u8; 16]) {
        self.csrk = *csrk;
        self.last_counter = 0;
        self.packets_since_save = 0;
        self.bonded = true;
        store.save_bonding(csrk, 0);
    }

    /// Flush any accepted-but-unsaved counter value.
    pub fn on_disconnect<S: SecurityStore>(&mut self, store: &mut S) {
        if self.packets_since_save > 0 {
            store.save_counter(self.last_counter);
            self.packets_since_save = 0;
        }
    }

    /// Same flush as [`Self::on_disconnect`], on the power-down path.
    pub fn on_power_loss<S: SecurityStore>(&mut self, store: &mut S) {
        self.on_disconnect(store);
    }

    /// Drop the bonded key and counter; the peer must re-pair.
    pub fn clear_bonding<S: SecurityStore>(&mut self, store: &mut S) {
        self.csrk = [0; 16];
        self.last_counter = 0;
        self.packets_since_save = 0;
        self.bonded = false;
        store.clear_bonding();
    }
}

/// AES-CMAC-128 truncated to its first 32 bits, little-endian.
pub fn cmac32(key: &[u8; 16], data: &[u8]) -> u32 {
    let mut mac = <Cmac<Aes128> as Mac>::new(key.into());
    mac.update(data);
    let tag = mac.finalize().into_bytes();
    u32::from_le_bytes([tag[0], tag[1], tag[2], tag[3]])
}
