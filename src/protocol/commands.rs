//! Outbound commands and their `(cmd, payload)` encoding.

use serde::{Deserialize, Serialize};

use super::{CommandCode, Payload};
use crate::error::ConfigError;

/// Payload byte that acknowledges an unlock / lock notification.
const ACK_BYTE: u8 = 0x02;

/// Length of an RFID card number.
pub const CARD_LEN: usize = 8;

// ───────────────────────────────────────────────────────────────
// Lock settings
// ───────────────────────────────────────────────────────────────

/// One unlock method switch as understood by the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FeatureSwitch {
    /// Leave the current setting untouched.
    Keep = 0,
    Off = 1,
    On = 2,
}

impl TryFrom<u8> for FeatureSwitch {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Keep),
            1 => Ok(Self::Off),
            2 => Ok(Self::On),
            other => Err(ConfigError::SettingOutOfRange(other)),
        }
    }
}

/// Which unlock methods the lock accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSettings {
    pub ble_unlock: FeatureSwitch,
    pub button_unlock: FeatureSwitch,
    pub rfid_unlock: FeatureSwitch,
}

impl LockSettings {
    /// Build from raw wire flags, rejecting anything outside `0..=2`.
    pub fn from_raw(ble: u8, button: u8, rfid: u8) -> Result<Self, ConfigError> {
        Ok(Self {
            ble_unlock: ble.try_into()?,
            button_unlock: button.try_into()?,
            rfid_unlock: rfid.try_into()?,
        })
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [
            self.ble_unlock as u8,
            self.button_unlock as u8,
            self.rfid_unlock as u8,
        ]
    }
}

impl Default for LockSettings {
    /// BLE unlock on, button and RFID unlock off.
    fn default() -> Self {
        Self {
            ble_unlock: FeatureSwitch::On,
            button_unlock: FeatureSwitch::Off,
            rfid_unlock: FeatureSwitch::Off,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// RFID cards
// ───────────────────────────────────────────────────────────────

/// An 8-byte RFID card number.  All zeros addresses every card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RfidCard(pub [u8; CARD_LEN]);

impl RfidCard {
    pub const ALL: Self = Self([0; CARD_LEN]);

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let card: [u8; CARD_LEN] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidCardLength)?;
        Ok(Self(card))
    }

    pub fn is_all(&self) -> bool {
        *self == Self::ALL
    }
}

impl core::fmt::Display for RfidCard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Unlock request
// ───────────────────────────────────────────────────────────────

/// Fields of an unlock command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockRequest {
    pub control_cmd: u8,
    pub user_id: u32,
    /// Milliseconds since boot, truncated to 32 bits.
    pub timestamp: u32,
    pub unlock_status: u8,
}

impl UnlockRequest {
    /// Standard unlock issued by this controller (user 1).
    pub fn at(now_ms: u64) -> Self {
        Self {
            control_cmd: 0x01,
            user_id: 1,
            timestamp: now_ms as u32,
            unlock_status: 0x00,
        }
    }

    fn to_bytes(self) -> [u8; 10] {
        let mut out = [0u8; 10];
        out[0] = self.control_cmd;
        out[1..5].copy_from_slice(&self.user_id.to_be_bytes());
        out[5..9].copy_from_slice(&self.timestamp.to_be_bytes());
        out[9] = self.unlock_status;
        out
    }
}

// ───────────────────────────────────────────────────────────────
// Outbound command
// ───────────────────────────────────────────────────────────────

/// A frame the controller sends to the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Present the pairing password to obtain a session key.
    SessionKeyExchange(heapless::String<8>),
    Unlock(UnlockRequest),
    /// Acknowledge the lock's unlock notification.
    UnlockAck,
    /// Acknowledge the lock's lock notification.
    LockAck,
    QueryInfo,
    /// Put the lock's reader into registration mode.
    ReadRfid,
    DeleteRfid(RfidCard),
    PushSettings(LockSettings),
}

impl OutboundCommand {
    pub fn code(&self) -> CommandCode {
        match self {
            Self::SessionKeyExchange(_) => CommandCode::BleKey,
            Self::Unlock(_) | Self::UnlockAck => CommandCode::Unlock,
            Self::LockAck => CommandCode::Lock,
            Self::QueryInfo => CommandCode::QueryInfo,
            Self::ReadRfid => CommandCode::RegisterRfid,
            Self::DeleteRfid(_) => CommandCode::DeleteRfid,
            Self::PushSettings(_) => CommandCode::LockSettings,
        }
    }

    /// Clear-text payload for this command.
    pub fn payload(&self) -> Payload {
        let mut out = Payload::new();
        // Every payload below is at most 10 bytes.
        let pushed: Result<(), ()> = match self {
            Self::SessionKeyExchange(password) => out.extend_from_slice(password.as_bytes()),
            Self::Unlock(req) => out.extend_from_slice(&req.to_bytes()),
            Self::UnlockAck | Self::LockAck => out.push(ACK_BYTE).map_err(|_| ()),
            Self::QueryInfo | Self::ReadRfid => out.push(0x01).map_err(|_| ()),
            Self::DeleteRfid(card) => out.extend_from_slice(&card.0),
            Self::PushSettings(settings) => out.extend_from_slice(&settings.to_bytes()),
        };
        debug_assert!(pushed.is_ok(), "{:?} payload exceeds capacity", self.code());
        out
    }
}
