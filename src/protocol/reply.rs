//! Interpretation of decoded frames from the lock.
//!
//! [`LockReply::parse`] is the single dispatch point from command byte to
//! meaning.  It never indexes past the payload: a reply too short for its
//! command comes back as [`LockReply::Malformed`].

use super::codec::DecodedMessage;
use super::commands::{CARD_LEN, RfidCard};
use super::CommandCode;
use crate::error::ProtocolViolation;

/// Observed or expected lock position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum LockStatus {
    #[default]
    Unknown,
    Locked,
    Unlocked,
}

/// Outcome byte shared by the unlock and lock replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Other(u8),
}

impl Outcome {
    fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::Success,
            0x02 => Self::Failure,
            other => Self::Other(other),
        }
    }
}

/// Progress of an RFID registration started with `ReadRfid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfidRegistration {
    ReadingStarted,
    Registered(RfidCard),
    Failed,
    AlreadyExists,
    Other(u8),
}

/// Result of a `DeleteRfid` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfidDeletion {
    Deleted,
    /// Delete failed or the card is not enrolled.
    NotFound,
    Other(u8),
}

/// A settings flag as reported back by the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Off,
    On,
    Other(u8),
}

impl SwitchState {
    fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::Off,
            0x02 => Self::On,
            other => Self::Other(other),
        }
    }
}

/// The lock's current unlock-method configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsReport {
    pub ble_unlock: SwitchState,
    pub button_unlock: SwitchState,
    pub rfid_unlock: SwitchState,
}

/// Every reply the controller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReply {
    /// Reply to the key exchange; `accepted` when the echoed key matches.
    SessionKey { key: u8, accepted: bool },
    Unlock(Outcome),
    CommandError(ProtocolViolation),
    Lock(Outcome),
    /// `status` is `None` when neither status bit is set.
    Status {
        battery_mv: u32,
        status: Option<LockStatus>,
    },
    RfidRegistration(RfidRegistration),
    RfidDeletion(RfidDeletion),
    Settings(SettingsReport),
    /// Known command the controller does not act on.
    Unhandled(CommandCode),
    Unknown(u8),
    /// Payload too short for the command it claims to be.
    Malformed(CommandCode),
}

const STATUS_UNLOCKED_BIT: u8 = 1 << 0;
const STATUS_LOCKED_BIT: u8 = 1 << 1;

impl LockReply {
    pub fn parse(msg: &DecodedMessage) -> Self {
        let Ok(code) = CommandCode::try_from(msg.cmd) else {
            return Self::Unknown(msg.cmd);
        };
        let p = &msg.payload[..];
        let first = p.first().copied();

        let reply = match code {
            CommandCode::BleKey => p.get(1).map(|&echo| Self::SessionKey {
                key: msg.key,
                accepted: echo == msg.key,
            }),
            CommandCode::Unlock => first.map(|b| Self::Unlock(Outcome::from_code(b))),
            CommandCode::CommandError => {
                first.map(|b| Self::CommandError(ProtocolViolation::from_code(b)))
            }
            CommandCode::Lock => first.map(|b| Self::Lock(Outcome::from_code(b))),
            CommandCode::QueryInfo => parse_status(p),
            CommandCode::RegisterRfid => first.and_then(|b| {
                Some(Self::RfidRegistration(match b {
                    0x00 => RfidRegistration::ReadingStarted,
                    0x01 => {
                        let card = RfidCard::from_slice(p.get(1..1 + CARD_LEN)?).ok()?;
                        RfidRegistration::Registered(card)
                    }
                    0x02 => RfidRegistration::Failed,
                    0x03 => RfidRegistration::AlreadyExists,
                    other => RfidRegistration::Other(other),
                }))
            }),
            CommandCode::DeleteRfid => first.map(|b| {
                Self::RfidDeletion(match b {
                    0x00 => RfidDeletion::NotFound,
                    0x01 => RfidDeletion::Deleted,
                    other => RfidDeletion::Other(other),
                })
            }),
            CommandCode::LockSettings => match p {
                [ble, button, rfid, ..] => Some(Self::Settings(SettingsReport {
                    ble_unlock: SwitchState::from_code(*ble),
                    button_unlock: SwitchState::from_code(*button),
                    rfid_unlock: SwitchState::from_code(*rfid),
                })),
                _ => None,
            },
            CommandCode::BleKeySetting
            | CommandCode::ObtainLastUsage
            | CommandCode::DeleteLastUsage
            | CommandCode::GetRfid => Some(Self::Unhandled(code)),
        };

        reply.unwrap_or(Self::Malformed(code))
    }
}

fn parse_status(p: &[u8]) -> Option<LockReply> {
    let &[hi, lo, bits, ..] = p else {
        return None;
    };
    // Unlocked wins when the lock reports both bits.
    let status = if bits & STATUS_UNLOCKED_BIT != 0 {
        Some(LockStatus::Unlocked)
    } else if bits & STATUS_LOCKED_BIT != 0 {
        Some(LockStatus::Locked)
    } else {
        None
    };
    Some(LockReply::Status {
        battery_mv: u32::from(u16::from_be_bytes([hi, lo])) * 10,
        status,
    })
}
