//! OL305 application protocol.
//!
//! Every exchange with the lock is a single obfuscated, CRC-protected frame
//! written to (or notified from) one GATT characteristic:
//!
//! ```text
//! ┌──────────┬─────┬──────────┬─────────┬─────────┬───────────────┬──────┐
//! │ STX (2B) │ len │ rand+32h │ key^rnd │ cmd^rnd │ payload^rnd … │ crc8 │
//! │ A3 A4 BE │ 1B  │ 1B       │ 1B      │ 1B      │ len bytes     │ 1B   │
//! └──────────┴─────┴──────────┴─────────┴─────────┴───────────────┴──────┘
//! ```
//!
//! - [`crc`]: the CRC8 lookup table.
//! - [`codec`]: frame encode / decode.
//! - [`commands`]: outbound command → `(cmd, payload)` mapping.
//! - [`reply`]: decoded frame → typed [`reply::LockReply`].

pub mod codec;
pub mod commands;
pub mod crc;
pub mod reply;

use core::fmt;

/// Start-of-frame marker, serialised big-endian.
pub const STX: u16 = 0xA3A4;

/// Largest frame the lock firmware handles.
pub const MAX_MSG_LEN: usize = 22;

/// Largest payload an outbound frame may carry.
pub const MAX_PAYLOAD_LEN: usize = MAX_MSG_LEN - 5;

/// STX + len + rand + key + cmd.
pub const HEADER_LEN: usize = 6;

/// Header plus trailing CRC.
pub const FRAME_OVERHEAD: usize = HEADER_LEN + 1;

/// Capacity of a frame buffer (largest payload plus overhead).
pub const FRAME_CAPACITY: usize = MAX_PAYLOAD_LEN + FRAME_OVERHEAD;

/// Offset added to the obfuscation byte before it goes on the wire.
pub const RAND_OFFSET: u8 = 0x32;

/// A complete encoded frame.
pub type Frame = heapless::Vec<u8, FRAME_CAPACITY>;

/// Decoded payload bytes.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD_LEN>;

// ── GATT identification ─────────────────────────────────────────

/// Lock service (`6e400001-b5a3-f393-e0a9-e50e24dcca9e`).
pub const SERVICE_UUID: u128 = 0x6e400001_b5a3_f393_e0a9_e50e24dcca9e;
/// Characteristic the controller writes frames to.
pub const WRITE_CHAR_UUID: u128 = 0x6e400002_b5a3_f393_e0a9_e50e24dcca9e;
/// Characteristic the lock notifies replies on.
pub const NOTIFY_CHAR_UUID: u128 = 0x6e400003_b5a3_f393_e0a9_e50e24dcca9e;
/// Client characteristic configuration descriptor.
pub const CCCD_UUID: u16 = 0x2902;

// ── Command codes ───────────────────────────────────────────────

/// Command byte carried in every frame, in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    BleKey = 0x01,
    Unlock = 0x05,
    CommandError = 0x10,
    Lock = 0x15,
    BleKeySetting = 0x20,
    QueryInfo = 0x31,
    ObtainLastUsage = 0x51,
    DeleteLastUsage = 0x52,
    LockSettings = 0x61,
    RegisterRfid = 0x85,
    DeleteRfid = 0x86,
    GetRfid = 0x87,
}

impl CommandCode {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => Self::BleKey,
            0x05 => Self::Unlock,
            0x10 => Self::CommandError,
            0x15 => Self::Lock,
            0x20 => Self::BleKeySetting,
            0x31 => Self::QueryInfo,
            0x51 => Self::ObtainLastUsage,
            0x52 => Self::DeleteLastUsage,
            0x61 => Self::LockSettings,
            0x85 => Self::RegisterRfid,
            0x86 => Self::DeleteRfid,
            0x87 => Self::GetRfid,
            other => return Err(other),
        })
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02x})", self, self.code())
    }
}
