//! Unified error types for the OL305 lock controller.
//!
//! A single `Error` enum that every subsystem converts into, so callers at
//! the edge (the firmware entry point, the control facade) handle failures
//! uniformly.  All variants are `Copy` so they can be passed through the
//! state machine and event sink without allocation.
//!
//! None of these are fatal to the lock task: codec errors drop the frame,
//! transport and protocol errors resolve to a `Disconnecting` transition,
//! configuration errors are rejected at the call boundary.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The BLE link could not be opened or written.
    Transport(TransportError),
    /// An inbound frame failed validation or an outbound one could not be built.
    Codec(CodecError),
    /// The lock answered with a command-error code.
    Protocol(ProtocolViolation),
    /// Address, password or settings were rejected.
    Config(ConfigError),
    /// A blocking control request gave up waiting.
    Control(ControlError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Control(e) => write!(f, "control: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Bluetooth controller / host stack failed to come up.
    StackInitFailed,
    /// Connection attempt to the lock failed.
    OpenFailed,
    /// A write was attempted with no ready link.
    NotConnected,
    /// The lock did not acknowledge a write.
    WriteFailed,
    /// Service or characteristic lookup on the lock failed.
    CharacteristicMissing,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackInitFailed => write!(f, "BLE stack initialisation failed"),
            Self::OpenFailed => write!(f, "connection open failed"),
            Self::NotConnected => write!(f, "link not connected"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::CharacteristicMissing => write!(f, "lock characteristic not found"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer than the minimum 8 bytes on the wire.
    TooShort,
    /// Trailing CRC8 does not match the frame contents.
    CrcMismatch,
    /// Start-of-frame marker is not `0xA3A4`.
    BadMagic,
    /// Declared or supplied payload length exceeds the protocol limit.
    PayloadTooLarge,
    /// Declared payload length disagrees with the number of bytes received.
    LengthMismatch,
    /// Frame carries a session key other than the negotiated one.
    KeyMismatch,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "frame too short"),
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::BadMagic => write!(f, "bad start-of-frame marker"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::LengthMismatch => write!(f, "length field does not match frame size"),
            Self::KeyMismatch => write!(f, "session key mismatch"),
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol violations reported by the lock
// ---------------------------------------------------------------------------

/// Error codes carried in a `0x10` command-error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// The lock rejected a frame's CRC.
    CrcAuthentication,
    /// A command arrived before the session key was exchanged.
    KeyNotObtained,
    /// A command carried the wrong session key.
    KeyMismatch,
    /// Any other code.
    Other(u8),
}

impl ProtocolViolation {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::CrcAuthentication,
            0x02 => Self::KeyNotObtained,
            0x03 => Self::KeyMismatch,
            other => Self::Other(other),
        }
    }

    /// Key errors leave the session unusable; the link must be rebuilt.
    pub fn forces_disconnect(self) -> bool {
        matches!(self, Self::KeyNotObtained | Self::KeyMismatch)
    }
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrcAuthentication => write!(f, "CRC authentication error"),
            Self::KeyNotObtained => write!(f, "BLE key not obtained"),
            Self::KeyMismatch => write!(f, "BLE key error"),
            Self::Other(code) => write!(f, "unknown error code 0x{code:02x}"),
        }
    }
}

impl From<ProtocolViolation> for Error {
    fn from(e: ProtocolViolation) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Pairing password must be 4–8 printable ASCII bytes.
    InvalidPassword,
    /// Device address must be exactly six bytes.
    InvalidMac,
    /// A settings flag was outside `0..=2`.
    SettingOutOfRange(u8),
    /// RFID card numbers are exactly eight bytes.
    InvalidCardLength,
    /// A timing parameter was zero.
    InvalidInterval(&'static str),
    /// The configuration document could not be parsed.
    Parse,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPassword => write!(f, "password must be 4-8 ASCII characters"),
            Self::InvalidMac => write!(f, "MAC address must be 6 bytes"),
            Self::SettingOutOfRange(v) => write!(f, "setting flag {v} out of range (0-2)"),
            Self::InvalidCardLength => write!(f, "RFID card number must be 8 bytes"),
            Self::InvalidInterval(name) => write!(f, "{name} must be non-zero"),
            Self::Parse => write!(f, "configuration could not be parsed"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Control facade errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// The requested target state was not reached before the deadline.
    Timeout,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out waiting for target state"),
        }
    }
}

impl From<ControlError> for Error {
    fn from(e: ControlError) -> Self {
        Self::Control(e)
    }
}
