//! Inbound intents to the lock service.
//!
//! These represent actions requested by the outside world (console, RPC,
//! another task) through [`LockControl`](super::control::LockControl).
//! The service hands them to the state machine one at a time.

use crate::protocol::commands::{LockSettings, RfidCard};

/// The single command waiting to go out on the next Connected tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingCommand {
    /// Unlock and keep re-sending until the lock reports unlocked.
    Unlock,
    /// Query and report status and battery once known.
    QueryInfo,
    /// Acknowledge an unlock notification from the lock.
    UnlockAck,
    /// Acknowledge a lock notification from the lock.
    LockAck,
    /// Start RFID card registration.
    ReadRfid,
    DeleteRfid(RfidCard),
    PushSettings(LockSettings),
}

impl PendingCommand {
    /// Protocol acknowledgements the service queues itself.
    pub fn is_ack(self) -> bool {
        matches!(self, Self::UnlockAck | Self::LockAck)
    }
}

/// Desired connection lifecycle, set by callers and read every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TargetState {
    /// Connect and stay connected.
    #[default]
    Enable = 0,
    /// Disconnect and idle.
    Disable = 1,
    /// Disconnect and end the lock task.
    Shutdown = 2,
}

impl TargetState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Enable,
            2 => Self::Shutdown,
            _ => Self::Disable,
        }
    }

    /// Disable and Shutdown both tear the session down.
    pub fn wants_disconnect(self) -> bool {
        !matches!(self, Self::Enable)
    }
}
