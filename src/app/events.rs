//! Outbound lock events.
//!
//! The [`LockService`](super::service::LockService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, publish over MQTT,
//! forward to a UI.

use crate::fsm::StateId;
use crate::protocol::reply::{LockStatus, RfidDeletion, RfidRegistration, SettingsReport};

/// Structured events emitted by the lock service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    /// The service has started (carries initial state).
    Started(StateId),

    /// The state machine moved between states.
    StateChanged { from: StateId, to: StateId },

    /// The lock accepted the pairing password.
    SessionEstablished { key: u8 },

    /// Answer to an explicit status query.
    StatusReport { status: LockStatus, battery_mv: u32 },

    /// Observed position differs from the one last commanded.
    StatusMismatch {
        expected: LockStatus,
        observed: LockStatus,
    },

    /// The lock confirmed it is unlocked after an unlock request.
    Unlocked { attempts: u16 },

    /// Unlock was requested while the lock already reported unlocked.
    AlreadyUnlocked,

    /// The configured unlock retry limit ran out.
    UnlockAbandoned { attempts: u16 },

    /// The lock reported it locked itself.
    Locked,

    RfidRegistration(RfidRegistration),
    RfidDeletion(RfidDeletion),
    Settings(SettingsReport),

    /// The service stopped after a Shutdown request.
    Stopped,
}
