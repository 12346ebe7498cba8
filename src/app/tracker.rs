//! Last-known lock position, expected position and battery level.
//!
//! Updated only from decoded replies (and by the Connected handler when an
//! unlock is confirmed).  The expected position survives a reconnect; the
//! observed one does not.

use crate::protocol::reply::LockStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockTracker {
    /// Position from the most recent status reply.
    pub status: LockStatus,
    /// Position the controller last commanded or adopted.
    pub expected: LockStatus,
    pub battery_mv: u32,
}

/// Observed position disagrees with the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMismatch {
    pub expected: LockStatus,
    pub observed: LockStatus,
}

impl LockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status reply.  A reply with neither status bit set only
    /// refreshes the battery reading.
    pub fn apply_status(&mut self, battery_mv: u32, status: Option<LockStatus>) {
        self.battery_mv = battery_mv;
        if let Some(status) = status {
            self.status = status;
        }
    }

    /// Compare observed against expected.  With no expectation yet, the
    /// observed position is adopted.
    pub fn reconcile(&mut self) -> Option<StatusMismatch> {
        match (self.status, self.expected) {
            (LockStatus::Unknown, _) => None,
            (observed, LockStatus::Unknown) => {
                self.expected = observed;
                None
            }
            (observed, expected) if observed != expected => {
                Some(StatusMismatch { expected, observed })
            }
            _ => None,
        }
    }

    /// Forget the observed position so the next reply is fresh.
    pub fn clear_status(&mut self) {
        self.status = LockStatus::Unknown;
    }

    /// Session teardown: drop observed position and battery.
    pub fn reset(&mut self) {
        self.status = LockStatus::Unknown;
        self.battery_mv = 0;
    }
}
