//! Control facade: the thread-safe handle callers use to drive the lock.
//!
//! The only state shared between callers and the lock task lives in
//! [`SharedState`]:
//!
//! | Field          | Writer        | Reader        | Primitive              |
//! |----------------|---------------|---------------|------------------------|
//! | target         | LockControl   | LockService   | `AtomicU8`             |
//! | pending        | both          | LockService   | single-slot `Signal`   |
//! | drop_session   | LockControl   | LockService   | `AtomicBool`           |
//! | state/snapshot | LockService   | LockControl   | `AtomicU8` / `Mutex`   |
//!
//! The pending slot holds one command.  A second intent posted before the
//! first is consumed replaces it (last writer wins) and a warning is logged.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use core::time::Duration;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{info, warn};

use super::commands::{PendingCommand, TargetState};
use super::ports::Clock;
use crate::error::{ConfigError, ControlError};
use crate::fsm::StateId;
use crate::protocol::commands::{LockSettings, RfidCard};
use crate::protocol::reply::LockStatus;

// ───────────────────────────────────────────────────────────────
// Snapshot
// ───────────────────────────────────────────────────────────────

/// Read-only view of the lock published after every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSnapshot {
    pub state: StateId,
    pub status: LockStatus,
    pub expected: LockStatus,
    pub battery_mv: u32,
}

impl Default for LockSnapshot {
    fn default() -> Self {
        Self {
            state: StateId::Invalid,
            status: LockStatus::Unknown,
            expected: LockStatus::Unknown,
            battery_mv: 0,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Shared state
// ───────────────────────────────────────────────────────────────

/// State shared between the lock task and its control handles.
pub struct SharedState {
    target: AtomicU8,
    state: AtomicU8,
    drop_session: AtomicBool,
    pending: Signal<CriticalSectionRawMutex, PendingCommand>,
    snapshot: Mutex<CriticalSectionRawMutex, Cell<LockSnapshot>>,
}

impl SharedState {
    pub fn new(target: TargetState) -> Self {
        Self {
            target: AtomicU8::new(target as u8),
            state: AtomicU8::new(StateId::Invalid as u8),
            drop_session: AtomicBool::new(false),
            pending: Signal::new(),
            snapshot: Mutex::new(Cell::new(LockSnapshot::default())),
        }
    }

    pub fn target(&self) -> TargetState {
        TargetState::from_u8(self.target.load(Ordering::Acquire))
    }

    pub fn set_target(&self, target: TargetState) {
        self.target.store(target as u8, Ordering::Release);
    }

    pub fn state(&self) -> StateId {
        StateId::from_index(self.state.load(Ordering::Acquire) as usize)
    }

    /// Post a command, replacing any that has not been consumed yet.
    pub fn post(&self, cmd: PendingCommand) {
        if self.pending.signaled() {
            warn!("Lock: pending command overwritten by {:?}", cmd);
        }
        self.pending.signal(cmd);
    }

    /// Consume the pending command, if any.
    pub fn take_pending(&self) -> Option<PendingCommand> {
        self.pending.try_take()
    }

    /// Discard the pending command without running it.
    pub fn clear_pending(&self) {
        self.pending.reset();
    }

    pub fn request_drop_session(&self) {
        self.drop_session.store(true, Ordering::Release);
    }

    /// Consume a drop-session request.
    pub fn take_drop_session(&self) -> bool {
        self.drop_session.swap(false, Ordering::AcqRel)
    }

    pub fn publish(&self, snapshot: LockSnapshot) {
        self.state.store(snapshot.state as u8, Ordering::Release);
        self.snapshot.lock(|cell| cell.set(snapshot));
    }

    pub fn snapshot(&self) -> LockSnapshot {
        self.snapshot.lock(Cell::get)
    }
}

// ───────────────────────────────────────────────────────────────
// LockControl
// ───────────────────────────────────────────────────────────────

/// Cloneable handle for driving the lock from any thread.
#[derive(Clone)]
pub struct LockControl<C: Clock> {
    shared: Arc<SharedState>,
    clock: C,
    default_settings: LockSettings,
    wait_poll_ms: u32,
}

impl<C: Clock> LockControl<C> {
    pub fn new(
        shared: Arc<SharedState>,
        clock: C,
        default_settings: LockSettings,
        wait_poll_ms: u32,
    ) -> Self {
        Self {
            shared,
            clock,
            default_settings,
            wait_poll_ms,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Set the target lifecycle state.
    ///
    /// With `wait`, polls until the lock is Connected (for `Enable`) or
    /// Disconnected (for `Disable` / `Shutdown`).  `timeout = None` waits
    /// without limit.
    pub fn request(
        &self,
        target: TargetState,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Result<(), ControlError> {
        info!("Lock: switch to {:?}", target);
        self.shared.set_target(target);
        if !wait {
            return Ok(());
        }

        let deadline = timeout.map(|t| {
            let ms = u64::try_from(t.as_millis()).unwrap_or(u64::MAX);
            self.clock.now_ms().saturating_add(ms)
        });
        loop {
            if self.target_reached() {
                info!("Lock: {:?} reached", self.shared.target());
                return Ok(());
            }
            if deadline.is_some_and(|d| self.clock.now_ms() >= d) {
                warn!("Lock: timed out waiting for {:?}", target);
                return Err(ControlError::Timeout);
            }
            self.clock.sleep_ms(self.wait_poll_ms);
        }
    }

    /// Tear the session down and stay disconnected.
    pub fn disconnect(&self) {
        info!("Lock: disconnect requested");
        self.shared.set_target(TargetState::Disable);
    }

    /// Drop the current session without changing the target.  With the
    /// target at `Enable` the lock task reconnects on its own.
    pub fn drop_session(&self) {
        info!("Lock: session drop requested");
        self.shared.request_drop_session();
    }

    // ── Intents ───────────────────────────────────────────────

    pub fn unlock(&self) {
        self.shared.post(PendingCommand::Unlock);
    }

    pub fn query(&self) {
        self.shared.post(PendingCommand::QueryInfo);
    }

    pub fn read_rfid(&self) {
        self.shared.post(PendingCommand::ReadRfid);
    }

    /// Delete every enrolled card.
    pub fn delete_rfid(&self) {
        self.shared.post(PendingCommand::DeleteRfid(RfidCard::ALL));
    }

    /// Delete one card by its 8-byte number.
    pub fn delete_rfid_card(&self, card: &[u8]) -> Result<(), ConfigError> {
        let card = RfidCard::from_slice(card)?;
        self.shared.post(PendingCommand::DeleteRfid(card));
        Ok(())
    }

    /// Push the configured default settings.
    pub fn push_settings(&self) {
        self.push_lock_settings(self.default_settings);
    }

    pub fn push_lock_settings(&self, settings: LockSettings) {
        self.shared.post(PendingCommand::PushSettings(settings));
    }

    /// Push raw settings flags.  Rejected (nothing queued) if any flag is
    /// outside `0..=2`.
    pub fn push_raw_settings(&self, ble: u8, button: u8, rfid: u8) -> Result<(), ConfigError> {
        let settings = LockSettings::from_raw(ble, button, rfid)?;
        self.push_lock_settings(settings);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.shared.state() == StateId::Connected
    }

    pub fn state(&self) -> StateId {
        self.shared.state()
    }

    pub fn target(&self) -> TargetState {
        self.shared.target()
    }

    pub fn snapshot(&self) -> LockSnapshot {
        self.shared.snapshot()
    }

    fn target_reached(&self) -> bool {
        let state = self.shared.state();
        match self.shared.target() {
            TargetState::Enable => state == StateId::Connected,
            TargetState::Disable | TargetState::Shutdown => state == StateId::Disconnected,
        }
    }
}
