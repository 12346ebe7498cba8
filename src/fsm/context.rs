//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to.  It carries the link and session state observed by the
//! service, the commands handlers want sent, and the lock position
//! tracker.  Think of it as the "blackboard" in a blackboard architecture.

use log::warn;

use crate::app::commands::{PendingCommand, TargetState};
use crate::app::events::LockEvent;
use crate::app::ports::LinkState;
use crate::app::tracker::LockTracker;
use crate::config::LockConfig;
use crate::protocol::commands::OutboundCommand;

/// Frames a single tick may queue.
pub const OUTBOX_DEPTH: usize = 4;

/// Events a single tick may raise.
pub const EVENT_DEPTH: usize = 8;

// ---------------------------------------------------------------------------
// Requests to the transport (written by handlers; applied by the service)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRequest {
    /// Start (or restart) connecting to the configured lock.
    Open,
    /// Close the link and release the BLE stack.
    Close,
}

// ---------------------------------------------------------------------------
// Multi-tick operations
// ---------------------------------------------------------------------------

/// An unlock being re-sent until the lock reports unlocked.
#[derive(Debug, Clone, Copy)]
pub struct UnlockAttempt {
    pub last_sent_ms: u64,
    pub attempts: u16,
}

/// An explicit query waiting for a status reply.
#[derive(Debug, Clone, Copy)]
pub struct QueryWait {
    pub last_sent_ms: u64,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler on every tick.
pub struct FsmContext {
    // -- Timing --
    /// Monotonic time of this tick.
    pub now_ms: u64,
    /// Monotonic time the current state was entered.
    pub state_entered_ms: u64,

    // -- Configuration (read-only to handlers) --
    pub config: LockConfig,

    // -- Inputs (written by the service before each tick) --
    pub target: TargetState,
    pub link: LinkState,
    /// Set by a fatal protocol error, a failed write or a session drop.
    pub force_disconnect: bool,
    /// Intent taken from the shared slot.
    pub pending: Option<PendingCommand>,
    /// Protocol acknowledgement owed to the lock.  Sent before `pending`.
    pub ack: Option<PendingCommand>,

    // -- Session --
    pub session_key: u8,
    pub key_confirmed: bool,
    /// When the key exchange was last sent in this connection attempt.
    pub key_sent_ms: Option<u64>,

    // -- Lock position --
    pub tracker: LockTracker,
    pub unlock: Option<UnlockAttempt>,
    pub query: Option<QueryWait>,

    // -- Outputs (consumed by the service after each tick) --
    pub outbox: heapless::Vec<OutboundCommand, OUTBOX_DEPTH>,
    pub link_request: Option<LinkRequest>,
    /// Discard whatever is left in the shared pending slot.
    pub clear_pending_slot: bool,
    /// The task should end.
    pub shutdown: bool,
    pub events: heapless::Vec<LockEvent, EVENT_DEPTH>,
}

impl FsmContext {
    pub fn new(config: LockConfig, target: TargetState) -> Self {
        Self {
            now_ms: 0,
            state_entered_ms: 0,
            config,
            target,
            link: LinkState::Down,
            force_disconnect: false,
            pending: None,
            ack: None,
            session_key: 0,
            key_confirmed: false,
            key_sent_ms: None,
            tracker: LockTracker::new(),
            unlock: None,
            query: None,
            outbox: heapless::Vec::new(),
            link_request: None,
            clear_pending_slot: false,
            shutdown: false,
            events: heapless::Vec::new(),
        }
    }

    /// Queue a frame for sending after this tick.
    pub fn queue(&mut self, cmd: OutboundCommand) {
        if let Err(cmd) = self.outbox.push(cmd) {
            warn!("FSM: outbox full, dropping {:?}", cmd.code());
        }
    }

    /// Queue a frame unless an identical one is already waiting.
    pub fn queue_once(&mut self, cmd: OutboundCommand) {
        if !self.outbox.contains(&cmd) {
            self.queue(cmd);
        }
    }

    pub fn emit(&mut self, event: LockEvent) {
        if let Err(event) = self.events.push(event) {
            warn!("FSM: event queue full, dropping {:?}", event);
        }
    }

    /// An unlock retry or a query wait is in progress.
    pub fn is_busy(&self) -> bool {
        self.unlock.is_some() || self.query.is_some()
    }

    pub fn ms_since(&self, then: u64) -> u64 {
        self.now_ms.saturating_sub(then)
    }

    /// Forget everything tied to the current session.
    pub fn reset_session(&mut self) {
        self.session_key = 0;
        self.key_confirmed = false;
        self.key_sent_ms = None;
    }
}
