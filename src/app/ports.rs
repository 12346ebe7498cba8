//! Port traits: the hexagonal boundary between the lock protocol and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ LockService (domain)
//! ```
//!
//! The BLE client, the clock and the event sink implement these traits.
//! The [`LockService`](super::service::LockService) consumes them via
//! generics, so the protocol core never touches the radio directly.

use std::sync::Arc;

use super::events::LockEvent;
use super::inbox::Inbox;
use crate::config::MacAddress;
use crate::error::TransportError;

// ───────────────────────────────────────────────────────────────
// Transport port (driven adapter: domain ↔ BLE GATT client)
// ───────────────────────────────────────────────────────────────

/// Link progress as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No link and no attempt in progress.
    Down,
    /// `open` accepted; discovery / subscription still running.
    Connecting,
    /// Characteristics resolved and notifications enabled.
    Ready,
    /// The last open attempt failed or the peer dropped the link.
    Failed,
}

/// GATT client connection to a single lock.
///
/// Service and characteristic UUIDs are fixed by the protocol
/// (see [`crate::protocol::SERVICE_UUID`]).
pub trait LockTransport {
    /// Register where notifications go.  Each notification is one frame.
    fn on_notify(&mut self, inbox: Arc<Inbox>);

    /// Begin connecting to `address`.  Returns once the attempt is under way;
    /// progress is observed through [`link_state`](Self::link_state).
    fn open(&mut self, address: &MacAddress) -> Result<(), TransportError>;

    fn link_state(&self) -> LinkState;

    /// Write one frame with response.  Returns after the lock acknowledged it.
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Tear the link down and release the BLE stack.
    fn close(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time source.  Injected so tests can run on virtual time.
pub trait Clock {
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Block the calling thread.
    fn sleep_ms(&self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`LockEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &LockEvent);
}
