//! Notification inbox between the BLE stack and the lock task.
//!
//! The transport's notify callback runs in the Bluetooth host task; it
//! pushes raw frames here without blocking and the lock service drains
//! them at the start of each tick.
//!
//! ```text
//! ┌──────────────┐  Notification  ┌──────────────┐
//! │  BLE host    │───────────────▶│  Lock task   │
//! │  (callback)  │   try_send     │  (tick loop) │
//! └──────────────┘                └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

/// Largest notification accepted; anything longer cannot be a valid frame.
pub const MAX_NOTIFICATION_LEN: usize = 32;

/// Frames buffered between ticks.
pub const INBOX_DEPTH: usize = 8;

/// One notification as received.
pub type Notification = heapless::Vec<u8, MAX_NOTIFICATION_LEN>;

/// Bounded channel of received notifications.
pub type Inbox = Channel<CriticalSectionRawMutex, Notification, INBOX_DEPTH>;

/// Queue `bytes` for the lock task.  Never blocks.
///
/// Returns `false` if the frame was dropped (oversized or inbox full).
pub fn push_notification(inbox: &Inbox, bytes: &[u8]) -> bool {
    let Ok(frame) = Notification::from_slice(bytes) else {
        warn!("Inbox: dropped oversized notification ({} bytes)", bytes.len());
        return false;
    };
    if inbox.try_send(frame).is_err() {
        warn!("Inbox: full, dropped notification");
        return false;
    }
    true
}
