//! Simulated OL305 lock and virtual clock for integration tests.
//!
//! `SimLock` implements [`LockTransport`]: it decodes every frame the
//! controller writes, records it, and answers the way the real lock does
//! by pushing encoded notifications into the controller's inbox.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ol305::app::events::LockEvent;
use ol305::app::inbox::{Inbox, push_notification};
use ol305::app::ports::{Clock, EventSink, LinkState, LockTransport};
use ol305::config::MacAddress;
use ol305::error::TransportError;
use ol305::protocol::codec::{self, DecodedMessage};
use ol305::protocol::reply::LockStatus;

// ── ManualClock ───────────────────────────────────────────────

/// Virtual clock shared by the service, its control handles and the mock.
/// Sleeping advances time instantly.
#[derive(Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

#[allow(dead_code)]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u32) {
        self.advance(u64::from(ms));
        std::thread::yield_now();
    }
}

// ── Recording sink ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<LockEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: &LockEvent) -> bool {
        self.events.contains(event)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &LockEvent) {
        self.events.push(event.clone());
    }
}

// ── SimLock ───────────────────────────────────────────────────

/// A frame the controller wrote, with the virtual time it arrived.
#[derive(Debug, Clone)]
pub struct Received {
    pub at_ms: u64,
    pub msg: DecodedMessage,
}

pub struct SimLock {
    clock: ManualClock,
    inbox: Option<Arc<Inbox>>,
    link: LinkState,
    rand: u8,

    /// Key handed out by the key exchange.
    pub key: u8,
    pub password: String,
    pub status: LockStatus,
    pub battery_mv: u32,
    /// The lock reports unlocked once this many unlock commands arrived.
    pub unlock_after: u32,
    /// When false the link stays in `Connecting` after `open`.
    pub ready_on_open: bool,
    pub fail_writes: bool,
    /// Record frames but never answer.
    pub silent: bool,

    pub opened: u32,
    pub closed: u32,
    pub unlock_commands: u32,
    pub received: Vec<Received>,
}

#[allow(dead_code)]
impl SimLock {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            inbox: None,
            link: LinkState::Down,
            rand: 0x10,
            key: 0x5c,
            password: "test1234".into(),
            status: LockStatus::Locked,
            battery_mv: 3600,
            unlock_after: 1,
            ready_on_open: true,
            fail_writes: false,
            silent: false,
            opened: 0,
            closed: 0,
            unlock_commands: 0,
            received: Vec::new(),
        }
    }

    /// Push a notification encoded with the lock's current key.
    pub fn notify(&mut self, cmd: u8, payload: &[u8]) {
        let key = self.key;
        self.notify_with_key(key, cmd, payload);
    }

    pub fn notify_with_key(&mut self, key: u8, cmd: u8, payload: &[u8]) {
        self.rand = self.rand.wrapping_add(7);
        let Ok(frame) = codec::encode(key, cmd, payload, self.rand) else {
            panic!("mock reply too large");
        };
        self.notify_raw(&frame);
    }

    pub fn notify_raw(&mut self, bytes: &[u8]) {
        let inbox = self.inbox.as_ref().expect("inbox registered");
        assert!(push_notification(inbox, bytes), "inbox full");
    }

    /// The peer dropped the link.
    pub fn drop_link(&mut self) {
        self.link = LinkState::Down;
    }

    pub fn set_link(&mut self, link: LinkState) {
        self.link = link;
    }

    /// Frames with the given command byte, in arrival order.
    pub fn sent(&self, cmd: u8) -> Vec<&Received> {
        self.received.iter().filter(|r| r.msg.cmd == cmd).collect()
    }

    fn status_bits(&self) -> u8 {
        match self.status {
            LockStatus::Unlocked => 0b01,
            LockStatus::Locked => 0b10,
            LockStatus::Unknown => 0,
        }
    }

    fn respond(&mut self, msg: &DecodedMessage) {
        if self.silent {
            return;
        }
        if msg.cmd != 0x01 && msg.key != self.key {
            self.notify(0x10, &[0x03]);
            return;
        }
        match msg.cmd {
            0x01 => {
                if msg.payload[..] == *self.password.as_bytes() {
                    let key = self.key;
                    self.notify(0x01, &[0x01, key]);
                } else {
                    self.notify_with_key(0, 0x10, &[0x03]);
                }
            }
            // Unlock command (acks are a single byte and get no answer).
            0x05 if msg.payload.len() == 10 => {
                self.unlock_commands += 1;
                if self.unlock_commands >= self.unlock_after {
                    self.status = LockStatus::Unlocked;
                }
            }
            0x31 => {
                let [hi, lo] = ((self.battery_mv / 10) as u16).to_be_bytes();
                let bits = self.status_bits();
                self.notify(0x31, &[hi, lo, bits]);
            }
            0x85 => self.notify(0x85, &[0x00]),
            0x86 => self.notify(0x86, &[0x01]),
            0x61 => {
                // Report "keep" flags as on.
                let echo: Vec<u8> = msg.payload.iter().map(|&b| if b == 0 { 2 } else { b }).collect();
                self.notify(0x61, &echo);
            }
            _ => {}
        }
    }
}

impl LockTransport for SimLock {
    fn on_notify(&mut self, inbox: Arc<Inbox>) {
        self.inbox = Some(inbox);
    }

    fn open(&mut self, _address: &MacAddress) -> Result<(), TransportError> {
        self.opened += 1;
        self.link = if self.ready_on_open {
            LinkState::Ready
        } else {
            LinkState::Connecting
        };
        Ok(())
    }

    fn link_state(&self) -> LinkState {
        self.link
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.link != LinkState::Ready {
            return Err(TransportError::NotConnected);
        }
        if self.fail_writes {
            return Err(TransportError::WriteFailed);
        }
        // Frames from the controller always carry a valid CRC.
        let msg = codec::decode(frame, 0).expect("controller sent a valid frame");
        self.received.push(Received {
            at_ms: self.clock.now_ms(),
            msg: msg.clone(),
        });
        self.respond(&msg);
        Ok(())
    }

    fn close(&mut self) {
        self.closed += 1;
        self.link = LinkState::Down;
    }
}
