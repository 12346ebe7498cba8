//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured lock events to the
//! ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::LockEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`LockEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &LockEvent) {
        match event {
            LockEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            LockEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            LockEvent::SessionEstablished { key } => {
                info!("SESSION | key=0x{:02x}", key);
            }
            LockEvent::StatusReport { status, battery_mv } => {
                info!("STATUS | lock={:?} | battery={}mV", status, battery_mv);
            }
            LockEvent::StatusMismatch { expected, observed } => {
                warn!("STATUS | mismatch expected={:?} observed={:?}", expected, observed);
            }
            LockEvent::Unlocked { attempts } => {
                info!("UNLOCK | confirmed after {} attempt(s)", attempts);
            }
            LockEvent::AlreadyUnlocked => {
                info!("UNLOCK | already unlocked");
            }
            LockEvent::UnlockAbandoned { attempts } => {
                warn!("UNLOCK | abandoned after {} attempt(s)", attempts);
            }
            LockEvent::Locked => {
                info!("LOCK | lock reports locked");
            }
            LockEvent::RfidRegistration(reg) => {
                info!("RFID | registration {:?}", reg);
            }
            LockEvent::RfidDeletion(del) => {
                info!("RFID | deletion {:?}", del);
            }
            LockEvent::Settings(report) => {
                info!(
                    "SETTINGS | ble={:?} button={:?} rfid={:?}",
                    report.ble_unlock, report.button_unlock, report.rfid_unlock
                );
            }
            LockEvent::Stopped => {
                info!("STOP | lock task ended");
            }
        }
    }
}
