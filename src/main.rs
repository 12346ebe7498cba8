//! OL305 Controller: Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BleLockClient      LogEventSink      SystemClock              │
//! │  (LockTransport)    (EventSink)       (Clock)                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              LockService (pure logic)                  │    │
//! │  │  FSM · codec · status tracker                          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  LockControl (any thread) ──▶ SharedState ──▶ lock task        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use core::time::Duration;

use anyhow::{Result, anyhow};
use log::{info, warn};

use ol305::adapters::ble_client::BleLockClient;
use ol305::adapters::log_sink::LogEventSink;
use ol305::adapters::time::SystemClock;
use ol305::app::commands::TargetState;
use ol305::app::service::LockService;
use ol305::config::LockConfig;

/// Address of the paired lock.
const LOCK_MAC: [u8; 6] = [0xd5, 0x7b, 0xf1, 0xca, 0x51, 0x51];
/// Pairing password configured on the lock.
const LOCK_PASSWORD: &str = "yOTmK50z";

const LOCK_TASK_STACK: usize = 8 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  OL305 controller v{}             ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Config + service ───────────────────────────────────
    let config = LockConfig::new(&LOCK_MAC, LOCK_PASSWORD)?;
    info!("Lock {} (unlock retry every {} ms)", config.mac, config.unlock_retry_interval_ms);

    let mut service = LockService::new(config, BleLockClient::new(), SystemClock::new())?;
    let control = service.control();

    // ── 3. Lock task ──────────────────────────────────────────
    let lock_task = std::thread::Builder::new()
        .name("ol305".into())
        .stack_size(LOCK_TASK_STACK)
        .spawn(move || {
            let mut sink = LogEventSink::new();
            service.run(&mut sink);
        })?;

    // ── 4. Connect and report the lock's state ────────────────
    match control.request(TargetState::Enable, true, Some(CONNECT_TIMEOUT)) {
        Ok(()) => {
            info!("Lock connected, querying status");
            control.query();
        }
        Err(e) => warn!("{}; the lock task keeps retrying", e),
    }

    lock_task
        .join()
        .map_err(|_| anyhow!("lock task panicked"))?;
    info!("Lock task ended");
    Ok(())
}
