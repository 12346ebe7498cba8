//! OL305 smart-lock controller library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod protocol;

// The adapters compile on every target; the radio and timer code inside
// is guarded by cfg attributes.
pub mod adapters;
