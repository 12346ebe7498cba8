//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the business rules for the lock controller:
//! FSM orchestration, reply handling, intent delivery and status
//! tracking.  All interaction with the radio happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod control;
pub mod events;
pub mod inbox;
pub mod ports;
pub mod service;
pub mod tracker;
