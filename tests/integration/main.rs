//! Host-side integration tests for the OL305 controller.
//!
//! A single test binary; each submodule covers one area.  `mock_lock`
//! provides the simulated lock and virtual clock every scenario runs on.

mod lock_service_tests;
mod mock_lock;
