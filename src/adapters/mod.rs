//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements    | Connects to                 |
//! |--------------|---------------|-----------------------------|
//! | `ble_client` | LockTransport | Bluedroid GATT client       |
//! | `log_sink`   | EventSink     | Serial log output           |
//! | `time`       | Clock         | ESP32 system timer          |

pub mod ble_client;
pub mod log_sink;
pub mod time;
