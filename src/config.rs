//! Lock controller configuration
//!
//! Device address, pairing password and loop timing.  Supplied once at
//! startup, either built in code or loaded from a JSON document.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::commands::LockSettings;

const MIN_PASSWORD_LEN: usize = 4;
const MAX_PASSWORD_LEN: usize = 8;

// ───────────────────────────────────────────────────────────────
// MAC address
// ───────────────────────────────────────────────────────────────

/// Six-byte BLE device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let addr: [u8; 6] = bytes.try_into().map_err(|_| ConfigError::InvalidMac)?;
        Ok(Self(addr))
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = ConfigError;

    /// Parse `aa:bb:cc:dd:ee:ff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 6];
        let mut parts = s.split(':');
        for byte in &mut out {
            let part = parts.next().ok_or(ConfigError::InvalidMac)?;
            if part.len() != 2 {
                return Err(ConfigError::InvalidMac);
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| ConfigError::InvalidMac)?;
        }
        if parts.next().is_some() {
            return Err(ConfigError::InvalidMac);
        }
        Ok(Self(out))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

// ───────────────────────────────────────────────────────────────
// LockConfig
// ───────────────────────────────────────────────────────────────

/// Everything the lock task needs to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    // --- Device ---
    /// Address of the lock to connect to
    pub mac: MacAddress,
    /// Pairing password presented in the key exchange (4-8 ASCII bytes)
    pub password: heapless::String<MAX_PASSWORD_LEN>,
    /// Settings pushed by `push_settings` when none are given
    pub default_settings: LockSettings,

    // --- Timing ---
    /// Delay between state machine ticks (milliseconds)
    pub tick_interval_ms: u32,
    /// Tick delay while waiting for the link to come up (milliseconds)
    pub link_poll_interval_ms: u32,
    /// Delay between status queries while waiting for a query report (milliseconds)
    pub query_poll_interval_ms: u32,
    /// Delay between unlock re-sends until the lock reports unlocked (milliseconds)
    pub unlock_retry_interval_ms: u32,
    /// Give up on an unlock after this many sends; `None` retries until
    /// the target state changes
    pub unlock_retry_limit: Option<u16>,
    /// Re-send the key exchange if no reply arrives within this window (milliseconds)
    pub key_exchange_timeout_ms: u32,
    /// Tick delay while idle in Disconnected (milliseconds)
    pub idle_poll_interval_ms: u32,
    /// Poll period of a blocking `request` (milliseconds)
    pub wait_poll_interval_ms: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            mac: MacAddress([0xd5, 0x7b, 0xf1, 0xca, 0x51, 0x51]),
            password: heapless::String::new(),
            default_settings: LockSettings::default(),

            tick_interval_ms: 1000,
            link_poll_interval_ms: 250,
            query_poll_interval_ms: 150,
            unlock_retry_interval_ms: 2500,
            unlock_retry_limit: None,
            key_exchange_timeout_ms: 5000,
            idle_poll_interval_ms: 10,
            wait_poll_interval_ms: 10,
        }
    }
}

impl LockConfig {
    /// Default timing for the given lock, validating address and password.
    pub fn new(mac: &[u8], password: &str) -> Result<Self, ConfigError> {
        let mut config = Self {
            mac: MacAddress::from_slice(mac)?,
            ..Self::default()
        };
        config.set_password(password)?;
        Ok(config)
    }

    /// Replace the pairing password.  The old one is kept on error.
    pub fn set_password(&mut self, password: &str) -> Result<(), ConfigError> {
        validate_password(password)?;
        self.password =
            heapless::String::try_from(password).map_err(|_| ConfigError::InvalidPassword)?;
        Ok(())
    }

    /// Replace the device address.  The old one is kept on error.
    pub fn set_mac(&mut self, mac: &[u8]) -> Result<(), ConfigError> {
        self.mac = MacAddress::from_slice(mac)?;
        Ok(())
    }

    /// Load from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field the lock task relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_password(&self.password)?;
        let intervals = [
            ("tick_interval_ms", self.tick_interval_ms),
            ("link_poll_interval_ms", self.link_poll_interval_ms),
            ("query_poll_interval_ms", self.query_poll_interval_ms),
            ("unlock_retry_interval_ms", self.unlock_retry_interval_ms),
            ("key_exchange_timeout_ms", self.key_exchange_timeout_ms),
            ("idle_poll_interval_ms", self.idle_poll_interval_ms),
            ("wait_poll_interval_ms", self.wait_poll_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::InvalidInterval(name));
            }
        }
        Ok(())
    }
}

fn validate_password(password: &str) -> Result<(), ConfigError> {
    let len = password.len();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(ConfigError::InvalidPassword);
    }
    if !password.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(ConfigError::InvalidPassword);
    }
    Ok(())
}
