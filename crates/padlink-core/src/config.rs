//! Link configuration
//!
//! Deployment-level knobs for the UART link. The delimiter policy and the
//! write-mode preference live here rather than in code because fielded
//! keypad peripherals disagree on both; defaults match the micro:bit
//! deployment.

use std::time::Duration;

use uuid::Uuid;

use crate::adapter::DeviceFilter;
use crate::uart::{UART_SERVICE_UUID, UART_WRITE_CHARACTERISTIC_UUID};

// ----------------------------------------------------------------------------
// Framing Delimiter
// ----------------------------------------------------------------------------

/// Terminator byte appended to every outbound frame
///
/// The wire contract allows none or exactly one byte. Peripheral firmware
/// commonly buffers incoming bytes until it sees a terminator, so a
/// delimiter-less deployment only works when the firmware dispatches on raw
/// byte arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    /// No terminator; frames carry the payload bytes alone.
    None,
    /// Terminate frames with `\n` (0x0A).
    LineFeed,
    /// Terminate frames with `\r` (0x0D).
    CarriageReturn,
    /// Terminate frames with an arbitrary byte.
    Byte(u8),
}

impl Delimiter {
    /// The terminator byte, if the deployment uses one.
    pub fn as_byte(&self) -> Option<u8> {
        match self {
            Delimiter::None => None,
            Delimiter::LineFeed => Some(b'\n'),
            Delimiter::CarriageReturn => Some(b'\r'),
            Delimiter::Byte(byte) => Some(*byte),
        }
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Delimiter::LineFeed
    }
}

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the UART link
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Peripheral name prefixes accepted during discovery
    pub name_prefixes: Vec<String>,
    /// UART-emulation service UUID
    pub service: Uuid,
    /// Host-to-peripheral write characteristic UUID
    pub write_characteristic: Uuid,
    /// Terminator appended to every outbound frame
    pub delimiter: Delimiter,
    /// Prefer unacknowledged writes when the characteristic advertises them
    pub prefer_unacknowledged: bool,
    /// Maximum time to wait for a matching peripheral to appear
    pub scan_timeout: Duration,
    /// Maximum time to wait for the GATT connection
    pub connect_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name_prefixes: vec!["BBC micro:bit".to_string(), "ESP".to_string()],
            service: UART_SERVICE_UUID,
            write_characteristic: UART_WRITE_CHARACTERISTIC_UUID,
            delimiter: Delimiter::default(),
            prefer_unacknowledged: true,
            scan_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl LinkConfig {
    /// Create a new configuration with the deployment defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the accepted peripheral name prefixes
    pub fn with_name_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.name_prefixes = prefixes;
        self
    }

    /// Set the UART service UUID
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.service = service;
        self
    }

    /// Set the write characteristic UUID
    pub fn with_write_characteristic(mut self, characteristic: Uuid) -> Self {
        self.write_characteristic = characteristic;
        self
    }

    /// Set the outbound frame delimiter
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the write-mode preference direction
    pub fn with_prefer_unacknowledged(mut self, prefer: bool) -> Self {
        self.prefer_unacknowledged = prefer;
        self
    }

    /// Set the scan timeout
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Discovery filter derived from this configuration.
    pub fn filter(&self) -> DeviceFilter {
        DeviceFilter::new(self.name_prefixes.clone(), self.service)
    }
}
