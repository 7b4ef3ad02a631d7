//! Bluetooth Low Energy adapter for padlink
//!
//! This crate implements the `UartAdapter` and `UartDevice` traits from
//! `padlink-core` on top of btleplug's central mode, so a `UartSession` can
//! drive a real radio.
//!
//! ## Architecture
//!
//! - [`adapter`](BleUartAdapter) - platform adapter binding and name-prefix
//!   peripheral selection
//! - [`device`](BleUartDevice) - GATT connect/disconnect, write
//!   characteristic resolution, writes, and link-loss watching for one
//!   selected peripheral
//!
//! ## Usage
//!
//! ```rust,no_run
//! use padlink_ble::BleUartAdapter;
//! use padlink_core::{LinkConfig, UartSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LinkConfig::default();
//! let adapter = BleUartAdapter::new(config.clone()).await?;
//! let mut session = UartSession::new(adapter, config);
//!
//! session.connect().await?;
//! session.send("7").await?;
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod adapter;
mod device;

// Public API exports
pub use adapter::BleUartAdapter;
pub use device::BleUartDevice;
