//! Connection state machine and framing for a write-only BLE UART keypad link
//!
//! This crate holds everything about the link that is not platform BLE: the
//! session state machine, token framing, write-mode selection, the error
//! taxonomy, and deployment configuration. The platform adapter is injected
//! behind the [`UartAdapter`] trait; the production implementation lives in
//! `padlink-ble`, and a scriptable fake lives in [`testing`].
//!
//! ## Architecture
//!
//! - [`session`](UartSession) - the connection state machine UI code drives
//! - [`adapter`](UartAdapter) - the boundary to the platform BLE stack
//! - [`frame`](OutboundFrame) - delimiter-terminated token framing
//! - [`config`](LinkConfig) - deployment configuration
//! - [`error`](LinkError) - the recoverable error taxonomy
//! - [`uart`] - UART-emulation service constants
//!
//! ## Usage
//!
//! ```rust
//! use padlink_core::{LinkConfig, LinkResult, UartAdapter, UartSession};
//!
//! async fn tap_seven<A: UartAdapter>(adapter: A) -> LinkResult<()> {
//!     let mut session = UartSession::new(adapter, LinkConfig::default());
//!     session.connect().await?;
//!     session.send("7").await?;
//!     session.disconnect().await
//! }
//! ```

mod adapter;
mod config;
mod error;
mod frame;
mod session;
pub mod uart;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Public API exports
pub use adapter::{
    adapter_event_channel, AdapterEvent, AdapterEventReceiver, AdapterEventSender, DeviceFilter,
    DeviceId, UartAdapter, UartDevice, WriteMode, WriteSupport,
};
pub use config::{Delimiter, LinkConfig};
pub use error::{LinkError, LinkResult};
pub use frame::OutboundFrame;
pub use session::{
    status_channel, LinkState, StatusReceiver, StatusSender, StatusUpdate, UartSession,
};
pub use uart::{UART_SERVICE_UUID, UART_WRITE_CHARACTERISTIC_UUID};
