//! Adapter Boundary Traits
//!
//! Defines the interface between the session state machine and the platform
//! BLE stack. The concrete implementation lives in the `padlink-ble` crate; a
//! scriptable fake lives in [`crate::testing`] so the state machine is
//! unit-testable without radio hardware.
//!
//! ## Architecture
//!
//! The session drives exactly one device at a time:
//! - `UartAdapter::request_device` performs discovery and yields one device
//!   handle matching the deployment filter
//! - `UartDevice` covers the GATT lifecycle on that handle: connect,
//!   write-characteristic resolution, writes in both GATT variants, disconnect
//! - spontaneous link loss is reported out-of-band on an [`AdapterEvent`]
//!   channel registered via `UartDevice::watch_link`

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::LinkResult;

// ----------------------------------------------------------------------------
// Device Identity and Discovery Filter
// ----------------------------------------------------------------------------

/// Opaque identity of a discovered peripheral
///
/// Produced by the adapter implementation; the session only ever compares it
/// against link-loss events to ignore reports about a replaced device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discovery filter for a deployment
///
/// Peripherals are selected by advertised-name prefix. The UART service UUID
/// rides along so the adapter can expose and resolve the service's attributes
/// on whatever platform mechanism requires it to be declared up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Accept a peripheral when its advertised name starts with any of these.
    pub name_prefixes: Vec<String>,
    /// UART-emulation service the connection will resolve after connect.
    pub service: Uuid,
}

impl DeviceFilter {
    pub fn new(name_prefixes: Vec<String>, service: Uuid) -> Self {
        Self {
            name_prefixes,
            service,
        }
    }

    /// True when the advertised name matches the allow-list.
    pub fn matches(&self, name: &str) -> bool {
        self.name_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

// ----------------------------------------------------------------------------
// Write Modes
// ----------------------------------------------------------------------------

/// The two GATT characteristic write variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write Request: the peripheral confirms each write before it completes.
    Acknowledged,
    /// Write Command: fire-and-forget, no peripheral-level confirmation.
    Unacknowledged,
}

/// Write variants a characteristic advertises in its property flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteSupport {
    pub acknowledged: bool,
    pub unacknowledged: bool,
}

impl WriteSupport {
    pub fn supports(&self, mode: WriteMode) -> bool {
        match mode {
            WriteMode::Acknowledged => self.acknowledged,
            WriteMode::Unacknowledged => self.unacknowledged,
        }
    }

    /// Pick the write mode for a link, honoring the deployment preference.
    ///
    /// Common UART-emulation peripherals refuse acknowledged writes on their
    /// write characteristic, so the default preference is unacknowledged with
    /// acknowledged as the fallback. Returns `None` when the characteristic
    /// advertises neither variant.
    pub fn resolve(&self, prefer_unacknowledged: bool) -> Option<WriteMode> {
        let order = if prefer_unacknowledged {
            [WriteMode::Unacknowledged, WriteMode::Acknowledged]
        } else {
            [WriteMode::Acknowledged, WriteMode::Unacknowledged]
        };
        order.into_iter().find(|mode| self.supports(*mode))
    }
}

// ----------------------------------------------------------------------------
// Adapter Events
// ----------------------------------------------------------------------------

/// Out-of-band reports from the adapter to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// The platform dropped the link without a local `disconnect()` call.
    Disconnected { device: DeviceId },
}

pub type AdapterEventSender = mpsc::UnboundedSender<AdapterEvent>;
pub type AdapterEventReceiver = mpsc::UnboundedReceiver<AdapterEvent>;

/// Create the link-loss channel wired between adapter and session.
pub fn adapter_event_channel() -> (AdapterEventSender, AdapterEventReceiver) {
    mpsc::unbounded_channel()
}

// ----------------------------------------------------------------------------
// Adapter Traits
// ----------------------------------------------------------------------------

/// Platform BLE adapter in the central role
#[async_trait::async_trait]
pub trait UartAdapter: Send + Sync {
    type Device: UartDevice;

    /// Discover one peripheral matching the filter.
    ///
    /// Completes with the first match, or fails with `DiscoveryFailed` /
    /// `DiscoveryCancelled` when the scan window closes empty or the operator
    /// aborts. The returned handle is not yet connected.
    async fn request_device(&self, filter: &DeviceFilter) -> LinkResult<Self::Device>;
}

/// One discovered peripheral, owned exclusively by the session
#[async_trait::async_trait]
pub trait UartDevice: Send {
    /// Adapter-assigned identity, stable for the lifetime of the handle.
    fn id(&self) -> DeviceId;

    /// Advertised device name, when the platform exposed one.
    fn name(&self) -> Option<&str>;

    /// Establish the GATT session.
    async fn connect(&mut self) -> LinkResult<()>;

    /// Tear down the GATT session at the platform level.
    async fn disconnect(&mut self) -> LinkResult<()>;

    /// Locate the UART service and its write characteristic, reporting the
    /// write variants the characteristic advertises. Requires an established
    /// GATT session; the resolution is invalid once the link drops.
    async fn resolve_write_characteristic(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> LinkResult<WriteSupport>;

    /// Write one frame to the resolved characteristic.
    async fn write(&mut self, frame: &[u8], mode: WriteMode) -> LinkResult<()>;

    /// Register the channel on which the adapter reports spontaneous link
    /// loss for this device. Called once per established connection.
    async fn watch_link(&mut self, events: AdapterEventSender) -> LinkResult<()>;
}
