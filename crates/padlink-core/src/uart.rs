//! UART-emulation service constants
//!
//! The deployment speaks the Nordic UART Service (NUS): one vendor-defined
//! service with a single characteristic for host-to-peripheral writes. The
//! UUIDs are fixed constants of the wire contract, not negotiated. The
//! peripheral-to-host characteristic is absent: this link is write-only.

use uuid::Uuid;

/// UART-emulation service UUID
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);

/// Characteristic for host-to-peripheral writes
pub const UART_WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);
