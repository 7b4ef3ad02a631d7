//! Platform adapter binding and peripheral selection

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use padlink_core::{DeviceFilter, LinkConfig, LinkError, LinkResult, UartAdapter};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::device::BleUartDevice;

/// How often the discovered-peripheral roster is re-checked while scanning.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(300);

// ----------------------------------------------------------------------------
// Adapter
// ----------------------------------------------------------------------------

/// Selects UART keypads over the first Bluetooth adapter the platform exposes
pub struct BleUartAdapter {
    config: LinkConfig,
    adapter: Adapter,
}

impl BleUartAdapter {
    /// Bind to the first available platform adapter.
    pub async fn new(config: LinkConfig) -> LinkResult<Self> {
        let manager = Manager::new().await.map_err(|e| {
            LinkError::discovery_failed(format!("Failed to create BLE manager: {}", e))
        })?;

        let adapters = manager.adapters().await.map_err(|e| {
            LinkError::discovery_failed(format!("Failed to enumerate BLE adapters: {}", e))
        })?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| LinkError::discovery_failed("No BLE adapters available"))?;

        info!("BLE adapter initialized");
        Ok(Self { config, adapter })
    }

    async fn first_match(&self, filter: &DeviceFilter) -> LinkResult<(Peripheral, String)> {
        let deadline = Instant::now() + self.config.scan_timeout;
        loop {
            let peripherals = self.adapter.peripherals().await.map_err(|e| {
                LinkError::discovery_failed(format!("Failed to enumerate peripherals: {}", e))
            })?;

            for peripheral in peripherals {
                if let Ok(Some(properties)) = peripheral.properties().await {
                    if let Some(name) = properties.local_name {
                        if filter.matches(&name) {
                            debug!("Matched peripheral {} ({:?})", name, peripheral.id());
                            return Ok((peripheral, name));
                        }
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(LinkError::discovery_failed(format!(
                    "No peripheral named {:?} seen within {:?}",
                    filter.name_prefixes, self.config.scan_timeout
                )));
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        }
    }
}

#[async_trait::async_trait]
impl UartAdapter for BleUartAdapter {
    type Device = BleUartDevice;

    async fn request_device(&self, filter: &DeviceFilter) -> LinkResult<BleUartDevice> {
        // Keypad firmware rarely advertises the UART service itself, so the
        // scan runs unfiltered and candidates are matched on local name; the
        // declared service comes back into play at characteristic resolution.
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| LinkError::discovery_failed(format!("Failed to start scan: {}", e)))?;
        debug!(
            "Scanning for peripherals named {:?} offering service {}",
            filter.name_prefixes, filter.service
        );

        let result = self.first_match(filter).await;

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        let (peripheral, name) = result?;
        info!("Selected peripheral {}", name);
        Ok(BleUartDevice::new(
            self.adapter.clone(),
            peripheral,
            Some(name),
            self.config.connect_timeout,
        ))
    }
}
