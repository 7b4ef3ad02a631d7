//! GATT session handling for one selected peripheral

use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Peripheral as _, WriteType,
};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use padlink_core::{
    AdapterEvent, AdapterEventSender, DeviceId, LinkError, LinkResult, UartDevice, WriteMode,
    WriteSupport,
};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Property Mapping
// ----------------------------------------------------------------------------

/// Derive the write variants a characteristic advertises from its GATT
/// property flags.
fn write_support(properties: CharPropFlags) -> WriteSupport {
    WriteSupport {
        acknowledged: properties.contains(CharPropFlags::WRITE),
        unacknowledged: properties.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
    }
}

fn write_type_for(mode: WriteMode) -> WriteType {
    match mode {
        WriteMode::Acknowledged => WriteType::WithResponse,
        WriteMode::Unacknowledged => WriteType::WithoutResponse,
    }
}

/// Platform peripheral identifiers are opaque; their debug rendering is
/// stable for the life of the process, which is all the session needs for
/// matching link-loss reports.
fn device_id_for(id: &PeripheralId) -> DeviceId {
    DeviceId::new(format!("{:?}", id))
}

// ----------------------------------------------------------------------------
// Linked Peripheral
// ----------------------------------------------------------------------------

/// A selected peripheral plus the GATT state layered on top of it
pub struct BleUartDevice {
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    connect_timeout: Duration,
    write_characteristic: Option<Characteristic>,
    watcher: Option<JoinHandle<()>>,
}

impl BleUartDevice {
    pub(crate) fn new(
        adapter: Adapter,
        peripheral: Peripheral,
        name: Option<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            peripheral,
            name,
            connect_timeout,
            write_characteristic: None,
            watcher: None,
        }
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed peripheral")
    }
}

#[async_trait::async_trait]
impl UartDevice for BleUartDevice {
    fn id(&self) -> DeviceId {
        device_id_for(&self.peripheral.id())
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    async fn connect(&mut self) -> LinkResult<()> {
        match timeout(self.connect_timeout, self.peripheral.connect()).await {
            Ok(Ok(())) => {
                info!("Established GATT link to {}", self.label());
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {}", self.label(), e);
                Err(LinkError::connect_failed(format!("GATT connect: {}", e)))
            }
            Err(_) => {
                error!("Connection to {} timed out", self.label());
                Err(LinkError::connect_failed(format!(
                    "GATT connect timed out after {:?}",
                    self.connect_timeout
                )))
            }
        }
    }

    async fn disconnect(&mut self) -> LinkResult<()> {
        // Stop the watcher first so a deliberate teardown is not also
        // reported as a lost link.
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.write_characteristic = None;

        match self.peripheral.is_connected().await {
            Ok(true) => {
                if let Err(e) = self.peripheral.disconnect().await {
                    error!("Failed to disconnect from {}: {}", self.label(), e);
                }
            }
            Ok(false) => {}
            Err(e) => debug!("Could not query link state for {}: {}", self.label(), e),
        }
        Ok(())
    }

    async fn resolve_write_characteristic(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> LinkResult<WriteSupport> {
        self.peripheral.discover_services().await.map_err(|e| {
            LinkError::connect_failed(format!("Failed to discover services: {}", e))
        })?;

        let characteristics = self.peripheral.characteristics();
        let write_char = characteristics
            .iter()
            .find(|c| c.service_uuid == service && c.uuid == characteristic)
            .cloned()
            .ok_or_else(|| {
                LinkError::connect_failed(format!(
                    "Characteristic {} not found under service {}",
                    characteristic, service
                ))
            })?;

        let support = write_support(write_char.properties);
        debug!(
            "Resolved write characteristic {} with properties {:?}",
            write_char.uuid, write_char.properties
        );
        self.write_characteristic = Some(write_char);
        Ok(support)
    }

    async fn write(&mut self, frame: &[u8], mode: WriteMode) -> LinkResult<()> {
        let characteristic = self
            .write_characteristic
            .as_ref()
            .ok_or_else(|| LinkError::send_failed("write characteristic not resolved"))?;

        self.peripheral
            .write(characteristic, frame, write_type_for(mode))
            .await
            .map_err(|e| LinkError::send_failed(format!("GATT write: {}", e)))?;

        debug!("Wrote {} bytes to {}", frame.len(), self.label());
        Ok(())
    }

    async fn watch_link(&mut self, events: AdapterEventSender) -> LinkResult<()> {
        let mut stream = self.adapter.events().await.map_err(|e| {
            LinkError::connect_failed(format!("Failed to get adapter event stream: {}", e))
        })?;
        let peripheral_id = self.peripheral.id();
        let device_id = self.id();

        let watcher = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == peripheral_id {
                        debug!("Platform reported lost link for {}", device_id);
                        if let Err(e) =
                            events.send(AdapterEvent::Disconnected { device: device_id })
                        {
                            debug!("Link loss event receiver dropped: {}", e);
                        }
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.watcher.replace(watcher) {
            previous.abort();
        }
        Ok(())
    }
}

impl Drop for BleUartDevice {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}
