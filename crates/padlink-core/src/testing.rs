//! Scriptable fake adapter for exercising the session without radio hardware
//!
//! `FakeAdapter` yields one `FakeDevice` whose behavior is described by a
//! [`FakeScript`]: advertised name, write support, and per-step failure
//! injection. Every adapter interaction is recorded so tests can assert the
//! exact call sequence, including the absence of calls.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::adapter::{
    AdapterEvent, AdapterEventSender, DeviceFilter, DeviceId, UartAdapter, UartDevice, WriteMode,
    WriteSupport,
};
use crate::error::{LinkError, LinkResult};

// ----------------------------------------------------------------------------
// Call Recording
// ----------------------------------------------------------------------------

/// One observed adapter interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Discover { service: Uuid },
    Connect,
    Disconnect,
    Resolve { service: Uuid, characteristic: Uuid },
    Write { frame: Vec<u8>, mode: WriteMode },
    WatchLink,
}

/// Shared log of adapter interactions
#[derive(Debug, Clone, Default)]
pub struct FakeRecorder {
    calls: Arc<Mutex<Vec<FakeCall>>>,
}

impl FakeRecorder {
    fn record(&self, call: FakeCall) {
        self.calls.lock().expect("recorder lock poisoned").push(call);
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().expect("recorder lock poisoned").clone()
    }

    /// The frames and modes of every recorded write, in order.
    pub fn writes(&self) -> Vec<(Vec<u8>, WriteMode)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                FakeCall::Write { frame, mode } => Some((frame, mode)),
                _ => None,
            })
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Device Script
// ----------------------------------------------------------------------------

/// Behavior of the device a [`FakeAdapter`] yields
#[derive(Debug, Clone)]
pub struct FakeScript {
    pub name: Option<String>,
    pub support: WriteSupport,
    pub fail_connect: Option<LinkError>,
    pub fail_resolve: Option<LinkError>,
    pub fail_write: Option<LinkError>,
}

impl Default for FakeScript {
    /// A healthy keypad peripheral: named, advertising both write variants.
    fn default() -> Self {
        Self {
            name: Some("BBC micro:bit V2".to_string()),
            support: WriteSupport {
                acknowledged: true,
                unacknowledged: true,
            },
            fail_connect: None,
            fail_resolve: None,
            fail_write: None,
        }
    }
}

impl FakeScript {
    /// A peripheral whose characteristic advertises only acknowledged writes.
    pub fn ack_only() -> Self {
        Self::default().with_support(WriteSupport {
            acknowledged: true,
            unacknowledged: false,
        })
    }

    /// A peripheral whose characteristic advertises only unacknowledged
    /// writes.
    pub fn unack_only() -> Self {
        Self::default().with_support(WriteSupport {
            acknowledged: false,
            unacknowledged: true,
        })
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Advertise no name, as a platform may match on service data alone.
    pub fn with_no_name(mut self) -> Self {
        self.name = None;
        self
    }

    pub fn with_support(mut self, support: WriteSupport) -> Self {
        self.support = support;
        self
    }

    pub fn with_connect_failure(mut self, error: LinkError) -> Self {
        self.fail_connect = Some(error);
        self
    }

    pub fn with_resolve_failure(mut self, error: LinkError) -> Self {
        self.fail_resolve = Some(error);
        self
    }

    pub fn with_write_failure(mut self, error: LinkError) -> Self {
        self.fail_write = Some(error);
        self
    }
}

// ----------------------------------------------------------------------------
// Fake Adapter and Device
// ----------------------------------------------------------------------------

/// Fake platform adapter yielding scripted devices
#[derive(Clone)]
pub struct FakeAdapter {
    script: FakeScript,
    device_id: DeviceId,
    recorder: FakeRecorder,
    watch: Arc<Mutex<Option<AdapterEventSender>>>,
    discovery_errors: Arc<Mutex<Vec<LinkError>>>,
}

impl FakeAdapter {
    pub fn new(script: FakeScript) -> Self {
        Self {
            script,
            device_id: DeviceId::new("fake-peripheral"),
            recorder: FakeRecorder::default(),
            watch: Arc::new(Mutex::new(None)),
            discovery_errors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail the next `request_device` calls with these errors, in order,
    /// then succeed.
    pub fn with_discovery_errors(self, errors: Vec<LinkError>) -> Self {
        *self
            .discovery_errors
            .lock()
            .expect("discovery lock poisoned") = errors;
        self
    }

    /// A handle sharing this adapter's recorder and link-loss trigger, for
    /// use after the adapter itself moves into a session.
    pub fn clone_handle(&self) -> Self {
        self.clone()
    }

    pub fn recorder(&self) -> FakeRecorder {
        self.recorder.clone()
    }

    /// Report spontaneous link loss for the scripted device. Returns false
    /// when no watcher is registered or the session side is gone.
    pub fn trigger_link_loss(&self) -> bool {
        match self.watch.lock().expect("watch lock poisoned").as_ref() {
            Some(sender) => sender
                .send(AdapterEvent::Disconnected {
                    device: self.device_id.clone(),
                })
                .is_ok(),
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl UartAdapter for FakeAdapter {
    type Device = FakeDevice;

    async fn request_device(&self, filter: &DeviceFilter) -> LinkResult<FakeDevice> {
        self.recorder.record(FakeCall::Discover {
            service: filter.service,
        });

        let mut pending = self
            .discovery_errors
            .lock()
            .expect("discovery lock poisoned");
        if !pending.is_empty() {
            return Err(pending.remove(0));
        }
        drop(pending);

        // Honor the name filter the way a platform chooser would; a nameless
        // script passes through, as a platform may match on service data.
        if let Some(name) = &self.script.name {
            if !filter.matches(name) {
                return Err(LinkError::discovery_failed(format!(
                    "no peripheral matching {:?}",
                    filter.name_prefixes
                )));
            }
        }

        Ok(FakeDevice {
            id: self.device_id.clone(),
            script: self.script.clone(),
            recorder: self.recorder.clone(),
            watch: self.watch.clone(),
            connected: false,
        })
    }
}

/// Scripted peripheral handle
pub struct FakeDevice {
    id: DeviceId,
    script: FakeScript,
    recorder: FakeRecorder,
    watch: Arc<Mutex<Option<AdapterEventSender>>>,
    connected: bool,
}

#[async_trait::async_trait]
impl UartDevice for FakeDevice {
    fn id(&self) -> DeviceId {
        self.id.clone()
    }

    fn name(&self) -> Option<&str> {
        self.script.name.as_deref()
    }

    async fn connect(&mut self) -> LinkResult<()> {
        self.recorder.record(FakeCall::Connect);
        if let Some(error) = &self.script.fail_connect {
            return Err(error.clone());
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> LinkResult<()> {
        self.recorder.record(FakeCall::Disconnect);
        self.connected = false;
        Ok(())
    }

    async fn resolve_write_characteristic(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> LinkResult<WriteSupport> {
        self.recorder.record(FakeCall::Resolve {
            service,
            characteristic,
        });
        if let Some(error) = &self.script.fail_resolve {
            return Err(error.clone());
        }
        Ok(self.script.support)
    }

    async fn write(&mut self, frame: &[u8], mode: WriteMode) -> LinkResult<()> {
        self.recorder.record(FakeCall::Write {
            frame: frame.to_vec(),
            mode,
        });
        if !self.connected {
            return Err(LinkError::send_failed("no gatt link"));
        }
        if let Some(error) = &self.script.fail_write {
            return Err(error.clone());
        }
        Ok(())
    }

    async fn watch_link(&mut self, events: AdapterEventSender) -> LinkResult<()> {
        self.recorder.record(FakeCall::WatchLink);
        *self.watch.lock().expect("watch lock poisoned") = Some(events);
        Ok(())
    }
}
