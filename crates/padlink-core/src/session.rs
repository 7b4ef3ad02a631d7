//! UART Link Session
//!
//! The connection state machine for one write-only BLE UART link. The session
//! owns the device handle, the resolved write characteristic, and the write
//! mode cached at connect time; UI code drives it through `connect()`,
//! `disconnect()`, and `send()` without ever seeing adapter handles.
//!
//! ## State machine
//!
//! `Idle` → `connect()` → `Connecting` → `Connected` on success or
//! `Error(reason)` on any discovery/GATT/resolution failure, both re-entrant
//! through another `connect()`. A live link leaves `Connected` through
//! `disconnect()` or through a spontaneous adapter link-loss report, landing
//! in `Disconnected` either way. Failure is never fatal: every error leaves
//! the session operable for a retry.
//!
//! ## Ownership
//!
//! One session per process, owned by its driver task. All mutating
//! operations take `&mut self`, so overlapping `connect()` or `send()` calls
//! are unrepresentable rather than a documented caller obligation. A second
//! `connect()` on a live session closes the previous link first.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adapter::{
    adapter_event_channel, AdapterEvent, AdapterEventReceiver, AdapterEventSender, UartAdapter,
    UartDevice, WriteMode,
};
use crate::config::LinkConfig;
use crate::error::{LinkError, LinkResult};
use crate::frame::OutboundFrame;

// ----------------------------------------------------------------------------
// Link State and Status Updates
// ----------------------------------------------------------------------------

/// Connection state of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Fresh session, never connected.
    Idle,
    /// `connect()` is in flight.
    Connecting,
    /// Link established, write characteristic resolved.
    Connected,
    /// Link closed, locally or by the adapter.
    Disconnected,
    /// The last `connect()` failed; retry is allowed.
    Error(String),
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Idle => write!(f, "idle"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Status-change notification for the UI collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub state: LinkState,
    /// Peripheral name on successful connect, failure reason on error.
    pub detail: Option<String>,
}

pub type StatusSender = mpsc::UnboundedSender<StatusUpdate>;
pub type StatusReceiver = mpsc::UnboundedReceiver<StatusUpdate>;

/// Create the status channel wired between session and UI.
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    mpsc::unbounded_channel()
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// Device handle plus the write mode resolved at connect time.
///
/// Present exactly while the session is `Connected`, so the
/// characteristic-iff-connected invariant holds by construction.
struct ConnectedLink<D> {
    device: D,
    write_mode: WriteMode,
}

/// One BLE UART link, driven by UI code through an injected adapter
pub struct UartSession<A: UartAdapter> {
    adapter: A,
    config: LinkConfig,
    state: LinkState,
    link: Option<ConnectedLink<A::Device>>,
    status_tx: Option<StatusSender>,
    events_tx: AdapterEventSender,
    events_rx: Option<AdapterEventReceiver>,
}

impl<A: UartAdapter> UartSession<A> {
    /// Create an idle session over the given adapter.
    pub fn new(adapter: A, config: LinkConfig) -> Self {
        let (events_tx, events_rx) = adapter_event_channel();
        Self {
            adapter,
            config,
            state: LinkState::Idle,
            link: None,
            status_tx: None,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Attach the channel on which status updates are delivered, replacing
    /// any previously attached sender.
    pub fn attach_status(&mut self, sender: StatusSender) {
        self.status_tx = Some(sender);
    }

    /// Take the receiver for adapter link-loss events. The driver loop must
    /// feed received events back through [`UartSession::handle_adapter_event`].
    /// Returns `None` after the first call.
    pub fn take_adapter_events(&mut self) -> Option<AdapterEventReceiver> {
        self.events_rx.take()
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Write mode cached at connect time; `None` unless connected.
    pub fn write_mode(&self) -> Option<WriteMode> {
        self.link.as_ref().map(|link| link.write_mode)
    }

    /// Advertised name of the connected peripheral, when it exposed one.
    pub fn device_name(&self) -> Option<&str> {
        self.link.as_ref().and_then(|link| link.device.name())
    }

    /// Discover a peripheral, establish the GATT session, and resolve the
    /// write characteristic.
    ///
    /// Lands in `Connected` (status update carries the peripheral name) or in
    /// `Error(reason)` (status update carries the reason, and the error is
    /// also returned). A live link is closed before the new discovery starts.
    pub async fn connect(&mut self) -> LinkResult<()> {
        if let Some(mut link) = self.link.take() {
            info!("Replacing existing link to {}", link.device.id());
            if let Err(e) = link.device.disconnect().await {
                warn!("Failed to close previous link: {}", e);
            }
        }
        self.state = LinkState::Connecting;
        debug!("Starting device discovery");

        match self.establish().await {
            Ok(link) => {
                let name = link.device.name().map(|name| name.to_string());
                debug!("Resolved write mode: {:?}", link.write_mode);
                self.link = Some(link);
                self.state = LinkState::Connected;
                info!(
                    "Connected to {}",
                    name.as_deref().unwrap_or("unnamed peripheral")
                );
                self.notify(name);
                Ok(())
            }
            Err(err) => {
                self.state = LinkState::Error(err.to_string());
                self.notify(Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn establish(&mut self) -> LinkResult<ConnectedLink<A::Device>> {
        let filter = self.config.filter();
        let mut device = self.adapter.request_device(&filter).await?;
        device.connect().await?;

        match Self::resolve(&self.config, &mut device, self.events_tx.clone()).await {
            Ok(write_mode) => Ok(ConnectedLink { device, write_mode }),
            Err(err) => {
                // The GATT link is open but unusable; close it rather than
                // leaving a connection the OS still considers live.
                if let Err(e) = device.disconnect().await {
                    warn!("Failed to close unusable link: {}", e);
                }
                Err(err)
            }
        }
    }

    async fn resolve(
        config: &LinkConfig,
        device: &mut A::Device,
        events: AdapterEventSender,
    ) -> LinkResult<WriteMode> {
        let support = device
            .resolve_write_characteristic(config.service, config.write_characteristic)
            .await?;
        let write_mode = support
            .resolve(config.prefer_unacknowledged)
            .ok_or_else(|| {
                LinkError::connect_failed("characteristic advertises no write variant")
            })?;
        device.watch_link(events).await?;
        Ok(write_mode)
    }

    /// Close the link. Idempotent: without a live link this performs no
    /// adapter call and only reports the (now `Disconnected`) state.
    pub async fn disconnect(&mut self) -> LinkResult<()> {
        if let Some(mut link) = self.link.take() {
            // Close at the adapter level before clearing local handles, so
            // the OS does not keep the connection open on our behalf.
            if let Err(e) = link.device.disconnect().await {
                warn!("Adapter disconnect failed: {}", e);
            }
            info!(
                "Disconnected from {}",
                link.device.name().unwrap_or("peripheral")
            );
        } else {
            debug!("Disconnect with no active link");
        }
        self.state = LinkState::Disconnected;
        self.notify(None);
        Ok(())
    }

    /// Frame a token and write it to the peripheral.
    ///
    /// Rejected with `NotConnected` before any suspension point when no link
    /// is established: no queuing, no retry. A failed write surfaces
    /// `SendFailed` but is not proof of disconnection; the state only
    /// changes through `disconnect()` or an adapter link-loss report.
    pub async fn send(&mut self, token: &str) -> LinkResult<()> {
        let link = self.link.as_mut().ok_or(LinkError::NotConnected)?;
        let frame = OutboundFrame::new(token, self.config.delimiter);
        match link.device.write(frame.as_bytes(), link.write_mode).await {
            Ok(()) => {
                debug!("Sent {} bytes", frame.len());
                Ok(())
            }
            Err(err) => {
                warn!("Send failed: {}", err);
                Err(err)
            }
        }
    }

    /// Apply an adapter report delivered on the link-loss channel.
    ///
    /// A report about the currently linked device clears the link and fires a
    /// single status update; reports about a previously replaced device are
    /// ignored.
    pub fn handle_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::Disconnected { device } => {
                let current = self.link.as_ref().map(|link| link.device.id());
                if current.as_ref() == Some(&device) {
                    info!("Link to {} lost", device);
                    self.link = None;
                    self.state = LinkState::Disconnected;
                    self.notify(Some("link lost".to_string()));
                } else {
                    debug!("Ignoring link-loss report for replaced device {}", device);
                }
            }
        }
    }

    fn notify(&mut self, detail: Option<String>) {
        if let Some(sender) = &self.status_tx {
            let update = StatusUpdate {
                state: self.state.clone(),
                detail,
            };
            if sender.send(update).is_err() {
                warn!("Status receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DeviceId;
    use crate::config::Delimiter;
    use crate::error::LinkError;
    use crate::testing::{FakeAdapter, FakeCall, FakeScript};
    use crate::uart::{UART_SERVICE_UUID, UART_WRITE_CHARACTERISTIC_UUID};
    use uuid::Uuid;

    // ------------------------------------------------------------------------
    // Test Utilities
    // ------------------------------------------------------------------------

    fn session_with(script: FakeScript) -> (UartSession<FakeAdapter>, FakeAdapter) {
        let adapter = FakeAdapter::new(script);
        let handle = adapter.clone_handle();
        (UartSession::new(adapter, LinkConfig::default()), handle)
    }

    fn connect_sequence() -> Vec<FakeCall> {
        vec![
            FakeCall::Discover {
                service: UART_SERVICE_UUID,
            },
            FakeCall::Connect,
            FakeCall::Resolve {
                service: UART_SERVICE_UUID,
                characteristic: UART_WRITE_CHARACTERISTIC_UUID,
            },
            FakeCall::WatchLink,
        ]
    }

    // ------------------------------------------------------------------------
    // Send Preconditions
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_send_in_idle_is_rejected_without_adapter_call() {
        let (mut session, handle) = session_with(FakeScript::default());
        let result = session.send("3").await;
        assert_eq!(result, Err(LinkError::NotConnected));
        assert!(handle.recorder().calls().is_empty());
    }

    #[test]
    fn test_send_outside_connected_rejects_before_first_suspension() {
        let (mut session, _handle) = session_with(FakeScript::default());
        let mut task = tokio_test::task::spawn(session.send("3"));
        // The rejection happens on the first poll, with no await of the
        // adapter, so ordering against the observed state is deterministic.
        let result = tokio_test::assert_ready!(task.poll());
        assert_eq!(result, Err(LinkError::NotConnected));
    }

    #[tokio::test]
    async fn test_send_after_disconnect_is_rejected() {
        let (mut session, handle) = session_with(FakeScript::default());
        session.connect().await.unwrap();
        session.disconnect().await.unwrap();

        let result = session.send("3").await;
        assert_eq!(result, Err(LinkError::NotConnected));
        assert!(handle.recorder().writes().is_empty());
    }

    #[tokio::test]
    async fn test_send_after_failed_connect_is_rejected() {
        let (mut session, handle) = session_with(
            FakeScript::default().with_connect_failure(LinkError::connect_failed("radio off")),
        );
        assert!(session.connect().await.is_err());
        assert_eq!(session.send("3").await, Err(LinkError::NotConnected));
        assert!(handle.recorder().writes().is_empty());
    }

    // ------------------------------------------------------------------------
    // Connect
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_connect_establishes_link() {
        let (mut session, handle) = session_with(FakeScript::default());
        session.connect().await.unwrap();

        assert_eq!(session.state(), &LinkState::Connected);
        assert!(session.is_connected());
        assert_eq!(session.write_mode(), Some(WriteMode::Unacknowledged));
        assert_eq!(session.device_name(), Some("BBC micro:bit V2"));
        assert_eq!(handle.recorder().calls(), connect_sequence());
    }

    #[tokio::test]
    async fn test_connect_declares_configured_service_to_adapter() {
        let custom = Uuid::from_u128(0xFEED_0001);
        let adapter = FakeAdapter::new(FakeScript::default());
        let handle = adapter.clone_handle();
        let mut session =
            UartSession::new(adapter, LinkConfig::default().with_service(custom));

        session.connect().await.unwrap();

        let calls = handle.recorder().calls();
        assert_eq!(calls[0], FakeCall::Discover { service: custom });
        assert!(matches!(calls[2], FakeCall::Resolve { service, .. } if service == custom));
    }

    #[tokio::test]
    async fn test_connect_reports_peripheral_name() {
        let (mut session, _handle) = session_with(FakeScript::default());
        let (status_tx, mut status_rx) = status_channel();
        session.attach_status(status_tx);

        session.connect().await.unwrap();

        let update = status_rx.try_recv().unwrap();
        assert_eq!(update.state, LinkState::Connected);
        assert!(update.detail.unwrap().contains("BBC micro:bit V2"));
    }

    #[tokio::test]
    async fn test_discovery_failure_lands_error_and_allows_retry() {
        let adapter = FakeAdapter::new(FakeScript::default())
            .with_discovery_errors(vec![LinkError::discovery_failed("no matching peripheral")]);
        let mut session = UartSession::new(adapter, LinkConfig::default());
        let (status_tx, mut status_rx) = status_channel();
        session.attach_status(status_tx);

        let result = session.connect().await;
        assert!(matches!(result, Err(LinkError::DiscoveryFailed { .. })));
        assert!(matches!(session.state(), LinkState::Error(_)));
        assert!(!session.is_connected());
        let update = status_rx.try_recv().unwrap();
        assert!(matches!(update.state, LinkState::Error(_)));

        // The same session retries into a working link.
        session.connect().await.unwrap();
        assert_eq!(session.state(), &LinkState::Connected);
    }

    #[tokio::test]
    async fn test_discovery_cancelled_is_surfaced() {
        let adapter = FakeAdapter::new(FakeScript::default())
            .with_discovery_errors(vec![LinkError::DiscoveryCancelled]);
        let mut session = UartSession::new(adapter, LinkConfig::default());

        assert_eq!(session.connect().await, Err(LinkError::DiscoveryCancelled));
        assert!(matches!(session.state(), LinkState::Error(_)));
    }

    #[tokio::test]
    async fn test_missing_characteristic_fails_connect_and_closes_link() {
        let (mut session, handle) = session_with(
            FakeScript::default()
                .with_resolve_failure(LinkError::connect_failed("characteristic not found")),
        );

        let result = session.connect().await;
        assert!(matches!(result, Err(LinkError::ConnectFailed { .. })));
        assert!(matches!(session.state(), LinkState::Error(_)));
        assert!(!session.is_connected());
        // The half-open GATT link was explicitly closed.
        assert_eq!(
            handle.recorder().calls().last(),
            Some(&FakeCall::Disconnect)
        );
    }

    #[tokio::test]
    async fn test_esp_prefix_accepted_by_default_filter() {
        let (mut session, _handle) = session_with(FakeScript::default().with_name("ESP32 Keypad"));
        session.connect().await.unwrap();
        assert_eq!(session.device_name(), Some("ESP32 Keypad"));
    }

    #[tokio::test]
    async fn test_peripheral_outside_allow_list_is_not_offered() {
        let (mut session, handle) =
            session_with(FakeScript::default().with_name("Unrelated Gadget"));

        let result = session.connect().await;
        assert!(matches!(result, Err(LinkError::DiscoveryFailed { .. })));
        assert!(matches!(session.state(), LinkState::Error(_)));
        // Discovery never produced a device, so no GATT calls happened.
        assert_eq!(
            handle.recorder().calls(),
            vec![FakeCall::Discover {
                service: UART_SERVICE_UUID
            }]
        );
    }

    #[tokio::test]
    async fn test_unwritable_characteristic_fails_connect_and_closes_link() {
        let (mut session, handle) = session_with(FakeScript::default().with_support(
            crate::adapter::WriteSupport {
                acknowledged: false,
                unacknowledged: false,
            },
        ));

        let result = session.connect().await;
        assert!(matches!(result, Err(LinkError::ConnectFailed { .. })));
        assert!(!session.is_connected());
        assert_eq!(session.write_mode(), None);
        // The half-open GATT link was explicitly closed.
        assert_eq!(
            handle.recorder().calls().last(),
            Some(&FakeCall::Disconnect)
        );
    }

    #[tokio::test]
    async fn test_connect_replaces_existing_link() {
        let (mut session, handle) = session_with(FakeScript::default());
        session.connect().await.unwrap();
        session.connect().await.unwrap();

        let mut expected = connect_sequence();
        expected.push(FakeCall::Disconnect);
        expected.extend(connect_sequence());
        assert_eq!(handle.recorder().calls(), expected);
        assert_eq!(session.state(), &LinkState::Connected);
    }

    #[tokio::test]
    async fn test_unnamed_peripheral_connects_without_detail() {
        let (mut session, _handle) = session_with(FakeScript::default().with_no_name());
        let (status_tx, mut status_rx) = status_channel();
        session.attach_status(status_tx);

        session.connect().await.unwrap();
        assert_eq!(session.device_name(), None);
        let update = status_rx.try_recv().unwrap();
        assert_eq!(update.state, LinkState::Connected);
        assert_eq!(update.detail, None);
    }

    // ------------------------------------------------------------------------
    // Write Mode Selection
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_ack_only_characteristic_uses_acknowledged_writes() {
        let (mut session, handle) = session_with(FakeScript::ack_only());
        session.connect().await.unwrap();
        assert_eq!(session.write_mode(), Some(WriteMode::Acknowledged));

        session.send("1").await.unwrap();
        let writes = handle.recorder().writes();
        assert_eq!(writes, vec![(b"1\n".to_vec(), WriteMode::Acknowledged)]);
    }

    #[tokio::test]
    async fn test_unacknowledged_preferred_when_advertised() {
        let (mut session, handle) = session_with(FakeScript::unack_only());
        session.connect().await.unwrap();
        assert_eq!(session.write_mode(), Some(WriteMode::Unacknowledged));

        session.send("1").await.unwrap();
        let writes = handle.recorder().writes();
        assert_eq!(writes, vec![(b"1\n".to_vec(), WriteMode::Unacknowledged)]);
    }

    #[tokio::test]
    async fn test_write_mode_resolved_once_per_connect() {
        let (mut session, handle) = session_with(FakeScript::default());
        session.connect().await.unwrap();
        session.send("1").await.unwrap();
        session.send("2").await.unwrap();
        session.send("3").await.unwrap();

        let resolves = handle
            .recorder()
            .calls()
            .iter()
            .filter(|call| matches!(call, FakeCall::Resolve { .. }))
            .count();
        assert_eq!(resolves, 1);
    }

    // ------------------------------------------------------------------------
    // Framing
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_send_appends_line_feed_delimiter() {
        let (mut session, handle) = session_with(FakeScript::default());
        session.connect().await.unwrap();
        session.send("7").await.unwrap();

        let writes = handle.recorder().writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, b"7\n".to_vec());
    }

    #[tokio::test]
    async fn test_send_without_delimiter_writes_payload_alone() {
        let adapter = FakeAdapter::new(FakeScript::default());
        let handle = adapter.clone_handle();
        let config = LinkConfig::default().with_delimiter(Delimiter::None);
        let mut session = UartSession::new(adapter, config);

        session.connect().await.unwrap();
        session.send("7").await.unwrap();
        assert_eq!(handle.recorder().writes()[0].0, b"7".to_vec());
    }

    // ------------------------------------------------------------------------
    // Disconnect
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_disconnect_clears_link() {
        let (mut session, handle) = session_with(FakeScript::default());
        session.connect().await.unwrap();
        session.disconnect().await.unwrap();

        assert_eq!(session.state(), &LinkState::Disconnected);
        assert!(!session.is_connected());
        assert_eq!(session.write_mode(), None);
        assert_eq!(session.device_name(), None);
        assert_eq!(
            handle.recorder().calls().last(),
            Some(&FakeCall::Disconnect)
        );
    }

    #[tokio::test]
    async fn test_second_disconnect_performs_no_adapter_call() {
        let (mut session, handle) = session_with(FakeScript::default());
        session.connect().await.unwrap();
        session.disconnect().await.unwrap();
        let calls_after_first = handle.recorder().calls().len();

        session.disconnect().await.unwrap();
        assert_eq!(session.state(), &LinkState::Disconnected);
        assert_eq!(handle.recorder().calls().len(), calls_after_first);
    }

    #[tokio::test]
    async fn test_disconnect_from_idle_reports_disconnected() {
        let (mut session, handle) = session_with(FakeScript::default());
        let (status_tx, mut status_rx) = status_channel();
        session.attach_status(status_tx);

        session.disconnect().await.unwrap();
        assert_eq!(session.state(), &LinkState::Disconnected);
        assert!(handle.recorder().calls().is_empty());
        assert_eq!(status_rx.try_recv().unwrap().state, LinkState::Disconnected);
    }

    // ------------------------------------------------------------------------
    // Send Failures
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_send_failure_does_not_change_state() {
        let (mut session, _handle) = session_with(
            FakeScript::default().with_write_failure(LinkError::send_failed("write refused")),
        );
        let (status_tx, mut status_rx) = status_channel();
        session.attach_status(status_tx);
        session.connect().await.unwrap();
        status_rx.try_recv().unwrap();

        let result = session.send("5").await;
        assert!(matches!(result, Err(LinkError::SendFailed { .. })));
        assert_eq!(session.state(), &LinkState::Connected);
        assert!(session.is_connected());
        // No status traffic from a send failure; the caller already holds it.
        assert!(status_rx.try_recv().is_err());
    }

    // ------------------------------------------------------------------------
    // Spontaneous Link Loss
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_spontaneous_disconnect_notifies_exactly_once() {
        let (mut session, handle) = session_with(FakeScript::default());
        let (status_tx, mut status_rx) = status_channel();
        session.attach_status(status_tx);
        let mut events = session.take_adapter_events().unwrap();

        session.connect().await.unwrap();
        status_rx.try_recv().unwrap();

        assert!(handle.trigger_link_loss());
        let event = events.recv().await.unwrap();
        session.handle_adapter_event(event);

        assert_eq!(session.state(), &LinkState::Disconnected);
        assert!(!session.is_connected());
        assert_eq!(session.write_mode(), None);

        let update = status_rx.try_recv().unwrap();
        assert_eq!(update.state, LinkState::Disconnected);
        assert!(status_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_link_loss_report_is_ignored() {
        let (mut session, _handle) = session_with(FakeScript::default());
        let (status_tx, mut status_rx) = status_channel();
        session.attach_status(status_tx);
        session.connect().await.unwrap();
        status_rx.try_recv().unwrap();

        session.handle_adapter_event(AdapterEvent::Disconnected {
            device: DeviceId::new("some-replaced-device"),
        });

        assert_eq!(session.state(), &LinkState::Connected);
        assert!(session.is_connected());
        assert!(status_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_adapter_events_receiver_taken_once() {
        let (mut session, _handle) = session_with(FakeScript::default());
        assert!(session.take_adapter_events().is_some());
        assert!(session.take_adapter_events().is_none());
    }
}
