//! Interactive keypad application
//!
//! Owns the UART session and a raw-mode terminal loop: digits 1-9 write
//! tokens to the peripheral, `c` connects, `d` disconnects, `q` quits.
//! Status updates and adapter link-loss reports are drained between input
//! polls, so a spontaneous disconnect surfaces without any keypress.

use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use padlink_ble::BleUartAdapter;
use padlink_core::{
    status_channel, AdapterEventReceiver, LinkConfig, LinkState, StatusReceiver, StatusUpdate,
    UartAdapter, UartSession,
};
use tracing::{info, warn};

use crate::error::{CliError, Result};

/// How long one input poll waits before the channels are drained.
const TICK_RATE: Duration = Duration::from_millis(150);

// ----------------------------------------------------------------------------
// Keypad Application
// ----------------------------------------------------------------------------

/// Interactive keypad over one UART session
pub struct KeypadApp<A: UartAdapter> {
    session: UartSession<A>,
    status_rx: StatusReceiver,
    link_events: AdapterEventReceiver,
}

impl KeypadApp<BleUartAdapter> {
    /// Build the keypad over the platform BLE adapter.
    pub async fn over_ble(config: LinkConfig) -> Result<Self> {
        let adapter = BleUartAdapter::new(config.clone()).await?;
        Self::from_session(UartSession::new(adapter, config))
    }
}

impl<A: UartAdapter> KeypadApp<A> {
    /// Wrap an existing session, claiming its status and link-loss channels.
    pub fn from_session(mut session: UartSession<A>) -> Result<Self> {
        let (status_tx, status_rx) = status_channel();
        session.attach_status(status_tx);
        let link_events = session
            .take_adapter_events()
            .ok_or_else(|| CliError::Session("link event channel already claimed".to_string()))?;
        Ok(Self {
            session,
            status_rx,
            link_events,
        })
    }

    /// Run the raw-mode input loop until the user quits. A link still live
    /// on quit is closed before the terminal is restored.
    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        print_line("padlink keypad: 1-9 send a token, c connect, d disconnect, q quit");

        let result = self.event_loop().await;

        if self.session.is_connected() {
            if let Err(e) = self.session.disconnect().await {
                warn!("Failed to close link on exit: {}", e);
            }
        }
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal: {}", e);
        }
        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            if event::poll(TICK_RATE)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key).await {
                        break;
                    }
                }
            }
            self.drain_link_events();
            self.drain_status();
        }
        Ok(())
    }

    /// Dispatch one key press; returns `true` when the app should quit.
    async fn handle_key(&mut self, key: KeyEvent) -> bool {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => return true,
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => return true,
            (KeyCode::Char('c'), _) => {
                print_line("connecting...");
                // Failures also land on the status channel and are printed
                // from there on the next tick.
                if let Err(e) = self.session.connect().await {
                    warn!("Connect failed: {}", e);
                }
            }
            (KeyCode::Char('d'), _) => {
                if let Err(e) = self.session.disconnect().await {
                    warn!("Disconnect failed: {}", e);
                }
            }
            (KeyCode::Char(digit @ '1'..='9'), _) => {
                let token = digit.to_string();
                match self.session.send(&token).await {
                    Ok(()) => print_line(&format!("sent {}", token)),
                    Err(e) => print_line(&format!("send failed: {}", e)),
                }
            }
            _ => {}
        }
        false
    }

    fn drain_link_events(&mut self) {
        while let Ok(event) = self.link_events.try_recv() {
            self.session.handle_adapter_event(event);
        }
    }

    fn drain_status(&mut self) {
        while let Ok(update) = self.status_rx.try_recv() {
            print_line(&format_status(&update));
        }
    }
}

/// One status line for the terminal. The error state already embeds its
/// reason, so the detail is only appended for the other states.
fn format_status(update: &StatusUpdate) -> String {
    match (&update.state, &update.detail) {
        (LinkState::Error(_), _) => format!("[{}]", update.state),
        (state, Some(detail)) => format!("[{}] {}", state, detail),
        (state, None) => format!("[{}]", state),
    }
}

// Raw mode leaves the cursor where the line ended, so every line feeds a
// carriage return as well.
fn print_line(text: &str) {
    let mut stdout = io::stdout();
    let _ = write!(stdout, "{}\r\n", text);
    let _ = stdout.flush();
}

// ----------------------------------------------------------------------------
// One-shot Send
// ----------------------------------------------------------------------------

/// Connect, write each token in order, then close the link.
pub async fn send_tokens(config: LinkConfig, tokens: &[String]) -> Result<()> {
    validate_tokens(tokens)?;

    let adapter = BleUartAdapter::new(config.clone()).await?;
    let mut session = UartSession::new(adapter, config);
    run_send(&mut session, tokens).await
}

fn validate_tokens(tokens: &[String]) -> Result<()> {
    for token in tokens {
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
            return Err(CliError::InvalidToken(token.clone()));
        }
    }
    Ok(())
}

async fn run_send<A: UartAdapter>(session: &mut UartSession<A>, tokens: &[String]) -> Result<()> {
    session.connect().await?;

    let mut outcome = Ok(());
    for token in tokens {
        info!("Sending {}", token);
        if let Err(e) = session.send(token).await {
            outcome = Err(e.into());
            break;
        }
    }

    // The link is closed even when a write failed part-way.
    session.disconnect().await?;
    outcome
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
