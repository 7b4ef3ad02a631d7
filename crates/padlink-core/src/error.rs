//! Error types for the UART link
//!
//! Every transport operation returns one of these variants instead of logging
//! and swallowing the failure; the UI layer decides presentation. All variants
//! are recoverable by operator retry and none should abort the process.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors surfaced by the UART link
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The operator declined or aborted device discovery.
    #[error("Device discovery cancelled")]
    DiscoveryCancelled,

    /// No matching peripheral was found, or the adapter could not scan.
    #[error("Device discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    /// GATT connect or service/characteristic resolution failed.
    #[error("Connection failed: {reason}")]
    ConnectFailed { reason: String },

    /// A send was attempted while no link was established.
    #[error("Not connected")]
    NotConnected,

    /// The adapter rejected a characteristic write.
    #[error("Send failed: {reason}")]
    SendFailed { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl LinkError {
    /// Create a discovery failure with a reason
    pub fn discovery_failed<R: Into<String>>(reason: R) -> Self {
        LinkError::DiscoveryFailed {
            reason: reason.into(),
        }
    }

    /// Create a connection failure with a reason
    pub fn connect_failed<R: Into<String>>(reason: R) -> Self {
        LinkError::ConnectFailed {
            reason: reason.into(),
        }
    }

    /// Create a send failure with a reason
    pub fn send_failed<R: Into<String>>(reason: R) -> Self {
        LinkError::SendFailed {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type LinkResult<T> = core::result::Result<T, LinkError>;
