//! padlink CLI library
//!
//! Components for the padlink command-line interface: argument parsing,
//! configuration loading, and the interactive keypad application.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;

pub use app::{send_tokens, KeypadApp};
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};

// Re-export commonly used link types
pub use padlink_core::{LinkConfig, LinkState};
