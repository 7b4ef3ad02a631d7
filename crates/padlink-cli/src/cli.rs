//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};
use padlink_core::Delimiter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Accept peripherals whose advertised name starts with this prefix
    /// (repeatable, replaces the configured allow-list)
    #[arg(long = "name-prefix", value_name = "PREFIX")]
    pub name_prefixes: Vec<String>,

    /// Terminator appended to every token: "lf", "cr", "none", or a byte value
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<Delimiter>,

    /// Send tokens without a terminator (same as --delimiter none)
    #[arg(long, conflicts_with = "delimiter")]
    pub no_delimiter: bool,

    /// Seconds to scan for a matching peripheral before giving up
    #[arg(long, value_name = "SECS")]
    pub scan_timeout: Option<u64>,

    /// Seconds to wait for the GATT connection to come up
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Use acknowledged writes even when the peripheral allows unacknowledged ones
    #[arg(long)]
    pub acknowledged: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive the keypad interactively (the default)
    Keypad,
    /// Write the given digit tokens in order, then exit
    Send {
        /// Digit tokens to write
        #[arg(required = true)]
        tokens: Vec<String>,
    },
}

fn parse_delimiter(value: &str) -> Result<Delimiter, String> {
    match value {
        "lf" => Ok(Delimiter::LineFeed),
        "cr" => Ok(Delimiter::CarriageReturn),
        "none" => Ok(Delimiter::None),
        other => other
            .parse::<u8>()
            .map(Delimiter::Byte)
            .map_err(|_| format!("expected \"lf\", \"cr\", \"none\", or a byte value, got {:?}", other)),
    }
}
