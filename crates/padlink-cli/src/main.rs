//! padlink - drive a BLE UART keypad peripheral from the terminal

use clap::Parser;
use tracing::error;

use padlink_cli::{
    app::{send_tokens, KeypadApp},
    cli::{Cli, Commands},
    config::AppConfig,
    error::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    let interactive = matches!(cli.command, None | Some(Commands::Keypad));
    setup_logging(cli.verbose, interactive);

    // Load configuration and apply command-line overrides
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_overrides(&cli);
    config.validate()?;

    match cli.command.unwrap_or(Commands::Keypad) {
        Commands::Keypad => {
            let mut app = KeypadApp::over_ble(config.link).await?;
            if let Err(e) = app.run().await {
                error!("Keypad exited with error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Send { tokens } => {
            if let Err(e) = send_tokens(config.link, &tokens).await {
                error!("Send failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool, interactive: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else if interactive {
        // Routine log lines would garble the raw-mode keypad screen.
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
