use std::time::Duration;

use clap::{Args, Subcommand};
use eiscp_session::{Session, SessionConfig};
use eiscp_transport::TransportConfig;

use crate::exit::{session_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod emulate;
pub mod listen;
pub mod send;
pub mod state;
pub mod version;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message to a device.
    Send(SendArgs),
    /// Print messages from a device.
    Listen(ListenArgs),
    /// Query a device and print what it reports.
    State(StateArgs),
    /// Pretend to be a device, for testing controllers.
    Emulate(EmulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format).await,
        Command::Listen(args) => listen::run(args, format).await,
        Command::State(args) => state::run(args, format).await,
        Command::Emulate(args) => emulate::run(args).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device address (host, host:port or :port).
    pub address: String,
    /// Raw ISCP message, e.g. PWR01.
    pub message: String,
    /// Wait for the device to report the same command and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Device address (host, host:port or :port).
    #[arg(env = "EISCP_ADDRESS")]
    pub address: String,
    /// Only print these commands (comma-separated).
    #[arg(long = "command", value_delimiter = ',')]
    pub commands: Option<Vec<String>>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct StateArgs {
    /// Device address (host, host:port or :port).
    #[arg(env = "EISCP_ADDRESS")]
    pub address: String,
    /// Commands to query (comma-separated), e.g. PWR,MVL,SLI.
    #[arg(long, value_delimiter = ',', required = true)]
    pub query: Vec<String>,
    /// How long to wait for every reply (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct EmulateArgs {
    /// Address to listen on (e.g. :60128, 0.0.0.0:60128).
    pub address: String,
    /// Pause before each reply (e.g. 40ms, 1s).
    #[arg(long, default_value = "40ms")]
    pub delay: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) async fn open_session(address: &str) -> CliResult<Session> {
    let config = SessionConfig::default().with_transport(TransportConfig {
        connect_timeout: Some(CONNECT_TIMEOUT),
        ..TransportConfig::default()
    });
    eiscp_session::connect_with_config(address, config)
        .await
        .map_err(|err| session_error("connect failed", err))
}

/// Display name for the connected device.
pub(crate) fn device_name(session: &Session, address: &str) -> String {
    session
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| address.to_string())
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("40ms").unwrap(), Duration::from_millis(40));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
