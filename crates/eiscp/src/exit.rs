use std::fmt;
use std::io;

use eiscp_frame::FrameError;
use eiscp_session::SessionError;
use eiscp_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { ref source, .. } | TransportError::Connect { ref source, .. } => {
            CliError::new(io_code(source.kind()), format!("{context}: {err}"))
        }
        TransportError::Accept(source) | TransportError::Io(source) => io_error(context, source),
        TransportError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::InvalidCommand(_) | FrameError::MessageTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other if other.is_integrity() => {
            CliError::new(DATA_INVALID, format!("{context}: {other}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::Write(source) => io_error(context, source),
        SessionError::SessionClosed | SessionError::HandleClosed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn refused_connect_is_transport_error() {
        let err = TransportError::Connect {
            address: "10.0.0.5:60128".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let cli = session_error("connect failed", SessionError::Transport(err));
        assert_eq!(cli.code, TRANSPORT_ERROR);
        assert!(cli.message.contains("10.0.0.5:60128"));
    }

    #[test]
    fn connect_timeout_is_124() {
        let err = TransportError::Timeout {
            address: "10.0.0.5:60128".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(transport_error("connect failed", err).code, TIMEOUT);
    }

    #[test]
    fn oversize_message_is_usage_error() {
        let err = FrameError::MessageTooLong { size: 14, max: 13 };
        assert_eq!(frame_error("send failed", err).code, USAGE);
    }

    #[test]
    fn integrity_error_is_data_invalid() {
        assert_eq!(
            frame_error("receive failed", FrameError::InvalidMagic).code,
            DATA_INVALID
        );
    }

    #[test]
    fn closed_session_is_failure() {
        assert_eq!(
            session_error("send failed", SessionError::SessionClosed).code,
            FAILURE
        );
    }
}
