use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// Length of an ISCP command code in bytes.
pub const COMMAND_SIZE: usize = 3;

/// Parameter value asking the device to report the current value of a command.
pub const QUERY: &str = "QSTN";

/// An ISCP message: a 3-character command plus a variable-length parameter.
///
/// On the wire the two parts are simply concatenated (`PWR` + `01` → `PWR01`).
/// JSON uses `{"Command": "PWR", "Parameter": "01"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MessageFields")]
pub struct Message {
    #[serde(rename = "Command")]
    command: String,
    #[serde(rename = "Parameter")]
    parameter: String,
}

impl Message {
    /// Create a message, checking that the command is exactly 3 ASCII characters.
    pub fn new(command: impl Into<String>, parameter: impl Into<String>) -> Result<Self> {
        let command = command.into();
        if command.len() != COMMAND_SIZE || !command.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(FrameError::InvalidCommand(command));
        }
        Ok(Self {
            command,
            parameter: parameter.into(),
        })
    }

    /// Split a raw ISCP string such as `PWR01` into command and parameter.
    ///
    /// Trailing CR/LF is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim_end_matches(['\r', '\n']);
        if raw.len() < COMMAND_SIZE || !raw.is_char_boundary(COMMAND_SIZE) {
            return Err(FrameError::InvalidCommand(raw.to_string()));
        }
        let (command, parameter) = raw.split_at(COMMAND_SIZE);
        Self::new(command, parameter)
    }

    /// Build the `QSTN` query for a command (e.g. `PWRQSTN`).
    pub fn query(command: impl Into<String>) -> Result<Self> {
        Self::new(command, QUERY)
    }

    /// Build a message from a packet payload (command bytes followed by parameter bytes).
    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|err| FrameError::InvalidPayload(format!("not UTF-8: {err}")))?;
        if text.len() < COMMAND_SIZE || !text.is_char_boundary(COMMAND_SIZE) {
            return Err(FrameError::InvalidPayload(format!(
                "{} bytes is shorter than a command",
                text.len()
            )));
        }
        let (command, parameter) = text.split_at(COMMAND_SIZE);
        Self::new(command, parameter)
    }

    /// The 3-character command code.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The parameter (may be empty).
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    /// True if this message asks the device for the command's current value.
    pub fn is_query(&self) -> bool {
        self.parameter == QUERY
    }

    /// Number of bytes the message occupies in a packet payload.
    pub fn wire_len(&self) -> usize {
        self.command.len() + self.parameter.len()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.command, self.parameter)
    }
}

impl FromStr for Message {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Deserialize)]
struct MessageFields {
    #[serde(rename = "Command")]
    command: String,
    #[serde(rename = "Parameter", default)]
    parameter: String,
}

impl TryFrom<MessageFields> for Message {
    type Error = FrameError;

    fn try_from(fields: MessageFields) -> Result<Self> {
        Message::new(fields.command, fields.parameter)
    }
}
