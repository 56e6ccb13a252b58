/// Errors that can occur while building, encoding, or validating packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The command is not exactly three ASCII characters.
    #[error("invalid command {0:?} (expected 3 ASCII characters)")]
    InvalidCommand(String),

    /// The packet payload cannot be turned into a message.
    #[error("invalid message payload: {0}")]
    InvalidPayload(String),

    /// The serialized message does not fit in the data segment.
    #[error("message too long ({size} bytes, max {max})")]
    MessageTooLong { size: usize, max: usize },

    /// The first four header bytes are not `ISCP`.
    #[error("first 4 header bytes do not match ISCP")]
    InvalidMagic,

    /// The data segment does not begin with `!1`.
    #[error("first 2 data bytes do not match !1")]
    InvalidDataStart,

    /// The header size field is not 16.
    #[error("header size {found:#04x} is not expected size {expected:#04x}")]
    InvalidHeaderSize { found: u8, expected: u8 },

    /// The data size field exceeds the data segment.
    #[error("data size {found:#04x} greater than max size {max:#04x}")]
    DataSizeTooLarge { found: u8, max: u8 },

    /// The data size field is too small to hold a command.
    #[error("data size {found:#04x} smaller than min size {min:#04x}")]
    DataSizeTooSmall { found: u8, min: u8 },

    /// The end-of-packet byte does not match the expected direction.
    #[error("end of packet {found:#04x} did not match expected value {expected:#04x}")]
    InvalidEndOfPacket { found: u8, expected: u8 },

    /// An I/O error occurred while reading or writing packets.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Returns true for structural packet failures (the packet can be dropped
    /// and the stream continued).
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidMagic
                | FrameError::InvalidDataStart
                | FrameError::InvalidHeaderSize { .. }
                | FrameError::DataSizeTooLarge { .. }
                | FrameError::DataSizeTooSmall { .. }
                | FrameError::InvalidEndOfPacket { .. }
                | FrameError::InvalidPayload(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
