/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error (connecting to the device).
    #[error("transport error: {0}")]
    Transport(#[from] eiscp_transport::TransportError),

    /// Frame-level error (message does not fit, bad packet).
    #[error("frame error: {0}")]
    Frame(#[from] eiscp_frame::FrameError),

    /// Writing a packet to the device failed. The session stays open.
    #[error("write to device failed: {0}")]
    Write(#[source] std::io::Error),

    /// The device connection is gone.
    #[error("device session closed")]
    SessionClosed,

    /// The subscriber was closed, either explicitly or for falling behind.
    #[error("subscriber closed")]
    HandleClosed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
