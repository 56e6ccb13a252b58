//! Shared device session for eISCP.
//!
//! A device accepts one control connection. [`Session`] owns it and lets any
//! number of [`Subscriber`]s share it: writes are serialized through a single
//! dispatch task, and every message from the device is fanned out to all
//! subscribers. A subscriber that stops draining its queue is dropped rather
//! than allowed to stall the link.

pub mod config;
pub mod error;
pub mod session;
pub mod state;
pub mod subscriber;

#[cfg(test)]
mod test_support;

pub use config::SessionConfig;
pub use eiscp_frame::Message;
pub use error::{Result, SessionError};
pub use session::{connect, connect_with_config, CloseReason, Session, SessionState};
pub use state::StateCache;
pub use subscriber::{MessageStream, Subscriber, SubscriberId};
