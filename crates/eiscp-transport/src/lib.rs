//! TCP transport for eISCP devices.
//!
//! A device accepts exactly one control connection at a time, so this layer
//! stays small: resolve the device address, open the stream, and (for
//! emulators and tests) bind a listener that plays the device side.
//!
//! Everything above builds on the [`tokio::net::TcpStream`] returned here.

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::{
    connect, connect_with_config, normalize_address, DeviceListener, TransportConfig,
    DEFAULT_PORT,
};
