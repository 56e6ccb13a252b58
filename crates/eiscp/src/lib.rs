//! Control Onkyo/Integra receivers over eISCP (ISCP over Ethernet).
//!
//! A receiver accepts a single control connection. This crate packs ISCP
//! messages into fixed 32-byte packets and shares that one connection between
//! any number of consumers.
//!
//! # Crate Structure
//!
//! - [`transport`]: device addressing, TCP connect, device-side listener
//! - [`frame`]: the 32-byte packet codec and integrity checks
//! - [`session`]: the shared device session, subscribers and state cache
//!
//! ```no_run
//! # async fn demo() -> eiscp::session::Result<()> {
//! let session = eiscp::session::connect("192.168.1.40").await?;
//! let mut subscriber = session.attach()?;
//! subscriber.query("PWR").await?;
//! let reply = subscriber.receive().await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use eiscp_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use eiscp_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use eiscp_session::*;
}
