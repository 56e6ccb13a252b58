//! Fixed-size packet framing for eISCP (ISCP over Ethernet).
//!
//! Every message travels in a 32-byte packet:
//! - A 16-byte header: `ISCP` magic, header size, data size, version
//! - A 16-byte data segment: `!1` start marker, up to 13 message bytes,
//!   a direction-specific end-of-packet byte, zero padding
//!
//! Encoding writes into a caller-owned buffer so a session can reuse one
//! transmit buffer for its whole lifetime.

#[cfg(feature = "async")]
pub mod codec;
pub mod dump;
pub mod error;
pub mod message;
pub mod packet;

#[cfg(feature = "async")]
pub use codec::PacketCodec;
pub use dump::{hex_dump, PacketDump};
pub use error::{FrameError, Result};
pub use message::{Message, COMMAND_SIZE, QUERY};
pub use packet::{
    decode_packet, encode_packet, new_packet, validate_packet, Packet, END_OF_PACKET_RX,
    END_OF_PACKET_TX, HEADER_SIZE, MAGIC, MAX_DATA_SIZE, MAX_MESSAGE_SIZE, PACKET_SIZE,
};
