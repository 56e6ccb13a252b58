use crate::error::{FrameError, Result};
use crate::message::{Message, COMMAND_SIZE};

/// Header: magic (4) + reserved (3) + header size (1) + reserved (3) + data size (1) + version (4).
pub const HEADER_SIZE: usize = 16;

/// Data segment size (fixed; only `data size` bytes of it are used).
pub const MAX_DATA_SIZE: usize = 16;

/// Total packet size on the wire.
pub const PACKET_SIZE: usize = HEADER_SIZE + MAX_DATA_SIZE;

/// Magic bytes: "ISCP" (0x49 0x53 0x43 0x50).
pub const MAGIC: [u8; 4] = *b"ISCP";

/// ISCP version marker.
pub const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Data start: '!' followed by the unit type ('1' for receiver).
pub const DATA_START: [u8; 2] = *b"!1";

/// End-of-packet byte for packets sent to the device.
pub const END_OF_PACKET_TX: u8 = 0x0a;

/// End-of-packet byte for packets received from the device.
pub const END_OF_PACKET_RX: u8 = 0x1a;

const HEADER_SIZE_INDEX: usize = 7;
const DATA_SIZE_INDEX: usize = 11;
const VERSION_INDEX: usize = 12;
const END_OF_PACKET_SIZE: usize = 1;
const DATA_OVERHEAD: usize = DATA_START.len() + END_OF_PACKET_SIZE;
const MIN_DATA_SIZE: usize = DATA_OVERHEAD + COMMAND_SIZE;
const MESSAGE_OFFSET: usize = HEADER_SIZE + DATA_START.len();

/// Largest message (command + parameter) that fits in one packet.
pub const MAX_MESSAGE_SIZE: usize = MAX_DATA_SIZE - DATA_OVERHEAD;

/// One eISCP packet.
pub type Packet = [u8; PACKET_SIZE];

/// A packet with the fixed header fields and data start filled in and an empty message.
pub fn new_packet() -> Packet {
    let mut packet = [0u8; PACKET_SIZE];
    packet[..MAGIC.len()].copy_from_slice(&MAGIC);
    packet[HEADER_SIZE_INDEX] = HEADER_SIZE as u8;
    packet[VERSION_INDEX..HEADER_SIZE].copy_from_slice(&VERSION);
    packet[HEADER_SIZE..MESSAGE_OFFSET].copy_from_slice(&DATA_START);
    packet
}

/// Encode a message into `dst`.
///
/// Wire format:
/// ```text
/// offset  0..4   "ISCP"
///         7      header size (16)
///         11     data size
///         12..16 version (1 0 0 0)
///         16..18 "!1"
///         18..   command + parameter (≤ 13 bytes), end-of-packet byte, zero padding
/// ```
/// `size` counts the used part of the data segment: message length + 3.
/// `dst` is left untouched when the message does not fit.
pub fn encode_packet(message: &Message, end_of_packet: u8, dst: &mut Packet) -> Result<()> {
    let size = message.wire_len();
    if size > MAX_MESSAGE_SIZE {
        return Err(FrameError::MessageTooLong {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }

    dst[..HEADER_SIZE].fill(0);
    dst[..MAGIC.len()].copy_from_slice(&MAGIC);
    dst[HEADER_SIZE_INDEX] = HEADER_SIZE as u8;
    dst[DATA_SIZE_INDEX] = (size + DATA_OVERHEAD) as u8;
    dst[VERSION_INDEX..HEADER_SIZE].copy_from_slice(&VERSION);
    dst[HEADER_SIZE..MESSAGE_OFFSET].copy_from_slice(&DATA_START);

    let command_end = MESSAGE_OFFSET + message.command().len();
    dst[MESSAGE_OFFSET..command_end].copy_from_slice(message.command().as_bytes());
    let message_end = command_end + message.parameter().len();
    dst[command_end..message_end].copy_from_slice(message.parameter().as_bytes());

    dst[message_end] = end_of_packet;
    dst[message_end + END_OF_PACKET_SIZE..].fill(0);
    Ok(())
}

/// Extract the message from a packet.
///
/// Call [`validate_packet`] first; this only reads the data size field and payload.
pub fn decode_packet(packet: &Packet) -> Result<Message> {
    let data_size = packet[DATA_SIZE_INDEX] as usize;
    let message_size = data_size
        .saturating_sub(DATA_OVERHEAD)
        .min(MAX_MESSAGE_SIZE);
    Message::from_payload(&packet[MESSAGE_OFFSET..MESSAGE_OFFSET + message_size])
}

/// Integrity check, in order: magic, data start, header size, data size bounds,
/// then the end-of-packet byte at the position implied by the data size.
pub fn validate_packet(packet: &Packet, end_of_packet: u8) -> Result<()> {
    if packet[..MAGIC.len()] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }
    if packet[HEADER_SIZE..MESSAGE_OFFSET] != DATA_START {
        return Err(FrameError::InvalidDataStart);
    }

    let header_size = packet[HEADER_SIZE_INDEX];
    if header_size as usize != HEADER_SIZE {
        return Err(FrameError::InvalidHeaderSize {
            found: header_size,
            expected: HEADER_SIZE as u8,
        });
    }

    let data_size = packet[DATA_SIZE_INDEX];
    if data_size as usize > MAX_DATA_SIZE {
        return Err(FrameError::DataSizeTooLarge {
            found: data_size,
            max: MAX_DATA_SIZE as u8,
        });
    }
    if (data_size as usize) < MIN_DATA_SIZE {
        return Err(FrameError::DataSizeTooSmall {
            found: data_size,
            min: MIN_DATA_SIZE as u8,
        });
    }

    let found = packet[HEADER_SIZE + data_size as usize - END_OF_PACKET_SIZE];
    if found != end_of_packet {
        return Err(FrameError::InvalidEndOfPacket {
            found,
            expected: end_of_packet,
        });
    }

    Ok(())
}
