use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::dump::PacketDump;
use crate::error::FrameError;
use crate::message::Message;
use crate::packet::{
    decode_packet, encode_packet, new_packet, validate_packet, Packet, END_OF_PACKET_RX,
    END_OF_PACKET_TX, PACKET_SIZE,
};

/// `tokio_util` codec over a stream of back-to-back 32-byte packets.
///
/// Malformed packets are logged and skipped; only I/O failures end the stream.
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    inbound_end: u8,
    outbound_end: u8,
}

impl PacketCodec {
    /// Codec with explicit end-of-packet bytes for each direction.
    pub fn new(inbound_end: u8, outbound_end: u8) -> Self {
        Self {
            inbound_end,
            outbound_end,
        }
    }

    /// Controller side: reads device packets, writes controller packets.
    pub fn controller() -> Self {
        Self::new(END_OF_PACKET_RX, END_OF_PACKET_TX)
    }

    /// Device side: reads controller packets, writes device packets.
    pub fn device() -> Self {
        Self::new(END_OF_PACKET_TX, END_OF_PACKET_RX)
    }
}

impl Decoder for PacketCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        while src.len() >= PACKET_SIZE {
            let mut packet: Packet = [0u8; PACKET_SIZE];
            packet.copy_from_slice(&src[..PACKET_SIZE]);
            src.advance(PACKET_SIZE);

            let decoded =
                validate_packet(&packet, self.inbound_end).and_then(|()| decode_packet(&packet));
            match decoded {
                Ok(message) => return Ok(Some(message)),
                Err(err) => {
                    warn!(error = %err, dump = %PacketDump(&packet), "dropping bad packet");
                }
            }
        }

        src.reserve(PACKET_SIZE - src.len());
        Ok(None)
    }
}

impl Encoder<Message> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), FrameError> {
        let mut packet = new_packet();
        encode_packet(&item, self.outbound_end, &mut packet)?;
        dst.extend_from_slice(&packet);
        Ok(())
    }
}
