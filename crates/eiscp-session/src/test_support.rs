use std::future::Future;
use std::time::Duration;

use eiscp_frame::{
    decode_packet, encode_packet, new_packet, validate_packet, Message, Packet, END_OF_PACKET_RX,
    END_OF_PACKET_TX,
};
use eiscp_transport::DeviceListener;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::SessionConfig;
use crate::session::{connect_with_config, Session};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Fail the test instead of hanging.
pub(crate) async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("timed out")
}

pub(crate) async fn connected_pair() -> (Session, DeviceConn) {
    connected_pair_with(SessionConfig::default()).await
}

pub(crate) async fn connected_pair_with(config: SessionConfig) -> (Session, DeviceConn) {
    let listener = DeviceListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().to_string();

    let (session, accepted) = tokio::join!(connect_with_config(&address, config), listener.accept());
    let (stream, _peer) = accepted.unwrap();
    (session.unwrap(), DeviceConn::new(stream))
}

/// The device end of a test connection.
pub(crate) struct DeviceConn {
    stream: Option<TcpStream>,
}

impl DeviceConn {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    fn stream(&mut self) -> &mut TcpStream {
        self.stream.as_mut().expect("device connection closed")
    }

    /// Send a message the way a device does.
    pub(crate) async fn send(&mut self, raw: &str) {
        let mut packet = new_packet();
        encode_packet(&Message::parse(raw).unwrap(), END_OF_PACKET_RX, &mut packet).unwrap();
        self.send_bytes(&packet).await;
    }

    pub(crate) async fn send_bytes(&mut self, bytes: &[u8]) {
        self.stream().write_all(bytes).await.unwrap();
    }

    pub(crate) async fn recv_packet(&mut self) -> Packet {
        let mut packet = new_packet();
        within(self.stream().read_exact(&mut packet))
            .await
            .unwrap();
        packet
    }

    /// Next message from the controller; panics if the packet is malformed.
    pub(crate) async fn recv(&mut self) -> Message {
        let packet = self.recv_packet().await;
        validate_packet(&packet, END_OF_PACKET_TX).unwrap();
        decode_packet(&packet).unwrap()
    }

    pub(crate) async fn expect_eof(&mut self) {
        let mut buf = [0u8; 1];
        let read = self.stream().read(&mut buf).await.unwrap_or(0);
        assert_eq!(read, 0, "expected end of stream");
    }

    pub(crate) async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}
