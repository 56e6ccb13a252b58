use std::io;
use std::time::Duration;

use eiscp_frame::{FrameError, Message, PacketCodec};
use eiscp_session::StateCache;
use eiscp_transport::DeviceListener;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use crate::cmd::{parse_duration, EmulateArgs};
use crate::exit::{io_error, transport_error, CliResult, SUCCESS};

/// Parameter a device reports for a command it knows nothing about.
const NOT_AVAILABLE: &str = "N/A";

pub async fn run(args: EmulateArgs) -> CliResult<i32> {
    let delay = parse_duration(&args.delay)?;
    let listener = DeviceListener::bind(&args.address)
        .await
        .map_err(|err| transport_error("bind failed", err))?;
    info!(address = %listener.local_addr(), "emulating device");

    let state = StateCache::new();
    let (announce, _) = broadcast::channel(8);
    let mut hangup = Hangup::new().map_err(|err| io_error("signal setup failed", err))?;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) =
                    accepted.map_err(|err| transport_error("accept failed", err))?;
                let state = state.clone();
                let announcements = announce.subscribe();
                tokio::spawn(async move {
                    if let Err(error) = serve(stream, &state, delay, announcements).await {
                        warn!(%peer, %error, "controller connection failed");
                    }
                    info!(%peer, "controller disconnected");
                });
            }
            () = hangup.recv() => match power_report(&state) {
                Ok(message) => {
                    info!(%message, controllers = announce.receiver_count(), "announcing");
                    // No controllers connected is fine.
                    let _ = announce.send(message);
                }
                Err(error) => warn!(%error, "power report failed"),
            },
            _ = &mut interrupt => {
                info!("interrupted");
                return Ok(SUCCESS);
            }
        }
    }
}

async fn serve(
    stream: TcpStream,
    state: &StateCache,
    delay: Duration,
    mut announcements: broadcast::Receiver<Message>,
) -> Result<(), FrameError> {
    let mut framed = Framed::new(stream, PacketCodec::device());
    loop {
        tokio::select! {
            request = framed.next() => {
                let Some(request) = request else {
                    return Ok(());
                };
                let reply = respond(state, request?)?;
                tokio::time::sleep(delay).await;
                info!(message = %reply, "replying");
                framed.send(reply).await?;
            }
            announcement = announcements.recv() => match announcement {
                Ok(message) => framed.send(message).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "controller missed announcements");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}

/// Queries are answered from remembered state; anything else is stored and echoed.
fn respond(state: &StateCache, request: Message) -> Result<Message, FrameError> {
    if request.is_query() {
        let value = state
            .get(request.command())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        return Message::new(request.command(), value);
    }
    state.observe_message(&request);
    Ok(request)
}

/// Unsolicited power status, as a device sends when switched from its front panel.
fn power_report(state: &StateCache) -> Result<Message, FrameError> {
    Message::new("PWR", state.get("PWR").unwrap_or_else(|| "01".to_string()))
}

/// SIGHUP makes the emulator announce its power state to every controller.
#[cfg(unix)]
struct Hangup(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Hangup {
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self(signal(SignalKind::hangup())?))
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    fn new() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use eiscp_frame::{decode_packet, encode_packet, new_packet, END_OF_PACKET_RX, END_OF_PACKET_TX};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[test]
    fn echoes_and_remembers_settings() {
        let state = StateCache::new();
        let reply = respond(&state, Message::parse("MVL2A").unwrap()).unwrap();
        assert_eq!(reply.to_string(), "MVL2A");

        let reply = respond(&state, Message::query("MVL").unwrap()).unwrap();
        assert_eq!(reply.to_string(), "MVL2A");
    }

    #[test]
    fn unknown_query_is_not_available() {
        let state = StateCache::new();
        let reply = respond(&state, Message::query("SLI").unwrap()).unwrap();
        assert_eq!(reply.to_string(), "SLIN/A");
    }

    #[test]
    fn power_report_follows_state() {
        let state = StateCache::new();
        assert_eq!(power_report(&state).unwrap().to_string(), "PWR01");
        state.observe("PWR", "00");
        assert_eq!(power_report(&state).unwrap().to_string(), "PWR00");
    }

    async fn read_reply(client: &mut TcpStream) -> Message {
        let mut reply = new_packet();
        client.read_exact(&mut reply).await.unwrap();
        let message = decode_packet(&reply).unwrap();
        assert_eq!(reply[18 + message.wire_len()], END_OF_PACKET_RX);
        message
    }

    #[tokio::test]
    async fn serves_device_packets() {
        let listener = DeviceListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().to_string();
        let (announce, announcements) = broadcast::channel(8);

        let server = tokio::spawn(async move {
            let (stream, _peer) = listener.accept().await.unwrap();
            let state = StateCache::new();
            serve(stream, &state, Duration::from_millis(1), announcements).await
        });

        let mut client = TcpStream::connect(&address).await.unwrap();
        let mut packet = new_packet();
        encode_packet(&Message::parse("PWR01").unwrap(), END_OF_PACKET_TX, &mut packet).unwrap();
        client.write_all(&packet).await.unwrap();
        assert_eq!(read_reply(&mut client).await.to_string(), "PWR01");

        announce.send(Message::parse("PWR00").unwrap()).unwrap();
        assert_eq!(read_reply(&mut client).await.to_string(), "PWR00");

        drop(client);
        server.await.unwrap().unwrap();
    }
}
