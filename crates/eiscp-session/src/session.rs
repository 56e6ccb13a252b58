use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use eiscp_frame::{
    decode_packet, encode_packet, new_packet, validate_packet, Message, PacketDump,
    END_OF_PACKET_RX, END_OF_PACKET_TX,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::state::StateCache;
use crate::subscriber::{Subscriber, SubscriberId};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The device closed the connection.
    EndOfStream,
    /// Reading from the device failed.
    ReadFailed(String),
    /// The session was shut down locally, or every handle to it was dropped.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => f.write_str("device closed the connection"),
            Self::ReadFailed(err) => write!(f, "read failed: {err}"),
            Self::Shutdown => f.write_str("shut down"),
        }
    }
}

/// Lifecycle of a device session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed(CloseReason),
}

pub(crate) enum Control {
    Attach {
        id: SubscriberId,
        inbound: mpsc::Sender<Message>,
    },
    Detach {
        id: SubscriberId,
    },
}

pub(crate) struct SendRequest {
    pub(crate) message: Message,
    pub(crate) respond_to: oneshot::Sender<Result<()>>,
}

enum Inbound {
    Message(Message),
    Closed(CloseReason),
}

/// Connect to a device with default configuration.
pub async fn connect(address: &str) -> Result<Session> {
    connect_with_config(address, SessionConfig::default()).await
}

/// Connect to a device with explicit configuration.
pub async fn connect_with_config(address: &str, config: SessionConfig) -> Result<Session> {
    let stream = eiscp_transport::connect_with_config(address, &config.transport).await?;
    Ok(Session::from_stream(stream, config))
}

/// The one live connection to a device, shared by any number of subscribers.
///
/// Cloning is cheap and every clone refers to the same connection. The
/// session shuts down on [`shutdown`](Self::shutdown), when the device goes
/// away, or once every clone and every subscriber has been dropped.
#[derive(Clone)]
pub struct Session {
    control: mpsc::UnboundedSender<Control>,
    requests: mpsc::Sender<SendRequest>,
    state: StateCache,
    status: watch::Receiver<SessionState>,
    shutdown: CancellationToken,
    next_id: Arc<AtomicU64>,
    subscriber_capacity: usize,
    peer: Option<SocketAddr>,
}

impl Session {
    /// Take ownership of an established connection and start serving it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream(stream: TcpStream, config: SessionConfig) -> Self {
        let peer = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();

        let (status_tx, status) = watch::channel(SessionState::Connecting);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (requests_tx, requests_rx) = mpsc::channel(config.request_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let state = StateCache::new();
        let shutdown = CancellationToken::new();

        tokio::spawn(receive_loop(
            reader,
            state.clone(),
            inbound_tx,
            shutdown.clone(),
        ));

        let dispatcher = Dispatcher {
            writer,
            tx_buf: new_packet(),
            subscribers: BTreeMap::new(),
            control: control_rx,
            requests: requests_rx,
            inbound: inbound_rx,
            status: status_tx,
            shutdown: shutdown.clone(),
        };
        dispatcher.status.send_replace(SessionState::Open);
        tokio::spawn(dispatcher.run());

        info!(peer = ?peer, "device session open");
        Self {
            control: control_tx,
            requests: requests_tx,
            state,
            status,
            shutdown,
            next_id: Arc::new(AtomicU64::new(1)),
            subscriber_capacity: config.subscriber_capacity.max(1),
            peer,
        }
    }

    /// Register a new subscriber. It sees every message received from now on.
    pub fn attach(&self) -> Result<Subscriber> {
        if matches!(
            *self.status.borrow(),
            SessionState::Closing | SessionState::Closed(_)
        ) {
            return Err(SessionError::SessionClosed);
        }

        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (inbound_tx, inbound_rx) = mpsc::channel(self.subscriber_capacity);
        self.control
            .send(Control::Attach {
                id,
                inbound: inbound_tx,
            })
            .map_err(|_| SessionError::SessionClosed)?;

        debug!(subscriber = %id, "subscriber attached");
        Ok(Subscriber::new(
            id,
            inbound_rx,
            self.control.clone(),
            self.requests.clone(),
            self.state.clone(),
        ))
    }

    /// Remove a subscriber. Equivalent to closing or dropping it.
    pub fn detach(&self, mut subscriber: Subscriber) {
        subscriber.close();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.status.borrow().clone()
    }

    /// True once the session has fully closed.
    pub fn is_closed(&self) -> bool {
        matches!(*self.status.borrow(), SessionState::Closed(_))
    }

    /// Wait for the session to close and report why.
    pub async fn closed(&self) -> CloseReason {
        let mut status = self.status.clone();
        loop {
            if let SessionState::Closed(reason) = &*status.borrow_and_update() {
                return reason.clone();
            }
            if status.changed().await.is_err() {
                return CloseReason::Shutdown;
            }
        }
    }

    /// Close the device connection and detach every subscriber.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Copy of the device state observed so far.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.state.snapshot()
    }

    /// The shared state cache.
    pub fn state_cache(&self) -> &StateCache {
        &self.state
    }

    /// Address of the device, if the socket reported one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("state", &*self.status.borrow())
            .finish()
    }
}

/// Owns the write half and the subscriber table. Everything that touches
/// either goes through here, one event at a time.
struct Dispatcher {
    writer: OwnedWriteHalf,
    tx_buf: eiscp_frame::Packet,
    subscribers: BTreeMap<SubscriberId, mpsc::Sender<Message>>,
    control: mpsc::UnboundedReceiver<Control>,
    requests: mpsc::Receiver<SendRequest>,
    inbound: mpsc::Receiver<Inbound>,
    status: watch::Sender<SessionState>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    async fn run(mut self) {
        let reason = loop {
            tokio::select! {
                biased;

                control = self.control.recv() => match control {
                    Some(Control::Attach { id, inbound }) => {
                        self.subscribers.insert(id, inbound);
                    }
                    Some(Control::Detach { id }) => {
                        if self.subscribers.remove(&id).is_some() {
                            debug!(subscriber = %id, "subscriber detached");
                        }
                    }
                    None => {
                        debug!("no handles left");
                        break CloseReason::Shutdown;
                    }
                },
                _ = self.shutdown.cancelled() => break CloseReason::Shutdown,
                inbound = self.inbound.recv() => match inbound {
                    Some(Inbound::Message(message)) => self.broadcast(message),
                    Some(Inbound::Closed(reason)) => break reason,
                    None => break CloseReason::EndOfStream,
                },
                request = self.requests.recv() => match request {
                    Some(SendRequest { message, respond_to }) => {
                        let result = self.write(&message).await;
                        // The sender may have stopped waiting.
                        let _ = respond_to.send(result);
                    }
                    None => break CloseReason::Shutdown,
                },
            }
        };

        self.close(reason).await;
    }

    async fn write(&mut self, message: &Message) -> Result<()> {
        encode_packet(message, END_OF_PACKET_TX, &mut self.tx_buf)?;
        validate_packet(&self.tx_buf, END_OF_PACKET_TX)?;

        let Self {
            writer,
            tx_buf,
            shutdown,
            ..
        } = self;
        tokio::select! {
            result = writer.write_all(&tx_buf[..]) => {
                if let Err(err) = result {
                    warn!(error = %err, %message, "write to device failed");
                    return Err(SessionError::Write(err));
                }
            }
            _ = shutdown.cancelled() => return Err(SessionError::SessionClosed),
        }

        debug!(%message, "sent");
        Ok(())
    }

    fn broadcast(&mut self, message: Message) {
        self.subscribers
            .retain(|id, inbound| match inbound.try_send(message.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = %id, "subscriber unable to keep up, dropping it");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = %id, "subscriber gone");
                    false
                }
            });
    }

    async fn close(mut self, reason: CloseReason) {
        self.status.send_replace(SessionState::Closing);
        self.shutdown.cancel();
        self.subscribers.clear();

        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            let _ = request.respond_to.send(Err(SessionError::SessionClosed));
        }

        // Late attaches land here; dropping their queues ends those subscribers.
        self.control.close();
        while self.control.try_recv().is_ok() {}

        if let Err(err) = self.writer.shutdown().await {
            debug!(error = %err, "writer shutdown failed");
        }

        info!(%reason, "device session closed");
        self.status.send_replace(SessionState::Closed(reason));
    }
}

async fn receive_loop(
    mut reader: OwnedReadHalf,
    state: StateCache,
    inbound: mpsc::Sender<Inbound>,
    shutdown: CancellationToken,
) {
    let mut rx_buf = new_packet();
    let mut dropped = 0u64;

    loop {
        let read = tokio::select! {
            result = reader.read_exact(&mut rx_buf) => result,
            _ = shutdown.cancelled() => return,
        };

        if let Err(err) = read {
            let reason = if err.kind() == ErrorKind::UnexpectedEof {
                CloseReason::EndOfStream
            } else {
                CloseReason::ReadFailed(err.to_string())
            };
            debug!(dropped, "receive loop finished");
            let _ = inbound.send(Inbound::Closed(reason)).await;
            return;
        }

        let decoded =
            validate_packet(&rx_buf, END_OF_PACKET_RX).and_then(|()| decode_packet(&rx_buf));
        let message = match decoded {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, dump = ?PacketDump(&rx_buf), "dropping bad packet");
                dropped += 1;
                continue;
            }
        };

        debug!(%message, "received");
        state.observe_message(&message);

        let forwarded = tokio::select! {
            result = inbound.send(Inbound::Message(message)) => result.is_ok(),
            _ = shutdown.cancelled() => false,
        };
        if !forwarded {
            return;
        }
    }
}
