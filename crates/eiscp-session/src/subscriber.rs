use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use eiscp_frame::Message;
use futures_core::Stream;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::session::{Control, SendRequest};
use crate::state::StateCache;

/// Opaque subscriber identity, unique within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One consumer's view of the shared device session.
///
/// Sends are serialized with every other subscriber's; every message from the
/// device arrives on this subscriber's own bounded queue. Dropping the
/// subscriber detaches it.
pub struct Subscriber {
    id: SubscriberId,
    inbound: mpsc::Receiver<Message>,
    control: mpsc::UnboundedSender<Control>,
    requests: mpsc::Sender<SendRequest>,
    state: StateCache,
    closed: bool,
}

impl Subscriber {
    pub(crate) fn new(
        id: SubscriberId,
        inbound: mpsc::Receiver<Message>,
        control: mpsc::UnboundedSender<Control>,
        requests: mpsc::Sender<SendRequest>,
        state: StateCache,
    ) -> Self {
        Self {
            id,
            inbound,
            control,
            requests,
            state,
            closed: false,
        }
    }

    /// This subscriber's identity.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Send a message to the device and wait until it has been written.
    ///
    /// There is no timeout; wrap the call if the caller needs one.
    pub async fn send(&self, message: Message) -> Result<()> {
        if self.closed {
            return Err(SessionError::HandleClosed);
        }

        let (respond_to, response) = oneshot::channel();
        self.requests
            .send(SendRequest {
                message,
                respond_to,
            })
            .await
            .map_err(|_| SessionError::SessionClosed)?;

        response.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// Ask the device to report the current value of `command` (`QSTN`).
    pub async fn query(&self, command: &str) -> Result<()> {
        self.send(Message::query(command)?).await
    }

    /// Wait for the next message from the device.
    ///
    /// Returns [`SessionError::HandleClosed`] once this subscriber has been
    /// closed, dropped for falling behind, or the session has ended.
    pub async fn receive(&mut self) -> Result<Message> {
        if self.closed {
            return Err(SessionError::HandleClosed);
        }
        self.inbound.recv().await.ok_or(SessionError::HandleClosed)
    }

    /// Take a queued message without waiting.
    pub fn try_receive(&mut self) -> Result<Option<Message>> {
        if self.closed {
            return Err(SessionError::HandleClosed);
        }
        match self.inbound.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(SessionError::HandleClosed),
        }
    }

    /// Copy of the device state observed so far.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.state.snapshot()
    }

    /// Detach from the session. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.inbound.close();
        // The session may already be gone; nothing left to detach from then.
        let _ = self.control.send(Control::Detach { id: self.id });
        debug!(subscriber = %self.id, "subscriber closed");
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Consume the subscriber as a stream of device messages.
    pub fn into_stream(self) -> MessageStream {
        MessageStream { subscriber: self }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Stream of device messages for one subscriber. Ends when the subscriber is
/// closed, dropped for falling behind, or the session ends.
#[derive(Debug)]
pub struct MessageStream {
    subscriber: Subscriber,
}

impl MessageStream {
    /// The underlying subscriber, for sending while streaming.
    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        if self.subscriber.closed {
            return Poll::Ready(None);
        }
        self.subscriber.inbound.poll_recv(cx)
    }
}
