use eiscp_transport::TransportConfig;

/// Default per-subscriber inbound queue depth.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 16;

/// Default depth of the outbound request queue.
pub const DEFAULT_REQUEST_CAPACITY: usize = 64;

/// Default depth of the queue between the receive and dispatch tasks.
pub const DEFAULT_INBOUND_CAPACITY: usize = 64;

/// Session behavior configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Messages a subscriber may have queued before it is dropped as too slow.
    pub subscriber_capacity: usize,
    /// Send requests that may wait for the dispatch task before `send` blocks.
    pub request_capacity: usize,
    /// Decoded messages buffered between the receive and dispatch tasks.
    pub inbound_capacity: usize,
    /// Connection settings.
    pub transport: TransportConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            request_capacity: DEFAULT_REQUEST_CAPACITY,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            transport: TransportConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Override the per-subscriber queue depth (minimum 1).
    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    /// Override the outbound request queue depth (minimum 1).
    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity.max(1);
        self
    }

    /// Override the receive-to-dispatch queue depth (minimum 1).
    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity.max(1);
        self
    }

    /// Override transport settings.
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}
