//! Timeout configuration for client operations.
//!
//! Centralizes the timeouts used by the REST boundary and the push channel:
//! connection establishment, the auth handshake, request/response waits.

use std::time::Duration;

/// Timeout configuration for resto-link client operations.
///
/// # Examples
///
/// ```rust
/// use resto_link::RestoLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = RestoLinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = RestoLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(60))
///     .receive_timeout(Duration::from_secs(120))
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = RestoLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct RestoLinkTimeouts {
    /// Timeout for establishing connections (TCP + TLS handshake).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Timeout for receiving an HTTP response after a request is sent.
    /// Default: 30 seconds
    pub receive_timeout: Duration,

    /// Timeout for sending data to the server.
    /// Default: 10 seconds
    pub send_timeout: Duration,

    /// Timeout for the push-channel authentication handshake (auth message
    /// exchange after the WebSocket opens).
    /// Default: 5 seconds
    pub auth_timeout: Duration,

    /// Keep-alive ping interval for the push channel.
    /// Set to 0 to disable keep-alive pings.
    /// Default: 10 seconds
    pub keepalive_interval: Duration,
}

impl Default for RestoLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            receive_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(10),
        }
    }
}

impl RestoLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> RestoLinkTimeoutsBuilder {
        RestoLinkTimeoutsBuilder::new()
    }

    /// Timeouts optimized for fast local development.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            receive_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(2),
            auth_timeout: Duration::from_secs(2),
            keepalive_interval: Duration::from_secs(15),
        }
    }

    /// Timeouts optimized for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            receive_timeout: Duration::from_secs(120),
            send_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(30),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for creating custom [`RestoLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct RestoLinkTimeoutsBuilder {
    timeouts: RestoLinkTimeouts,
}

impl RestoLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: RestoLinkTimeouts::default(),
        }
    }

    /// Set the connection timeout (TCP + TLS handshake).
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the connection timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the receive timeout (waiting for data after a request).
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.receive_timeout = timeout;
        self
    }

    /// Set the receive timeout in seconds.
    pub fn receive_timeout_secs(self, secs: u64) -> Self {
        self.receive_timeout(Duration::from_secs(secs))
    }

    /// Set the send timeout (writing data to the socket).
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send_timeout = timeout;
        self
    }

    /// Set the send timeout in seconds.
    pub fn send_timeout_secs(self, secs: u64) -> Self {
        self.send_timeout(Duration::from_secs(secs))
    }

    /// Set the authentication handshake timeout.
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.auth_timeout = timeout;
        self
    }

    /// Set the authentication handshake timeout in seconds.
    pub fn auth_timeout_secs(self, secs: u64) -> Self {
        self.auth_timeout(Duration::from_secs(secs))
    }

    /// Set the keepalive ping interval.
    /// Set to 0 to disable keepalive pings.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    /// Set the keepalive ping interval in seconds.
    /// Set to 0 to disable keepalive pings.
    pub fn keepalive_interval_secs(self, secs: u64) -> Self {
        self.keepalive_interval(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> RestoLinkTimeouts {
        self.timeouts
    }
}
