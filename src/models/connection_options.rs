use serde::{Deserialize, Serialize};

/// Connection-level options for the push channel.
///
/// Controls automatic reconnection behavior. Separate from
/// [`RestoLinkTimeouts`](crate::timeouts::RestoLinkTimeouts), which covers
/// per-operation deadlines.
///
/// # Example
///
/// ```rust
/// use resto_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_reconnect_base_delay_ms(500)
///     .with_max_reconnect_attempts(3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Enable automatic reconnection on connection loss.
    /// Default: true.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Base delay in milliseconds between reconnection attempts.
    /// The actual delay is `base * 2^attempt` (attempt starts at 0).
    /// Default: 1000ms.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Number of consecutive failed reconnection attempts before giving up.
    /// After the ceiling is reached the connection stays down until the
    /// session changes. Default: 5.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_base_delay_ms: 1000,
            max_reconnect_attempts: 5,
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to automatically reconnect on connection loss.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the base delay between reconnection attempts (in milliseconds).
    pub fn with_reconnect_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_base_delay_ms = delay_ms;
        self
    }

    /// Set the retry ceiling for reconnection attempts.
    pub fn with_max_reconnect_attempts(mut self, max_attempts: u32) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }
}
