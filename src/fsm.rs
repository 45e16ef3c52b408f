//! Connection lifecycle state machine.
//!
//! Transitions are pure: the connection task feeds observed events into
//! [`ConnMachine::on_event`] and executes the returned effects. Timers and
//! sockets stay outside, which keeps the backoff and give-up rules unit
//! testable without a transport.

use crate::models::ConnectionOptions;
use std::time::Duration;

/// Observable lifecycle state of the push-channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport, and none wanted (no valid session, or given up).
    Disconnected,
    /// Transport dial and auth handshake in flight.
    Connecting,
    /// Transport up and authenticated.
    Connected,
    /// Transport lost; waiting out a backoff delay before redialing.
    Reconnecting,
}

/// Events observed by the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnEvent {
    /// Session became valid (login, or identity change while running).
    SessionValid,
    /// Session became null (logout) or lost its identity.
    SessionCleared,
    /// Transport connected and the auth handshake was accepted.
    Established,
    /// The auth handshake was rejected by the server.
    HandshakeRejected,
    /// Transport-level failure: connect error, read error, abnormal close.
    TransportFailed,
    /// Server-initiated orderly close ("go away") — not retried.
    ServerClosed,
    /// A scheduled backoff delay elapsed.
    BackoffElapsed,
}

/// Side effects the connection task must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    /// Open the transport and run the auth handshake.
    Dial,
    /// Close the transport, bump the connection generation, cancel timers.
    Teardown,
    /// Arm a reconnect timer.
    ScheduleBackoff { delay: Duration },
    /// Re-issue join instructions for every tracked scope.
    RejoinScopes,
    /// Attempt one token refresh; clear the session if it fails.
    RefreshOrClearSession,
    /// Retry ceiling reached; stay down until the session changes.
    GiveUp,
}

/// Exponential backoff policy: `base * 2^attempt`, attempt starting at 0.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_options(options: &ConnectionOptions) -> Self {
        Self {
            base_delay: Duration::from_millis(options.reconnect_base_delay_ms),
            max_attempts: if options.auto_reconnect { options.max_reconnect_attempts } else { 0 },
        }
    }

    /// Delay before reconnect attempt number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// The connection state machine: current state plus the reconnect attempt
/// counter (reset on success and on any session change).
#[derive(Debug, Clone)]
pub(crate) struct ConnMachine {
    state: ConnectionState,
    attempt: u32,
    policy: ReconnectPolicy,
}

impl ConnMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { state: ConnectionState::Disconnected, attempt: 0, policy }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Apply one event, returning the effects to execute.
    pub fn on_event(&mut self, event: ConnEvent) -> Vec<Effect> {
        use ConnEvent::*;
        use ConnectionState::*;

        match (self.state, event) {
            // Session transitions override everything.
            (_, SessionCleared) => {
                let was_down = self.state == Disconnected;
                self.state = Disconnected;
                self.attempt = 0;
                if was_down {
                    vec![]
                } else {
                    vec![Effect::Teardown]
                }
            }
            (Disconnected, SessionValid) => {
                self.state = Connecting;
                self.attempt = 0;
                vec![Effect::Dial]
            }
            // Identity changed while running: tear down the old transport
            // and dial fresh with the new credentials.
            (_, SessionValid) => {
                self.state = Connecting;
                self.attempt = 0;
                vec![Effect::Teardown, Effect::Dial]
            }

            (Connecting, Established) => {
                self.state = Connected;
                self.attempt = 0;
                vec![Effect::RejoinScopes]
            }

            (Connecting, HandshakeRejected) => {
                self.state = Disconnected;
                self.attempt = 0;
                vec![Effect::Teardown, Effect::RefreshOrClearSession]
            }

            (Connecting | Connected, TransportFailed) => {
                if self.attempt >= self.policy.max_attempts {
                    self.state = Disconnected;
                    vec![Effect::Teardown, Effect::GiveUp]
                } else {
                    let delay = self.policy.delay(self.attempt);
                    self.attempt += 1;
                    self.state = Reconnecting;
                    vec![Effect::Teardown, Effect::ScheduleBackoff { delay }]
                }
            }

            // Server told us to go away: no automatic retry.
            (Connecting | Connected, ServerClosed) => {
                self.state = Disconnected;
                self.attempt = 0;
                vec![Effect::Teardown]
            }

            (Reconnecting, BackoffElapsed) => {
                self.state = Connecting;
                vec![Effect::Dial]
            }

            // Everything else is a no-op (late timer fires, duplicate
            // transport errors after teardown, ...).
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ConnMachine {
        ConnMachine::new(ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
        })
    }

    #[test]
    fn test_happy_path() {
        let mut m = machine();
        assert_eq!(m.state(), ConnectionState::Disconnected);

        assert_eq!(m.on_event(ConnEvent::SessionValid), vec![Effect::Dial]);
        assert_eq!(m.state(), ConnectionState::Connecting);

        assert_eq!(m.on_event(ConnEvent::Established), vec![Effect::RejoinScopes]);
        assert_eq!(m.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let mut m = machine();
        m.on_event(ConnEvent::SessionValid);
        m.on_event(ConnEvent::Established);

        let mut delays = Vec::new();
        for _ in 0..5 {
            let effects = m.on_event(ConnEvent::TransportFailed);
            assert_eq!(m.state(), ConnectionState::Reconnecting);
            match &effects[..] {
                [Effect::Teardown, Effect::ScheduleBackoff { delay }] => delays.push(*delay),
                other => panic!("unexpected effects: {:?}", other),
            }
            m.on_event(ConnEvent::BackoffElapsed);
            assert_eq!(m.state(), ConnectionState::Connecting);
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ]
        );
    }

    #[test]
    fn test_retry_ceiling_gives_up() {
        let mut m = machine();
        m.on_event(ConnEvent::SessionValid);
        for _ in 0..5 {
            m.on_event(ConnEvent::TransportFailed);
            m.on_event(ConnEvent::BackoffElapsed);
        }
        // Sixth consecutive failure exceeds the ceiling.
        let effects = m.on_event(ConnEvent::TransportFailed);
        assert_eq!(effects, vec![Effect::Teardown, Effect::GiveUp]);
        assert_eq!(m.state(), ConnectionState::Disconnected);

        // No further automatic attempts...
        assert!(m.on_event(ConnEvent::BackoffElapsed).is_empty());
        assert!(m.on_event(ConnEvent::TransportFailed).is_empty());

        // ...until the session changes again.
        assert_eq!(m.on_event(ConnEvent::SessionValid), vec![Effect::Dial]);
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.attempt(), 0, "ceiling counter resets with the session");
    }

    #[test]
    fn test_success_resets_attempt_counter() {
        let mut m = machine();
        m.on_event(ConnEvent::SessionValid);
        m.on_event(ConnEvent::TransportFailed);
        m.on_event(ConnEvent::BackoffElapsed);
        m.on_event(ConnEvent::Established);
        assert_eq!(m.attempt(), 0);

        // A fresh failure starts the backoff ladder from the bottom.
        match m.on_event(ConnEvent::TransportFailed).as_slice() {
            [Effect::Teardown, Effect::ScheduleBackoff { delay }] => {
                assert_eq!(*delay, Duration::from_secs(1));
            }
            other => panic!("unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn test_server_close_is_not_retried() {
        let mut m = machine();
        m.on_event(ConnEvent::SessionValid);
        m.on_event(ConnEvent::Established);
        assert_eq!(m.on_event(ConnEvent::ServerClosed), vec![Effect::Teardown]);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(m.on_event(ConnEvent::BackoffElapsed).is_empty());
    }

    #[test]
    fn test_logout_cancels_pending_reconnect() {
        let mut m = machine();
        m.on_event(ConnEvent::SessionValid);
        m.on_event(ConnEvent::Established);
        m.on_event(ConnEvent::TransportFailed);
        assert_eq!(m.state(), ConnectionState::Reconnecting);

        assert_eq!(m.on_event(ConnEvent::SessionCleared), vec![Effect::Teardown]);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        // The armed backoff timer firing later must be a no-op.
        assert!(m.on_event(ConnEvent::BackoffElapsed).is_empty());
    }

    #[test]
    fn test_handshake_rejection_defers_to_session_refresh() {
        let mut m = machine();
        m.on_event(ConnEvent::SessionValid);
        assert_eq!(
            m.on_event(ConnEvent::HandshakeRejected),
            vec![Effect::Teardown, Effect::RefreshOrClearSession]
        );
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_identity_change_while_connected_redials() {
        let mut m = machine();
        m.on_event(ConnEvent::SessionValid);
        m.on_event(ConnEvent::Established);
        assert_eq!(
            m.on_event(ConnEvent::SessionValid),
            vec![Effect::Teardown, Effect::Dial]
        );
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_auto_reconnect_disabled_fails_fast() {
        let mut m = ConnMachine::new(ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_attempts: 0,
        });
        m.on_event(ConnEvent::SessionValid);
        assert_eq!(
            m.on_event(ConnEvent::TransportFailed),
            vec![Effect::Teardown, Effect::GiveUp]
        );
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }
}
