//! Background WebSocket connection task for the push channel.
//!
//! One shared connection per client. The task owns the socket and reacts to
//! three inputs: session transitions from the [`SessionStore`] watch
//! channel, join/leave instructions from the [`ScopeTracker`], and frames
//! from the server. Lifecycle decisions (when to dial, back off, give up)
//! are delegated to the pure state machine in [`crate::fsm`]; this module
//! only executes its effects.
//!
//! Every teardown bumps the shared connection [`Generation`], so frames
//! still in flight from a dead socket are discarded by the reconciler
//! instead of overwriting state that a newer connection already refreshed.

use crate::{
    error::{RestoLinkError, Result},
    event_handlers::{ConnectionError, DisconnectReason, EventHandlers},
    fsm::{ConnEvent, ConnMachine, ConnectionState, Effect, ReconnectPolicy},
    models::{ClientMessage, ConnectionOptions, PushEvent, Scope, ServerMessage},
    reconcile::{Generation, Reconciler},
    scopes::{ScopeCmd, ScopeTracker},
    session::{Session, SessionBackend, SessionStore},
    timeouts::RestoLinkTimeouts,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

type WebSocketStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Maximum text frame size accepted from the server (16 MiB).
const MAX_WS_TEXT_MESSAGE_BYTES: usize = 16 << 20;

/// Sleep deadline far enough away to be effectively "never".
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Translate an http(s) base URL into the ws(s) push endpoint.
fn resolve_ws_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        return Err(RestoLinkError::ConfigurationError(format!(
            "Base URL must be http(s) or ws(s): {}",
            base_url
        )));
    };
    Ok(format!("{}/ws", ws_base))
}

// ── ConnectionManager (public handle) ───────────────────────────────────────

/// Handle to the background connection task.
///
/// The task runs for the lifetime of the client; dropping the handle
/// requests a best-effort shutdown.
pub struct ConnectionManager {
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: mpsc::Sender<()>,
    _task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawn the connection task.
    ///
    /// The task starts disconnected and dials as soon as the session store
    /// holds a valid session; it never needs an explicit `connect` call.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        base_url: String,
        store: SessionStore,
        backend: Arc<dyn SessionBackend>,
        tracker: ScopeTracker,
        scope_rx: mpsc::UnboundedReceiver<ScopeCmd>,
        reconciler: Reconciler,
        generation: Generation,
        timeouts: RestoLinkTimeouts,
        options: ConnectionOptions,
        handlers: EventHandlers,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(connection_task(ConnTaskDeps {
            base_url,
            store,
            backend,
            tracker,
            scope_rx,
            reconciler,
            generation,
            timeouts,
            options,
            handlers,
            state_tx,
            shutdown_rx,
        }));
        Self { state_rx, shutdown_tx, _task: task }
    }

    /// Current lifecycle state of the push channel.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Whether the channel is up and authenticated.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to lifecycle state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Request an orderly shutdown of the background task.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
    }
}

// ── Background connection task ──────────────────────────────────────────────

struct ConnTaskDeps {
    base_url: String,
    store: SessionStore,
    backend: Arc<dyn SessionBackend>,
    tracker: ScopeTracker,
    scope_rx: mpsc::UnboundedReceiver<ScopeCmd>,
    reconciler: Reconciler,
    generation: Generation,
    timeouts: RestoLinkTimeouts,
    options: ConnectionOptions,
    handlers: EventHandlers,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Send one client message over the socket, mirroring it to the debug hook.
async fn send_message(
    ws: &mut WebSocketStream,
    msg: &ClientMessage,
    handlers: &EventHandlers,
) -> Result<()> {
    let payload = serde_json::to_string(msg)?;
    handlers.emit_send(&payload);
    ws.send(Message::Text(payload.into()))
        .await
        .map_err(|e| RestoLinkError::WebSocketError(format!("Failed to send: {}", e)))
}

/// Open the transport and run the auth handshake.
///
/// Returns the authenticated stream. Handshake rejections come back as
/// [`RestoLinkError::AuthenticationError`] so the caller can distinguish
/// them from transport failures.
async fn establish(
    base_url: &str,
    session: &Session,
    timeouts: &RestoLinkTimeouts,
    handlers: &EventHandlers,
) -> Result<WebSocketStream> {
    let url = resolve_ws_url(base_url)?;
    log::debug!("[CONN] dialing {}", url);

    let connect = connect_async(url.as_str());
    let connect_result = if RestoLinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
        Ok(connect.await)
    } else {
        tokio::time::timeout(timeouts.connection_timeout, connect).await
    };

    let mut ws = match connect_result {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            let msg = format!("Connection failed: {}", e);
            handlers.emit_error(ConnectionError::new(&msg, true));
            return Err(RestoLinkError::WebSocketError(msg));
        }
        Err(_) => {
            let msg = format!("Connection timeout ({:?})", timeouts.connection_timeout);
            handlers.emit_error(ConnectionError::new(&msg, true));
            return Err(RestoLinkError::TimeoutError(msg));
        }
    };

    let auth = ClientMessage::Authenticate {
        token: session.token.clone(),
        user_id: session.user_id.clone(),
        tenant_id: session.tenant_id.clone(),
    };
    send_message(&mut ws, &auth, handlers).await?;

    // Wait for auth:success / auth:error, ignoring any other frames the
    // server interleaves before the reply.
    let deadline = TokioInstant::now() + timeouts.auth_timeout;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next()).await.map_err(|_| {
            RestoLinkError::TimeoutError(format!(
                "Auth handshake timeout ({:?})",
                timeouts.auth_timeout
            ))
        })?;
        match frame {
            Some(Ok(Message::Text(text))) => {
                handlers.emit_receive(&text);
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::AuthSuccess { user_id }) => {
                        log::info!("[CONN] authenticated as {}", user_id);
                        return Ok(ws);
                    }
                    Ok(ServerMessage::AuthError { message }) => {
                        return Err(RestoLinkError::AuthenticationError(message));
                    }
                    _ => continue,
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(RestoLinkError::WebSocketError(
                    "Connection closed during auth handshake".to_string(),
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                return Err(RestoLinkError::WebSocketError(format!(
                    "Transport error during auth handshake: {}",
                    e
                )));
            }
        }
    }
}

/// The main background task managing the shared push-channel connection.
///
/// Lifecycle:
/// 1. Wait for a valid session, then dial and authenticate
/// 2. Join the tracked scopes; route incoming events to the reconciler
/// 3. On transport loss: reconnect with exponential backoff, re-join scopes
/// 4. On logout or server-ordered close: stay down until the session changes
async fn connection_task(mut deps: ConnTaskDeps) {
    let policy = ReconnectPolicy::from_options(&deps.options);
    let mut machine = ConnMachine::new(policy);
    let mut session_rx = deps.store.watch();
    let mut last_identity = deps.store.identity();
    // Identity for which a handshake-triggered token refresh was already
    // attempted; a second rejection for the same identity clears the session
    // instead of looping refresh -> dial -> reject.
    let mut refreshed_identity: Option<u64> = None;

    let mut ws: Option<WebSocketStream> = None;
    let mut joined: HashSet<Scope> = HashSet::new();
    let mut backoff_deadline: Option<TokioInstant> = None;
    let mut pending: VecDeque<ConnEvent> = VecDeque::new();

    let has_keepalive = !deps.timeouts.keepalive_interval.is_zero();
    let keepalive_dur =
        if has_keepalive { deps.timeouts.keepalive_interval } else { FAR_FUTURE };
    let mut idle_deadline = TokioInstant::now() + keepalive_dur;

    if deps.store.snapshot().is_valid() {
        pending.push_back(ConnEvent::SessionValid);
    }

    'main: loop {
        // Drain the event queue through the state machine, executing effects.
        while let Some(event) = pending.pop_front() {
            for effect in machine.on_event(event) {
                match effect {
                    Effect::Teardown => {
                        deps.generation.bump();
                        joined.clear();
                        backoff_deadline = None;
                        if let Some(mut stream) = ws.take() {
                            let _ = stream.close(None).await;
                        }
                    }
                    Effect::Dial => {
                        let session = match deps.store.session() {
                            Some(s) => s,
                            None => {
                                // Session vanished between the event and the
                                // dial; treat as cleared.
                                pending.push_back(ConnEvent::SessionCleared);
                                continue;
                            }
                        };
                        match establish(&deps.base_url, &session, &deps.timeouts, &deps.handlers)
                            .await
                        {
                            Ok(stream) => {
                                ws = Some(stream);
                                idle_deadline = TokioInstant::now() + keepalive_dur;
                                pending.push_back(ConnEvent::Established);
                            }
                            Err(RestoLinkError::AuthenticationError(msg)) => {
                                log::warn!("[CONN] handshake rejected: {}", msg);
                                pending.push_back(ConnEvent::HandshakeRejected);
                            }
                            Err(e) => {
                                log::warn!("[CONN] dial failed: {}", e);
                                pending.push_back(ConnEvent::TransportFailed);
                            }
                        }
                    }
                    Effect::RejoinScopes => {
                        deps.handlers.emit_connect();
                        refreshed_identity = None;
                        if let Some(stream) = ws.as_mut() {
                            for scope in deps.tracker.snapshot() {
                                if joined.insert(scope.clone()) {
                                    let msg = ClientMessage::Join { room: scope };
                                    if let Err(e) =
                                        send_message(stream, &msg, &deps.handlers).await
                                    {
                                        log::warn!("[CONN] re-join failed: {}", e);
                                        pending.push_back(ConnEvent::TransportFailed);
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Effect::ScheduleBackoff { delay } => {
                        log::info!(
                            "[CONN] reconnecting in {:?} (attempt {})",
                            delay,
                            machine.attempt()
                        );
                        backoff_deadline = Some(TokioInstant::now() + delay);
                    }
                    Effect::RefreshOrClearSession => {
                        let identity = deps.store.identity();
                        let refresh_token = deps
                            .store
                            .session()
                            .and_then(|s| s.refresh_token);
                        let already_tried = refreshed_identity == Some(identity);
                        match refresh_token {
                            Some(rt) if !already_tried => {
                                refreshed_identity = Some(identity);
                                match deps.backend.refresh(&rt).await {
                                    Ok(resp) => {
                                        log::info!("[CONN] token refreshed after handshake rejection");
                                        if deps
                                            .store
                                            .refresh_tokens(
                                                resp.token,
                                                Some(resp.refresh_token),
                                                None,
                                            )
                                            .is_ok()
                                        {
                                            pending.push_back(ConnEvent::SessionValid);
                                        }
                                    }
                                    Err(e) => {
                                        log::warn!("[CONN] token refresh failed: {}", e);
                                        deps.store.clear();
                                    }
                                }
                            }
                            _ => {
                                log::warn!("[CONN] handshake rejected with no usable refresh path; logging out");
                                deps.store.clear();
                            }
                        }
                    }
                    Effect::GiveUp => {
                        deps.handlers.emit_error(ConnectionError::new(
                            format!(
                                "Gave up after {} reconnection attempts",
                                deps.options.max_reconnect_attempts
                            ),
                            false,
                        ));
                    }
                }
            }
        }
        let _ = deps.state_tx.send_replace(machine.state());

        // Multiplex inputs. Each arm translates an observation into state
        // machine events; the top of the loop drains them.
        let ws_active = ws.is_some();
        let backoff_sleep =
            tokio::time::sleep_until(backoff_deadline.unwrap_or_else(|| TokioInstant::now() + FAR_FUTURE));
        tokio::pin!(backoff_sleep);
        let idle_sleep = tokio::time::sleep_until(idle_deadline);
        tokio::pin!(idle_sleep);

        tokio::select! {
            biased;

            _ = deps.shutdown_rx.recv() => {
                break 'main;
            }

            changed = session_rx.changed() => {
                if changed.is_err() {
                    break 'main;
                }
                let snap = session_rx.borrow_and_update().clone();
                if snap.identity != last_identity {
                    last_identity = snap.identity;
                    if snap.is_valid() {
                        pending.push_back(ConnEvent::SessionValid);
                    } else {
                        pending.push_back(ConnEvent::SessionCleared);
                    }
                }
                // Token-only refresh: same identity, connection stays up.
            }

            cmd = deps.scope_rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        if let Some(stream) = ws.as_mut() {
                            let result = match cmd {
                                ScopeCmd::Join(scope) => {
                                    if joined.insert(scope.clone()) {
                                        send_message(stream, &ClientMessage::Join { room: scope }, &deps.handlers).await
                                    } else {
                                        Ok(())
                                    }
                                }
                                ScopeCmd::Leave(scope) => {
                                    if joined.remove(&scope) {
                                        send_message(stream, &ClientMessage::Leave { room: scope }, &deps.handlers).await
                                    } else {
                                        Ok(())
                                    }
                                }
                            };
                            if let Err(e) = result {
                                log::warn!("[CONN] scope command failed: {}", e);
                                deps.handlers.emit_disconnect(DisconnectReason::new(e.to_string()));
                                pending.push_back(ConnEvent::TransportFailed);
                            }
                        }
                        // Not connected: the tracker keeps the desired set and
                        // RejoinScopes replays it after the next dial.
                    }
                    None => break 'main,
                }
            }

            _ = &mut backoff_sleep, if backoff_deadline.is_some() => {
                backoff_deadline = None;
                pending.push_back(ConnEvent::BackoffElapsed);
            }

            _ = &mut idle_sleep, if has_keepalive && ws_active => {
                if let Some(stream) = ws.as_mut() {
                    if let Err(e) = stream.send(Message::Ping(Bytes::new())).await {
                        log::warn!("[CONN] keepalive ping failed: {}", e);
                        deps.handlers.emit_disconnect(DisconnectReason::new(format!("Keepalive ping failed: {}", e)));
                        pending.push_back(ConnEvent::TransportFailed);
                    }
                }
                idle_deadline = TokioInstant::now() + keepalive_dur;
            }

            frame = async { ws.as_mut().expect("guarded by ws_active").next().await }, if ws_active => {
                idle_deadline = TokioInstant::now() + keepalive_dur;
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_WS_TEXT_MESSAGE_BYTES {
                            log::warn!("[CONN] text frame too large ({} bytes), dropping", text.len());
                            continue;
                        }
                        deps.handlers.emit_receive(&text);
                        match PushEvent::parse(&text) {
                            Ok(Some(event)) => {
                                deps.reconciler.apply_tagged(event, deps.generation.current());
                            }
                            Ok(None) => {} // late auth echo
                            Err(e) => {
                                log::warn!("[CONN] unparseable frame: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Some(stream) = ws.as_mut() {
                            let _ = stream.send(Message::Pong(payload)).await;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(close))) => {
                        let (reason, orderly) = match close {
                            Some(f) => {
                                let orderly = matches!(f.code, CloseCode::Normal | CloseCode::Away);
                                (DisconnectReason::with_code(f.reason.to_string(), f.code.into()), orderly)
                            }
                            None => (DisconnectReason::new("Server closed connection"), false),
                        };
                        log::info!("[CONN] server close: {}", reason);
                        deps.handlers.emit_disconnect(reason);
                        pending.push_back(if orderly {
                            ConnEvent::ServerClosed
                        } else {
                            ConnEvent::TransportFailed
                        });
                    }
                    Some(Ok(_)) => {} // binary/raw frames unused by the protocol
                    Some(Err(e)) => {
                        let msg = e.to_string();
                        deps.handlers.emit_error(ConnectionError::new(&msg, true));
                        deps.handlers.emit_disconnect(DisconnectReason::new(format!("WebSocket error: {}", msg)));
                        pending.push_back(ConnEvent::TransportFailed);
                    }
                    None => {
                        deps.handlers.emit_disconnect(DisconnectReason::new("WebSocket stream ended"));
                        pending.push_back(ConnEvent::TransportFailed);
                    }
                }
            }
        }
    }

    // Orderly shutdown: leave the socket cleanly and report disconnected.
    deps.generation.bump();
    if let Some(mut stream) = ws.take() {
        let _ = stream.close(None).await;
        deps.handlers.emit_disconnect(DisconnectReason::new("Client disconnected"));
    }
    let _ = deps.state_tx.send_replace(ConnectionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_ws_url() {
        assert_eq!(resolve_ws_url("http://localhost:3000").unwrap(), "ws://localhost:3000/ws");
        assert_eq!(resolve_ws_url("https://api.example.com/").unwrap(), "wss://api.example.com/ws");
        assert_eq!(resolve_ws_url("wss://api.example.com").unwrap(), "wss://api.example.com/ws");
        assert!(resolve_ws_url("ftp://nope").is_err());
    }
}
