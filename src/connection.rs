use crate::config::ClientConfig;
use crate::error::{Result, TvError};
use crate::pending::PendingRequests;
use crate::protocol::{self, encode_payload, Command, InboundMessage, Lifecycle};
use crate::reconnect::{ReconnectPolicy, RetryDecision};
use crate::token::TokenStore;
use crate::types::{ChannelFault, ChannelKind, ChannelState, ChannelStatus, DeviceEndpoint};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

const REMOTE_PATH: &str = "/api/v2/channels/samsung.remote.control";
const CONTROL_PATH: &str = "/api/v2";
const ART_PATH: &str = "/api/v2/channels/com.samsung.art-app";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything a channel hands to the event dispatcher
#[derive(Debug, Clone)]
pub(crate) enum Inbound {
    Message {
        kind: ChannelKind,
        message: InboundMessage,
    },
    Status {
        kind: ChannelKind,
        status: ChannelStatus,
    },
    /// Everything queued before this has been handled; stop
    Shutdown,
}

/// How one session on the transport ended
#[derive(Debug)]
enum SessionEnd {
    /// `close()` or client shutdown
    Cancelled,
    /// The TV refused the token
    Rejected(String),
    /// Transport failure, silence, or a closed socket
    Lost(TvError),
}

/// State shared between the channel handle and its supervisor task
struct ChannelShared {
    kind: ChannelKind,
    endpoint: DeviceEndpoint,
    config: ClientConfig,
    tokens: Arc<TokenStore>,
    pending: Arc<PendingRequests>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    status_tx: watch::Sender<ChannelStatus>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    last_activity: Mutex<Option<Instant>>,
}

impl ChannelShared {
    fn publish(&self, state: ChannelState, fault: Option<ChannelFault>, retry_count: u32) {
        let status = ChannelStatus {
            state,
            fault,
            retry_count,
        };
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            tracing::debug!(channel = %self.kind, ?state, ?fault, retry_count, "Channel status");
            let _ = self.inbound_tx.send(Inbound::Status {
                kind: self.kind,
                status,
            });
        }
    }

    fn send(&self, command: &Command) -> Result<()> {
        let kind = self.kind;
        if self.status_tx.borrow().state != ChannelState::Connected {
            return Err(TvError::NotConnected(kind));
        }

        let json = protocol::encode(command)?;
        tracing::debug!(channel = %kind, "Sending: {}", json);

        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(TvError::NotConnected(kind))?;
        tx.send(Message::Text(json))
            .map_err(|_| TvError::NotConnected(kind))
    }

    fn touch(&self) {
        *self.last_activity.lock() = Some(Instant::now());
    }

    fn url(&self) -> String {
        channel_url(
            self.kind,
            &self.endpoint,
            &self.config.name,
            self.tokens.get().as_deref(),
        )
    }

    fn use_tls(&self) -> bool {
        match self.kind {
            ChannelKind::Control => false,
            ChannelKind::Remote | ChannelKind::Art => self.endpoint.use_tls(),
        }
    }
}

/// Build the WebSocket URL of a channel
///
/// The control channel always uses the plaintext port; the others follow the
/// endpoint's TLS setting.
pub(crate) fn channel_url(
    kind: ChannelKind,
    endpoint: &DeviceEndpoint,
    name: &str,
    token: Option<&str>,
) -> String {
    let (scheme, port, path) = match kind {
        ChannelKind::Remote => (tls_scheme(endpoint), endpoint.remote_port(), REMOTE_PATH),
        ChannelKind::Control => ("ws", endpoint.control_port(), CONTROL_PATH),
        ChannelKind::Art => (tls_scheme(endpoint), endpoint.remote_port(), ART_PATH),
    };

    let mut url = format!(
        "{}://{}:{}{}?name={}",
        scheme,
        endpoint.host(),
        port,
        path,
        encode_payload(name.as_bytes())
    );
    if let Some(token) = token {
        url.push_str("&token=");
        url.push_str(token);
    }
    url
}

fn tls_scheme(endpoint: &DeviceEndpoint) -> &'static str {
    if endpoint.use_tls() {
        "wss"
    } else {
        "ws"
    }
}

/// Open the transport; TVs present self-signed certificates
async fn open_transport(url: &str, use_tls: bool) -> Result<WsStream> {
    let (ws_stream, _) = if use_tls {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(std::io::Error::other)?;
        tokio_tungstenite::connect_async_tls_with_config(
            url,
            None,
            false,
            Some(tokio_tungstenite::Connector::NativeTls(connector)),
        )
        .await?
    } else {
        tokio_tungstenite::connect_async(url).await?
    };
    Ok(ws_stream)
}

#[derive(Clone)]
pub(crate) struct ChannelSender {
    shared: Arc<ChannelShared>,
}

impl ChannelSender {
    pub(crate) fn send(&self, command: &Command) -> Result<()> {
        self.shared.send(command)
    }
}

/// One of the three channels to the TV
///
/// The handle keeps its identity across reconnects; the supervisor task behind
/// it opens, authenticates, and re-opens the transport as needed.
pub struct ChannelConnection {
    shared: Arc<ChannelShared>,
    root_cancel: CancellationToken,
    run: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl ChannelConnection {
    pub(crate) fn new(
        kind: ChannelKind,
        endpoint: DeviceEndpoint,
        config: ClientConfig,
        tokens: Arc<TokenStore>,
        pending: Arc<PendingRequests>,
        inbound_tx: mpsc::UnboundedSender<Inbound>,
        root_cancel: CancellationToken,
    ) -> Self {
        let (status_tx, _) = watch::channel(ChannelStatus::default());
        Self {
            shared: Arc::new(ChannelShared {
                kind,
                endpoint,
                config,
                tokens,
                pending,
                inbound_tx,
                status_tx,
                outbound: Mutex::new(None),
                last_activity: Mutex::new(None),
            }),
            root_cancel,
            run: Mutex::new(None),
        }
    }

    pub fn status(&self) -> ChannelStatus {
        *self.shared.status_tx.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Time of the last inbound frame or pong
    pub fn last_activity(&self) -> Option<Instant> {
        *self.shared.last_activity.lock()
    }

    /// Whether a supervisor task is currently running
    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Start the supervisor with a fresh retry counter
    ///
    /// No-op while a healthy supervisor is already running.
    pub fn start(&self) {
        let mut run = self.run.lock();
        if self.root_cancel.is_cancelled() {
            return;
        }
        if let Some((cancel, handle)) = run.take() {
            if !handle.is_finished() && self.status().fault.is_none() {
                *run = Some((cancel, handle));
                return;
            }
            // A faulted supervisor is already on its way out
            cancel.cancel();
            handle.abort();
        }

        let cancel = self.root_cancel.child_token();
        let shared = self.shared.clone();
        let task_cancel = cancel.clone();
        shared.publish(ChannelState::Connecting, None, 0);
        let handle = tokio::spawn(async move {
            supervise(shared, task_cancel).await;
        });
        *run = Some((cancel, handle));
    }

    /// Send a command; fails with `NotConnected` unless connected
    pub fn send(&self, command: &Command) -> Result<()> {
        self.shared.send(command)
    }

    /// Cloneable send-only handle for background tasks
    pub(crate) fn sender(&self) -> ChannelSender {
        ChannelSender {
            shared: self.shared.clone(),
        }
    }

    /// Make sure the channel can take a request
    ///
    /// Waits at most `wait` for an in-flight connect. A channel that gave up
    /// after its retry ceiling fails with `ChannelUnavailable` immediately and
    /// its supervisor is restarted with a reset counter.
    pub async fn ensure_ready(&self, wait: Duration) -> Result<()> {
        let kind = self.shared.kind;
        let mut status_rx = self.watch_status();

        let status = *status_rx.borrow_and_update();
        match status.fault {
            Some(ChannelFault::AuthRejected) => return Err(TvError::AuthRejected(kind)),
            Some(ChannelFault::Unavailable) => {
                tracing::info!(channel = %kind, "Channel requested after giving up, restarting");
                self.start();
                return Err(TvError::ChannelUnavailable(kind));
            }
            None => {}
        }
        if status.is_connected() {
            return Ok(());
        }
        if !self.is_running() {
            return Err(TvError::NotConnected(kind));
        }

        let waited = timeout(wait, async {
            loop {
                let status = *status_rx.borrow_and_update();
                match status.fault {
                    Some(ChannelFault::AuthRejected) => return Err(TvError::AuthRejected(kind)),
                    Some(ChannelFault::Unavailable) => {
                        return Err(TvError::ChannelUnavailable(kind))
                    }
                    None if status.is_connected() => return Ok(()),
                    None => {}
                }
                if status_rx.changed().await.is_err() {
                    return Err(TvError::NotConnected(kind));
                }
            }
        })
        .await;

        match waited {
            Ok(result) => result,
            Err(_) => Err(TvError::NotConnected(kind)),
        }
    }

    /// Stop the supervisor and close the transport
    ///
    /// Idempotent. Returns once the supervisor task has exited.
    pub async fn close(&self) {
        let run = self.run.lock().take();
        if let Some((cancel, handle)) = run {
            self.shared.publish(ChannelState::Closing, None, 0);
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(channel = %self.shared.kind, "Channel task ended abnormally: {}", e);
            }
        }
        self.shared.outbound.lock().take();
        self.shared.pending.fail_channel(self.shared.kind);
        self.shared.publish(ChannelState::Disconnected, None, 0);
    }
}

/// Connect, run, and reconnect until cancelled, rejected, or out of retries
async fn supervise(shared: Arc<ChannelShared>, cancel: CancellationToken) {
    let kind = shared.kind;
    let mut policy = ReconnectPolicy::new(shared.config.reconnect.clone());

    loop {
        if cancel.is_cancelled() {
            break;
        }
        shared.publish(ChannelState::Connecting, None, policy.failures());

        let end = run_session(&shared, &cancel, &mut policy).await;
        shared.outbound.lock().take();

        match end {
            SessionEnd::Cancelled => break,
            SessionEnd::Rejected(reason) => {
                tracing::warn!(channel = %kind, "Authentication rejected: {}", reason);
                shared.pending.fail_channel(kind);
                shared.publish(
                    ChannelState::Disconnected,
                    Some(ChannelFault::AuthRejected),
                    policy.failures(),
                );
                return;
            }
            SessionEnd::Lost(e) => {
                shared.pending.fail_channel(kind);
                match policy.record_failure() {
                    RetryDecision::GiveUp => {
                        tracing::error!(
                            channel = %kind,
                            failures = policy.failures(),
                            "Reconnection limit reached, giving up: {}",
                            e
                        );
                        shared.publish(
                            ChannelState::Disconnected,
                            Some(ChannelFault::Unavailable),
                            policy.failures(),
                        );
                        return;
                    }
                    RetryDecision::Retry(delay) => {
                        tracing::warn!(
                            channel = %kind,
                            attempt = policy.failures(),
                            delay_ms = delay.as_millis() as u64,
                            "Channel lost, reconnecting: {}",
                            e
                        );
                        shared.publish(ChannelState::Disconnected, None, policy.failures());
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }

    tracing::debug!(channel = %kind, "Channel supervisor exiting");
}

/// One transport session: open, authenticate, then read until it ends
async fn run_session(
    shared: &Arc<ChannelShared>,
    cancel: &CancellationToken,
    policy: &mut ReconnectPolicy,
) -> SessionEnd {
    let kind = shared.kind;
    let url = shared.url();
    tracing::info!(channel = %kind, "Connecting to {}", redact_token(&url));

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return SessionEnd::Cancelled,
        opened = timeout(shared.config.connect_timeout, open_transport(&url, shared.use_tls())) => opened,
    };
    let ws_stream = match opened {
        Ok(Ok(ws_stream)) => ws_stream,
        Ok(Err(e)) => return SessionEnd::Lost(e),
        Err(_) => return SessionEnd::Lost(TvError::RequestTimeout(format!("{} connect", kind))),
    };
    let (mut write, mut read) = ws_stream.split();

    // Writes go through their own task so a slow socket never stalls the reader
    let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = ws_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = write.send(msg).await {
                tracing::error!(channel = %kind, "Failed to send message: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
    });
    *shared.outbound.lock() = Some(ws_tx.clone());
    shared.touch();

    let mut authenticating = kind.requires_auth();
    if authenticating {
        shared.publish(ChannelState::Authenticating, None, policy.failures());
    } else {
        policy.record_success();
        shared.publish(ChannelState::Connected, None, 0);
    }
    let auth_deadline = Instant::now() + shared.config.auth_timeout;

    let heartbeat = shared.config.heartbeat.clone();
    let mut ticker = tokio::time::interval(
        heartbeat
            .as_ref()
            .map_or(Duration::from_secs(3600), |h| h.interval),
    );
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.reset();

    let end = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None));
                break SessionEnd::Cancelled;
            }
            frame = read.next() => {
                let payload = match frame {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        shared.touch();
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(channel = %kind, "WebSocket close frame received: {:?}", frame);
                        break SessionEnd::Lost(TvError::ConnectionClosed);
                    }
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Err(e)) => break SessionEnd::Lost(e.into()),
                    None => break SessionEnd::Lost(TvError::ConnectionClosed),
                };
                shared.touch();

                let message = match protocol::decode(&payload) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(channel = %kind, "Dropping frame: {}", e);
                        continue;
                    }
                };
                tracing::debug!(channel = %kind, event = %message.event, "Received");

                match message.lifecycle() {
                    Some(Lifecycle::Granted { token }) if authenticating => {
                        if let Some(token) = token {
                            shared.tokens.update(&token);
                        }
                        authenticating = false;
                        policy.record_success();
                        shared.publish(ChannelState::Connected, None, 0);
                    }
                    // Some firmware answers a paired client with ready instead of connect
                    Some(Lifecycle::Ready) if authenticating => {
                        authenticating = false;
                        policy.record_success();
                        shared.publish(ChannelState::Connected, None, 0);
                    }
                    Some(Lifecycle::Rejected(reason)) => break SessionEnd::Rejected(reason),
                    _ => {}
                }

                if shared.inbound_tx.send(Inbound::Message { kind, message }).is_err() {
                    break SessionEnd::Cancelled;
                }
            }
            _ = tokio::time::sleep_until(auth_deadline), if authenticating => {
                break SessionEnd::Lost(TvError::RequestTimeout(format!("{} authentication", kind)));
            }
            _ = ticker.tick(), if heartbeat.is_some() => {
                let silent_for = shared
                    .last_activity
                    .lock()
                    .map_or(Duration::ZERO, |at| at.elapsed());
                let limit = heartbeat.as_ref().map_or(Duration::MAX, |h| h.timeout);
                if silent_for > limit {
                    tracing::warn!(channel = %kind, ?silent_for, "No activity, treating channel as lost");
                    break SessionEnd::Lost(TvError::RequestTimeout(format!("{} heartbeat", kind)));
                }
                if ws_tx.send(Message::Ping(Vec::new())).is_err() {
                    break SessionEnd::Lost(TvError::ConnectionClosed);
                }
            }
        }
    };

    shared.outbound.lock().take();
    drop(ws_tx);
    if timeout(Duration::from_secs(1), writer).await.is_err() {
        tracing::debug!(channel = %kind, "Writer did not drain in time");
    }
    end
}

fn redact_token(url: &str) -> String {
    match url.find("&token=") {
        Some(idx) => format!("{}&token=***", &url[..idx]),
        None => url.to_string(),
    }
}
