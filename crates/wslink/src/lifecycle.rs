//! Connection lifecycle manager.
//!
//! Drives one websocket session at a time through
//! `Connecting -> AwaitingAuth -> Authenticated -> Closing -> Cooldown` and
//! back to `Connecting`, forever, until the cancellation token fires.
//!
//! Every attempt acquires a fresh signature after the transport opens and
//! sends it as `LOGIN=<signature>` before reading anything. The server never
//! acknowledges the login; frames read afterwards are treated as
//! authenticated traffic.
//!
//! Failures never escape [`LinkManager::run`]. Each one closes the session and
//! leads to exactly one fixed-length cooldown before the next attempt.

use std::sync::Arc;

use chrono::{Local, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::LinkConfig;
use crate::credentials::Credentials;
use crate::error::{LinkError, Result, error_chain};
use crate::event::{CloseCause, LinkEvent, LinkState};
use crate::frame_log::{FrameSink, LogEntry};
use crate::signature::SignatureSource;
use crate::transport::{Connector, Transport, TransportEvent};

/// Prefix of the first frame of every session.
pub const LOGIN_PREFIX: &str = "LOGIN=";

/// Broadcast channel capacity for link events.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Format of the wall-clock stamp attached to error reports.
const ERROR_TIMESTAMP_FORMAT: &str = "%d/%m/%Y , %H:%M:%S";

/// Build the login frame for a signature.
pub fn login_frame(signature: &str) -> String {
    format!("{LOGIN_PREFIX}{signature}")
}

impl CloseCause {
    fn from_error(err: &LinkError) -> Self {
        match err {
            LinkError::TransportClosed => Self::ClosedExpected,
            LinkError::AuthFlow(_) => Self::AuthFailed(error_chain(err)),
            other => Self::TransportError(error_chain(other)),
        }
    }
}

/// One connection attempt. Owns the transport exclusively.
struct Session<T> {
    attempt: u64,
    transport: T,
    signature: Option<String>,
}

impl<T: Transport> Session<T> {
    fn new(attempt: u64, transport: T) -> Self {
        Self {
            attempt,
            transport,
            signature: None,
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.transport.close().await {
            debug!(attempt = self.attempt, "Error while closing transport: {}", e);
        }
    }
}

/// How a session ended.
enum SessionEnd {
    /// Operator interrupt; the manager stops.
    Interrupted,
    /// Any other end; the manager cools down and retries.
    Closed(CloseCause),
}

/// Owns the websocket session state machine.
pub struct LinkManager<C: Connector> {
    config: LinkConfig,
    credentials: Credentials,
    connector: C,
    signatures: Arc<dyn SignatureSource>,
    sink: Arc<dyn FrameSink>,
    event_tx: broadcast::Sender<LinkEvent>,
    state: LinkState,
    attempt: u64,
}

impl<C: Connector> LinkManager<C> {
    pub fn new(
        config: LinkConfig,
        credentials: Credentials,
        connector: C,
        signatures: Arc<dyn SignatureSource>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            credentials,
            connector,
            signatures,
            sink,
            event_tx,
            state: LinkState::Disconnected,
            attempt: 0,
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.event_tx.subscribe()
    }

    /// Run the connect / authenticate / stream / cooldown loop until `cancel`
    /// fires. Retries are unlimited and never back off.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            self.attempt += 1;
            match self.run_session(&cancel).await {
                SessionEnd::Interrupted => break,
                SessionEnd::Closed(cause) => self.report_close(cause),
            }

            let delay = self.config.reconnect_delay;
            self.transition(LinkState::Cooldown);
            info!(attempt = self.attempt, "Reconnecting in {:?}", delay);
            self.emit(LinkEvent::CooldownStarted {
                attempt: self.attempt,
                delay,
            });

            let interrupted = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if interrupted {
                break;
            }
        }

        self.transition(LinkState::Disconnected);
        info!("Link stopped");
        self.emit(LinkEvent::Shutdown);
    }

    async fn run_session(&mut self, cancel: &CancellationToken) -> SessionEnd {
        let attempt = self.attempt;
        self.transition(LinkState::Connecting);
        debug!(attempt, url = %self.config.url, "Connecting");

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.connector.connect(&self.config.url) => Some(result),
        };
        let transport = match connected {
            None => return SessionEnd::Interrupted,
            Some(Ok(transport)) => transport,
            Some(Err(e)) => {
                self.transition(LinkState::Closing);
                return SessionEnd::Closed(CloseCause::from_error(&e));
            }
        };

        let mut session = Session::new(attempt, transport);
        info!("Opened connection.");
        self.emit(LinkEvent::Opened { attempt });
        self.transition(LinkState::AwaitingAuth);

        // The transport stays silent until a signature is in hand.
        info!("Acquiring signature...");
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.acquire_signature() => Some(result),
        };
        match acquired {
            None => {
                self.transition(LinkState::Closing);
                session.close().await;
                return SessionEnd::Interrupted;
            }
            Some(Err(e)) => {
                self.transition(LinkState::Closing);
                session.close().await;
                return SessionEnd::Closed(CloseCause::from_error(&e));
            }
            Some(Ok(signature)) => session.signature = Some(signature),
        }
        info!("Signature acquired.");
        self.emit(LinkEvent::SignatureAcquired { attempt });

        info!("Logging in...");
        let frame = login_frame(session.signature.as_deref().unwrap_or_default());
        if let Err(e) = session.transport.send_text(&frame).await {
            self.transition(LinkState::Closing);
            session.close().await;
            return SessionEnd::Closed(CloseCause::from_error(&e));
        }
        self.sink.log(&LogEntry::outbound(frame));
        self.transition(LinkState::Authenticated);
        self.emit(LinkEvent::LoggedIn { attempt });

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                event = session.transport.next_event() => Some(event),
            };
            match next {
                None => {
                    self.transition(LinkState::Closing);
                    session.close().await;
                    return SessionEnd::Interrupted;
                }
                Some(Ok(TransportEvent::Frame(payload))) => {
                    self.sink.log(&LogEntry::inbound(payload));
                }
                Some(Ok(TransportEvent::Closed { code, reason })) => {
                    self.transition(LinkState::Closing);
                    session.close().await;
                    return SessionEnd::Closed(CloseCause::PeerClosed { code, reason });
                }
                Some(Err(e)) => {
                    self.transition(LinkState::Closing);
                    session.close().await;
                    return SessionEnd::Closed(CloseCause::from_error(&e));
                }
            }
        }
    }

    /// Ask the signature source for a fresh signature, bounded by
    /// `auth_timeout` when configured. Empty signatures are rejected.
    async fn acquire_signature(&self) -> Result<String> {
        let acquire = self.signatures.acquire(&self.credentials);
        let result = match self.config.auth_timeout {
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(LinkError::auth_flow(format!(
                        "signature acquisition timed out after {limit:?}"
                    )));
                }
            },
            None => acquire.await,
        };

        match result {
            Ok(signature) if signature.is_empty() => {
                Err(LinkError::auth_flow("signature source returned an empty signature"))
            }
            Ok(signature) => Ok(signature),
            Err(e @ LinkError::AuthFlow(_)) => Err(e),
            Err(other) => Err(LinkError::AuthFlow(error_chain(&other))),
        }
    }

    fn report_close(&self, cause: CloseCause) {
        let attempt = self.attempt;
        match &cause {
            CloseCause::PeerClosed { code, reason } => {
                info!(attempt, code = ?code, reason = %reason, "### closed ###");
            }
            CloseCause::ClosedExpected => {
                info!(attempt, "Connection closed. Retrying...");
                self.emit(LinkEvent::Retrying { attempt });
            }
            CloseCause::AuthFailed(detail) | CloseCause::TransportError(detail) => {
                let at = Utc::now();
                let local = at.with_timezone(&Local).format(ERROR_TIMESTAMP_FORMAT);
                error!(attempt, time = %local, "Link error: {}", detail);
                self.emit(LinkEvent::Error {
                    attempt,
                    at,
                    error: detail.clone(),
                });
            }
        }
        self.emit(LinkEvent::Closed { attempt, cause });
    }

    fn transition(&mut self, to: LinkState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!(attempt = self.attempt, %from, %to, "Link state changed");
        self.emit(LinkEvent::StateChanged {
            attempt: self.attempt,
            from,
            to,
        });
    }

    fn emit(&self, event: LinkEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
