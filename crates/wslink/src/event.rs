//! Link lifecycle states and events.
//!
//! The link manager publishes a [`LinkEvent`] for every state change and every
//! decision it takes. Subscribe via `LinkManager::subscribe()` to observe the
//! link without touching its transport.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Lifecycle state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    /// Transport open, signature not yet sent. No frames flow in this state.
    AwaitingAuth,
    /// Login frame sent, inbound frames are logged
    Authenticated,
    Closing,
    /// Waiting out the fixed reconnect delay
    Cooldown,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingAuth => "awaiting_auth",
            Self::Authenticated => "authenticated",
            Self::Closing => "closing",
            Self::Cooldown => "cooldown",
        };
        f.write_str(name)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The peer sent a close frame
    PeerClosed { code: Option<u16>, reason: String },
    /// The signature could not be acquired
    AuthFailed(String),
    /// The transport reported it was already closed
    ClosedExpected,
    /// Any other connect, read or write failure
    TransportError(String),
}

/// Events emitted by the link manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    StateChanged {
        attempt: u64,
        from: LinkState,
        to: LinkState,
    },
    /// Transport connection opened
    Opened { attempt: u64 },
    SignatureAcquired { attempt: u64 },
    /// Login frame sent; the session is now treated as authenticated
    LoggedIn { attempt: u64 },
    /// Session ended
    Closed { attempt: u64, cause: CloseCause },
    /// Informational retry notice for an expected close
    Retrying { attempt: u64 },
    /// Unexpected failure, with full detail
    Error {
        attempt: u64,
        at: DateTime<Utc>,
        error: String,
    },
    /// Reconnect delay started
    CooldownStarted { attempt: u64, delay: Duration },
    /// The manager stopped after an operator interrupt
    Shutdown,
}
