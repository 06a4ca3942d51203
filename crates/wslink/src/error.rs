//! wslink error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors that can occur while holding the link open.
#[derive(Error, Debug)]
pub enum LinkError {
    /// A required environment variable is not set (startup only, fatal)
    #[error("Missing environment variable: {0}")]
    MissingCredential(String),

    /// Any step of the login flow failed, including an empty signature
    #[error("Authentication flow failed: {0}")]
    AuthFlow(String),

    /// The transport was already closed when it was used
    #[error("Connection already closed")]
    TransportClosed,

    /// Other transport-level failures (connect, read, write)
    #[error("Transport error: {0}")]
    Transport(String),

    /// WebSocket protocol or I/O failure reported by tungstenite
    #[error("WebSocket transport failed")]
    WebSocket(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    /// TLS setup errors
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP errors raised by the login flow
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LinkError {
    /// Create an authentication flow error.
    pub fn auth_flow(msg: impl Into<String>) -> Self {
        Self::AuthFlow(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is the expected "connection already closed" condition.
    ///
    /// Such errors are reported at info level rather than as failures.
    pub fn is_closed_expected(&self) -> bool {
        matches!(self, Self::TransportClosed)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LinkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::TransportClosed,
            other => Self::WebSocket(Box::new(other)),
        }
    }
}

/// Render an error and every `source()` below it, one cause per line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
