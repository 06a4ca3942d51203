use std::time::Duration;

use url::Url;

use crate::error::{LinkError, Result};

/// Default websocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://server1.idle-pixel.com";

/// Default delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(120);

/// Settings for the link manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Websocket endpoint (`ws://` or `wss://`)
    pub url: String,
    /// Fixed delay before every reconnect. No backoff, no retry limit.
    pub reconnect_delay: Duration,
    /// Upper bound for signature acquisition. `None` waits indefinitely.
    pub auth_timeout: Option<Duration>,
    /// Skip server certificate validation on the websocket (default: true)
    pub danger_accept_invalid_certs: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            auth_timeout: None,
            danger_accept_invalid_certs: true,
        }
    }
}

impl LinkConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    /// Check the endpoint is a websocket URL.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| LinkError::config(format!("invalid url {:?}: {e}", self.url)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(LinkError::config(format!(
                "unsupported url scheme {other:?}, expected ws or wss"
            ))),
        }
    }
}
