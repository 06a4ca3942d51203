//! wslink: keeps an authenticated websocket session alive and logs its traffic.
//!
//! Every connection attempt logs in through the web form, scrapes a one-time
//! signature from the landing page and sends it as the first frame. Inbound
//! frames are then written to a console log until the connection drops, after
//! which a fixed cooldown runs and the cycle starts again.
//!
//! ## Core Types
//!
//! - [`LinkManager`] - The connect / authenticate / stream / cooldown state machine
//! - [`LinkConfig`] - Endpoint, reconnect delay and TLS settings
//! - [`LinkEvent`] / [`LinkState`] - Observable lifecycle events
//!
//! ## Collaborators
//!
//! - [`Credentials`] - Account credentials loaded from the environment
//! - [`SignatureSource`] / [`HttpLoginFlow`] - One-time signature acquisition
//! - [`Connector`] / [`Transport`] - Websocket transport, backed by tokio-tungstenite
//! - [`FrameSink`] / [`StdoutSink`] - Per-frame console output

pub mod config;
pub mod credentials;
pub mod error;
pub mod event;
pub mod frame_log;
pub mod lifecycle;
pub mod signature;
pub mod tls;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{DEFAULT_RECONNECT_DELAY, DEFAULT_WS_URL, LinkConfig};
pub use credentials::Credentials;
pub use error::{LinkError, Result};
pub use event::{CloseCause, LinkEvent, LinkState};
pub use frame_log::{Direction, FrameSink, LogEntry, StdoutSink, format_log_entry};
pub use lifecycle::{LinkManager, login_frame};
pub use signature::{HttpLoginFlow, SignatureSource, extract_signature};
pub use transport::{Connector, Transport, TransportEvent, TungsteniteConnector};
