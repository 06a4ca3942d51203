//! Scripted fakes for exercising the link manager without a network.
//!
//! Available to this crate's tests and, with the `test-utils` feature, to
//! downstream crates.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::credentials::Credentials;
use crate::error::{LinkError, Result};
use crate::frame_log::{Direction, FrameSink, LogEntry};
use crate::signature::SignatureSource;
use crate::transport::{Connector, Transport, TransportEvent};

/// Initialize tracing for tests
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// In-memory writer for asserting on formatted log output.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route this thread's events at `level` and above into the buffer.
    pub fn install(&self, level: tracing::Level) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Everything the fakes observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trace {
    Connect { at: Instant },
    ConnectFailed,
    Acquire,
    Sent(String),
    Logged { direction: Direction, payload: String },
    ClientClose,
}

/// Shared, ordered record of fake activity.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Trace>>>);

impl Journal {
    pub fn push(&self, trace: Trace) {
        self.0.lock().push(trace);
    }

    pub fn snapshot(&self) -> Vec<Trace> {
        self.0.lock().clone()
    }

    pub fn connects(&self) -> Vec<Instant> {
        self.0
            .lock()
            .iter()
            .filter_map(|t| match t {
                Trace::Connect { at } => Some(*at),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Trace) -> bool) -> usize {
        self.0.lock().iter().filter(|t| pred(t)).count()
    }

    pub fn sent(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter_map(|t| match t {
                Trace::Sent(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

/// One step a fake transport plays back when read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Frame(String),
    PeerClose,
    /// Fail with the "already closed" condition
    AlreadyClosed,
    /// Fail with a generic transport error
    Fail(String),
}

/// How a scripted connection attempt goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Refused(String),
    Open(Vec<Step>),
    /// The connect call never completes.
    Stalled,
}

/// Connector that plays back one [`Attempt`] per call.
///
/// Once the script runs out, every further connection opens and then stays
/// silent forever.
pub struct ScriptedConnector {
    attempts: Mutex<VecDeque<Attempt>>,
    journal: Journal,
}

impl ScriptedConnector {
    pub fn new(attempts: Vec<Attempt>, journal: Journal) -> Self {
        Self {
            attempts: Mutex::new(attempts.into()),
            journal,
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Transport = FakeTransport;

    async fn connect(&self, _url: &str) -> Result<FakeTransport> {
        let attempt = self.attempts.lock().pop_front();
        match attempt {
            Some(Attempt::Refused(reason)) => {
                self.journal.push(Trace::ConnectFailed);
                Err(LinkError::transport(reason))
            }
            Some(Attempt::Open(steps)) => {
                self.journal.push(Trace::Connect { at: Instant::now() });
                Ok(FakeTransport::new(steps, self.journal.clone()))
            }
            Some(Attempt::Stalled) => std::future::pending().await,
            None => {
                self.journal.push(Trace::Connect { at: Instant::now() });
                Ok(FakeTransport::new(Vec::new(), self.journal.clone()))
            }
        }
    }
}

pub struct FakeTransport {
    steps: VecDeque<Step>,
    journal: Journal,
    closed: bool,
}

impl FakeTransport {
    pub fn new(steps: Vec<Step>, journal: Journal) -> Self {
        Self {
            steps: steps.into(),
            journal,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        if self.closed {
            return Err(LinkError::TransportClosed);
        }
        self.journal.push(Trace::Sent(text.to_string()));
        Ok(())
    }

    async fn next_event(&mut self) -> Result<TransportEvent> {
        match self.steps.pop_front() {
            Some(Step::Frame(payload)) => Ok(TransportEvent::Frame(payload)),
            Some(Step::PeerClose) => Ok(TransportEvent::Closed {
                code: Some(1000),
                reason: "bye".to_string(),
            }),
            Some(Step::AlreadyClosed) => Err(LinkError::TransportClosed),
            Some(Step::Fail(reason)) => Err(LinkError::transport(reason)),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.journal.push(Trace::ClientClose);
        Ok(())
    }
}

/// Signature source that plays back scripted results.
///
/// Once the script runs out it keeps returning `"sig"`.
pub struct ScriptedSignatures {
    results: Mutex<VecDeque<std::result::Result<String, String>>>,
    delay: Option<Duration>,
    journal: Journal,
}

impl ScriptedSignatures {
    pub fn new(results: Vec<std::result::Result<String, String>>, journal: Journal) -> Self {
        Self {
            results: Mutex::new(results.into()),
            delay: None,
            journal,
        }
    }

    /// Make every acquisition take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SignatureSource for ScriptedSignatures {
    async fn acquire(&self, _credentials: &Credentials) -> Result<String> {
        self.journal.push(Trace::Acquire);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.results.lock().pop_front();
        match next {
            Some(Ok(signature)) => Ok(signature),
            Some(Err(reason)) => Err(LinkError::auth_flow(reason)),
            None => Ok("sig".to_string()),
        }
    }
}

/// Frame sink that keeps every entry and mirrors it into the journal.
#[derive(Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    journal: Journal,
}

impl RecordingSink {
    pub fn new(journal: Journal) -> Self {
        Self {
            entries: Arc::default(),
            journal,
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }
}

impl FrameSink for RecordingSink {
    fn log(&self, entry: &LogEntry) {
        self.journal.push(Trace::Logged {
            direction: entry.direction,
            payload: entry.payload.clone(),
        });
        self.entries.lock().push(entry.clone());
    }
}
