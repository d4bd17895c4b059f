//! In-crate session doubles for unit tests.

use crate::messages::Message;
use crate::transport::{RemoteAddress, Session, SessionAttributes, SessionError, SessionHandler, SessionId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// A session that records everything sent on it.
pub(crate) struct RecordingSession {
    id: SessionId,
    address: RemoteAddress,
    attributes: SessionAttributes,
    sent: Mutex<Vec<Message>>,
    open: AtomicBool,
    idle_timeout: Mutex<Option<Duration>>,
}

impl RecordingSession {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_address(RemoteAddress::new("localhost", 2916))
    }

    pub(crate) fn with_address(address: RemoteAddress) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::new(),
            address,
            attributes: SessionAttributes::new(),
            sent: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            idle_timeout: Mutex::new(None),
        })
    }

    pub(crate) fn as_dyn(self: &Arc<Self>) -> Arc<dyn Session> {
        self.clone()
    }

    pub(crate) fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    pub(crate) fn take_sent(&self) -> Vec<Message> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub(crate) fn idle_timeout(&self) -> Option<Duration> {
        *self.idle_timeout.lock()
    }
}

impl Session for RecordingSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn send(&self, message: Message) -> Result<(), SessionError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(SessionError::Closed(self.id));
        }
        self.sent.lock().push(message);
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn set_idle_timeout(&self, timeout: Option<Duration>) {
        *self.idle_timeout.lock() = timeout;
    }

    fn remote_address(&self) -> &RemoteAddress {
        &self.address
    }

    fn attributes(&self) -> &SessionAttributes {
        &self.attributes
    }
}

/// A handler that records the messages it receives.
#[derive(Default)]
pub(crate) struct RecordingHandler {
    received: Mutex<Vec<Message>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl RecordingHandler {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn received(&self) -> Vec<Message> {
        self.received.lock().clone()
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SessionHandler for RecordingHandler {
    fn session_opened(&self, _session: &Arc<dyn Session>) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn message_received(&self, _session: &Arc<dyn Session>, message: Message) {
        self.received.lock().push(message);
    }

    fn session_closed(&self, _session: &Arc<dyn Session>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Formatted log output of the current thread, kept for assertions.
#[derive(Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Captures until the returned guard drops.
    pub(crate) fn start() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub(crate) fn count(&self, needle: &str) -> usize {
        String::from_utf8_lossy(&self.buffer.lock()).matches(needle).count()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
