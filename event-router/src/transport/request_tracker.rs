//! Request/reply correlation with timeouts.
//!
//! [`RequestTrackingFilter`] sits between a transport and a protocol handler.
//! The handler sees a [`TrackedSession`] instead of the raw session: every
//! request sent through it is recorded by xid, replies coming back get the
//! original request attached, and requests left unanswered for the timeout
//! period come back as [`Message::RequestTimeout`].
//!
//! One deferred check is armed per session at most. Each firing reports
//! every expired request and re-arms for the earliest remaining deadline.

use crate::messages::{Message, RequestTimeout};
use crate::observability::{events, fields};
use crate::runtime::{ScheduledTask, Scheduler};
use crate::transport::{RemoteAddress, Session, SessionAttributes, SessionError, SessionHandler, SessionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

const COMPONENT: &str = "request_tracker";
const TRACKED_SESSION_KEY: &str = "tracked-session";

pub struct RequestTrackingFilter {
    inner: Arc<dyn SessionHandler>,
    scheduler: Scheduler,
    timeout: Duration,
}

impl RequestTrackingFilter {
    pub fn new(inner: Arc<dyn SessionHandler>, scheduler: Scheduler, timeout: Duration) -> Self {
        Self {
            inner,
            scheduler,
            timeout,
        }
    }

    fn tracked(&self, session: &Arc<dyn Session>) -> Arc<dyn Session> {
        if let Some(tracked) = session.attributes().get::<TrackedSession>(TRACKED_SESSION_KEY) {
            return tracked;
        }

        let tracked = TrackedSession::new(
            session.clone(),
            self.inner.clone(),
            self.scheduler.clone(),
            self.timeout,
        );
        session
            .attributes()
            .insert(TRACKED_SESSION_KEY, tracked.clone());
        tracked
    }
}

impl SessionHandler for RequestTrackingFilter {
    fn session_opened(&self, session: &Arc<dyn Session>) {
        let tracked = self.tracked(session);
        self.inner.session_opened(&tracked);
    }

    fn message_received(&self, session: &Arc<dyn Session>, message: Message) {
        let message = match session.attributes().get::<TrackedSession>(TRACKED_SESSION_KEY) {
            Some(tracked) => tracked.resolve_reply(message),
            None => message,
        };
        let tracked = self.tracked(session);
        self.inner.message_received(&tracked, message);
    }

    fn session_idle(&self, session: &Arc<dyn Session>) {
        let tracked = self.tracked(session);
        self.inner.session_idle(&tracked);
    }

    fn session_closed(&self, session: &Arc<dyn Session>) {
        let tracked = session.attributes().get::<TrackedSession>(TRACKED_SESSION_KEY);
        session.attributes().remove(TRACKED_SESSION_KEY);

        match tracked {
            Some(tracked) => {
                tracked.forget_all();
                let tracked: Arc<dyn Session> = tracked;
                self.inner.session_closed(&tracked);
            }
            None => self.inner.session_closed(session),
        }
    }
}

struct Outstanding {
    request: Arc<Message>,
    sent_at: Instant,
}

#[derive(Default)]
struct TrackerState {
    outstanding: HashMap<u32, Outstanding>,
    check: Option<ScheduledTask>,
}

/// A session wrapper that records outgoing requests.
pub struct TrackedSession {
    session: Arc<dyn Session>,
    inner: Arc<dyn SessionHandler>,
    scheduler: Scheduler,
    timeout: Duration,
    state: Mutex<TrackerState>,
    this: Weak<TrackedSession>,
}

impl TrackedSession {
    fn new(
        session: Arc<dyn Session>,
        inner: Arc<dyn SessionHandler>,
        scheduler: Scheduler,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            session,
            inner,
            scheduler,
            timeout,
            state: Mutex::new(TrackerState::default()),
            this: this.clone(),
        })
    }

    /// Number of requests awaiting a reply.
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    fn record(&self, xid: u32, request: Arc<Message>) {
        let mut state = self.state.lock();
        state.outstanding.insert(
            xid,
            Outstanding {
                request,
                sent_at: Instant::now(),
            },
        );
        if state.check.is_none() {
            state.check = Some(self.schedule_check(self.timeout));
        }
    }

    fn forget(&self, xid: u32) -> Option<Arc<Message>> {
        let mut state = self.state.lock();
        let entry = state.outstanding.remove(&xid);
        if state.outstanding.is_empty() {
            if let Some(check) = state.check.take() {
                check.cancel();
            }
        }
        entry.map(|outstanding| outstanding.request)
    }

    fn forget_all(&self) {
        let mut state = self.state.lock();
        state.outstanding.clear();
        if let Some(check) = state.check.take() {
            check.cancel();
        }
    }

    fn schedule_check(&self, delay: Duration) -> ScheduledTask {
        let this = self.this.clone();
        self.scheduler.schedule(delay, move || {
            if let Some(tracked) = this.upgrade() {
                tracked.check_timeouts();
            }
        })
    }

    fn check_timeouts(&self) {
        let now = Instant::now();

        let expired: Vec<Arc<Message>> = {
            let mut state = self.state.lock();
            state.check = None;

            let expired_xids: Vec<u32> = state
                .outstanding
                .iter()
                .filter(|(_, outstanding)| now.duration_since(outstanding.sent_at) >= self.timeout)
                .map(|(xid, _)| *xid)
                .collect();
            let expired = expired_xids
                .iter()
                .filter_map(|xid| state.outstanding.remove(xid))
                .map(|outstanding| outstanding.request)
                .collect();

            if let Some(earliest) = state.outstanding.values().map(|o| o.sent_at).min() {
                let delay = (earliest + self.timeout).saturating_duration_since(now);
                state.check = Some(self.schedule_check(delay));
            }

            expired
        };

        let Some(this) = self.this.upgrade() else {
            return;
        };
        let session: Arc<dyn Session> = this;

        for request in expired {
            warn!(
                event = events::REQUEST_TIMEOUT,
                component = COMPONENT,
                session_id = %self.session.id(),
                remote = %self.session.remote_address(),
                msg_type = request.name(),
                xid = request.xid().unwrap_or_default(),
                "request timed out"
            );
            self.inner
                .message_received(&session, Message::RequestTimeout(RequestTimeout { request }));
        }
    }

    /// Attaches the matching request to a reply, or turns an unmatched reply
    /// into an error message.
    fn resolve_reply(&self, mut message: Message) -> Message {
        if !message.is_reply() {
            return message;
        }

        let xid = message.xid().unwrap_or_default();
        match self.forget(xid) {
            Some(request) => {
                message.attach_request(request);
                message
            }
            None => {
                warn!(
                    event = events::REPLY_UNKNOWN_XID,
                    component = COMPONENT,
                    session_id = %self.session.id(),
                    msg_type = message.name(),
                    xid,
                    reason = fields::REASON_UNKNOWN_XID,
                    "reply does not match any outstanding request"
                );
                Message::error(format!("Reply with unknown XID {xid}"), Some(Arc::new(message)))
            }
        }
    }
}

impl Session for TrackedSession {
    fn id(&self) -> SessionId {
        self.session.id()
    }

    fn send(&self, message: Message) -> Result<(), SessionError> {
        let tracked_xid = match (message.is_request(), message.xid()) {
            (true, Some(xid)) => {
                self.record(xid, Arc::new(message.clone()));
                Some(xid)
            }
            _ => None,
        };

        let result = self.session.send(message);
        if let (Err(_), Some(xid)) = (&result, tracked_xid) {
            self.forget(xid);
        }
        result
    }

    fn close(&self) {
        self.session.close();
    }

    fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    fn set_idle_timeout(&self, timeout: Option<Duration>) {
        self.session.set_idle_timeout(timeout);
    }

    fn remote_address(&self) -> &RemoteAddress {
        self.session.remote_address()
    }

    fn attributes(&self) -> &SessionAttributes {
        self.session.attributes()
    }
}
