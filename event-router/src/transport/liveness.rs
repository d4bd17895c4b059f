//! Keepalive probing for federation sessions.

use crate::messages::Message;
use crate::observability::events;
use crate::runtime::{ScheduledTask, Scheduler};
use crate::transport::{Session, SessionHandler};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const COMPONENT: &str = "liveness";
const LIVENESS_STATE_KEY: &str = "liveness-state";

#[derive(Default)]
struct LivenessState {
    received: AtomicU64,
    probe: Mutex<Option<ScheduledTask>>,
}

impl LivenessState {
    fn cancel_probe(&self) {
        if let Some(probe) = self.probe.lock().take() {
            probe.cancel();
        }
    }
}

/// Sends `TestConn` after a quiet period and reports
/// [`Message::LivenessFailure`] to the inner handler when nothing at all
/// arrives within the receive timeout. Answers the peer's `TestConn` and
/// swallows `ConfConn` so the inner handler never sees either.
pub struct LivenessFilter {
    inner: Arc<dyn SessionHandler>,
    scheduler: Scheduler,
    keepalive_interval: Duration,
    receive_timeout: Duration,
}

impl LivenessFilter {
    pub fn new(
        inner: Arc<dyn SessionHandler>,
        scheduler: Scheduler,
        keepalive_interval: Duration,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            inner,
            scheduler,
            keepalive_interval,
            receive_timeout,
        }
    }

    fn state(session: &Arc<dyn Session>) -> Arc<LivenessState> {
        if let Some(state) = session.attributes().get::<LivenessState>(LIVENESS_STATE_KEY) {
            return state;
        }
        let state = Arc::new(LivenessState::default());
        session
            .attributes()
            .insert(LIVENESS_STATE_KEY, state.clone());
        state
    }
}

impl SessionHandler for LivenessFilter {
    fn session_opened(&self, session: &Arc<dyn Session>) {
        Self::state(session);
        session.set_idle_timeout(Some(self.keepalive_interval));
        self.inner.session_opened(session);
    }

    fn message_received(&self, session: &Arc<dyn Session>, message: Message) {
        let state = Self::state(session);
        state.received.fetch_add(1, Ordering::SeqCst);
        state.cancel_probe();

        match message {
            Message::TestConn => {
                let _ = session.send(Message::ConfConn);
            }
            Message::ConfConn => {}
            other => self.inner.message_received(session, other),
        }
    }

    fn session_idle(&self, session: &Arc<dyn Session>) {
        let state = Self::state(session);
        if state.probe.lock().is_some() {
            return;
        }

        // The reply can arrive before send() returns.
        let seen = state.received.load(Ordering::SeqCst);
        if session.send(Message::TestConn).is_err() {
            return;
        }

        debug!(
            event = events::LIVENESS_PROBE_SENT,
            component = COMPONENT,
            session_id = %session.id(),
            remote = %session.remote_address(),
            "session idle, sent TestConn"
        );

        let probe_state = state.clone();
        let probe_session = session.clone();
        let inner = self.inner.clone();

        let probe = self.scheduler.schedule(self.receive_timeout, move || {
            probe_state.probe.lock().take();
            if probe_state.received.load(Ordering::SeqCst) == seen
                && probe_session.is_connected()
            {
                warn!(
                    event = events::LIVENESS_FAILED,
                    component = COMPONENT,
                    session_id = %probe_session.id(),
                    remote = %probe_session.remote_address(),
                    "no reply to TestConn"
                );
                inner.message_received(&probe_session, Message::LivenessFailure);
            }
        });

        *state.probe.lock() = Some(probe);
    }

    fn session_closed(&self, session: &Arc<dyn Session>) {
        if let Some(state) = session.attributes().get::<LivenessState>(LIVENESS_STATE_KEY) {
            state.cancel_probe();
        }
        session.attributes().remove(LIVENESS_STATE_KEY);
        self.inner.session_closed(session);
    }
}
