//! Timeouts shared by both ends of a federation link.

use super::FederationOptions;
use crate::runtime::Scheduler;
use crate::transport::{LivenessFilter, RequestTrackingFilter, SessionHandler};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FederationTimeouts {
    /// Unanswered requests and liveness probes fail after this long. Also
    /// the delay between connector retries.
    pub request_timeout: Duration,
    /// Read-idle period before a liveness probe is sent.
    pub keepalive_interval: Duration,
}

impl Default for FederationTimeouts {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(20),
            keepalive_interval: Duration::from_secs(60),
        }
    }
}

impl From<&FederationOptions> for FederationTimeouts {
    fn from(options: &FederationOptions) -> Self {
        Self {
            request_timeout: options.request_timeout(),
            keepalive_interval: options.keepalive_interval(),
        }
    }
}

impl FederationTimeouts {
    /// Wraps `handler` in the filters every federation session runs
    /// through: liveness probing outermost, then request tracking.
    pub(crate) fn session_filters(
        &self,
        handler: Arc<dyn SessionHandler>,
        scheduler: &Scheduler,
    ) -> Arc<dyn SessionHandler> {
        let tracked = Arc::new(RequestTrackingFilter::new(
            handler,
            scheduler.clone(),
            self.request_timeout,
        ));

        Arc::new(LivenessFilter::new(
            tracked,
            scheduler.clone(),
            self.keepalive_interval,
            self.request_timeout,
        ))
    }
}
