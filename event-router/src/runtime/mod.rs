//! Runtime integration layer.
//!
//! Timers and background tasks go through an explicitly owned [`Scheduler`]
//! so that request tracking, liveness checks, handshake timeouts and
//! reconnect retries all run on the runtime the router was built for.

mod scheduler;

pub use scheduler::{ScheduledTask, Scheduler};
