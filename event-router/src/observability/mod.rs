//! Structured logging vocabulary shared by every component.
//!
//! Log records carry an `event` field drawn from [`events`] and a
//! `component` naming the emitting module. Other keys come from [`fields`].

pub(crate) mod events;
pub(crate) mod fields;
