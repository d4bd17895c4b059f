//! Key material and key-set matching for secure delivery.
//!
//! Clients attach private keys; the router hashes them to public keys on
//! receipt (producer keys on notifications, consumer keys on subscriptions)
//! and then matches public keys only.

mod key;
mod keys;

pub use key::{Key, KeyError, KeyScheme, Role};
pub use keys::Keys;
