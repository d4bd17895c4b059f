//! A client's connection state and its subscription matching.
//!
//! All state sits behind one `parking_lot` read/write lock. Mutations take
//! the write lock for their whole check-then-apply sequence, and deliveries
//! take the read lock, so concurrent deliveries never block each other.

use super::{ConnectionOptions, Subscription, SubscriptionMatch};
use crate::security::{Keys, Role};
use crate::subscription::Attributes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSubscription {
    pub subscription_id: u64,
}

impl Display for InvalidSubscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "No subscription with ID {}", self.subscription_id)
    }
}

impl std::error::Error for InvalidSubscription {}

#[derive(Debug)]
pub struct Connection {
    state: RwLock<ConnectionState>,
}

#[derive(Debug)]
pub struct ConnectionState {
    options: ConnectionOptions,
    open: bool,
    pub subscription_keys: Keys,
    pub notification_keys: Keys,
    subscriptions: HashMap<u64, Subscription>,
}

impl Connection {
    /// Creates an open connection, hashing the connection-wide keys for
    /// their roles.
    pub fn new(
        options: ConnectionOptions,
        mut subscription_keys: Keys,
        mut notification_keys: Keys,
    ) -> Self {
        subscription_keys.hash_private_keys_for_role(Role::Consumer);
        notification_keys.hash_private_keys_for_role(Role::Producer);

        Self {
            state: RwLock::new(ConnectionState {
                options,
                open: true,
                subscription_keys,
                notification_keys,
                subscriptions: HashMap::new(),
            }),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ConnectionState> {
        self.state.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ConnectionState> {
        self.state.write()
    }
}

impl ConnectionState {
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Closes the connection and discards its subscriptions. Terminal.
    pub fn close(&mut self) {
        self.open = false;
        self.subscriptions.clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn add_subscription(&mut self, subscription: Subscription) {
        self.subscriptions.insert(subscription.id, subscription);
    }

    pub fn remove_subscription(&mut self, subscription_id: u64) -> Option<Subscription> {
        self.subscriptions.remove(&subscription_id)
    }

    pub fn subscription_for(&self, subscription_id: u64) -> Result<&Subscription, InvalidSubscription> {
        self.subscriptions
            .get(&subscription_id)
            .ok_or(InvalidSubscription { subscription_id })
    }

    pub fn subscription_for_mut(
        &mut self,
        subscription_id: u64,
    ) -> Result<&mut Subscription, InvalidSubscription> {
        self.subscriptions
            .get_mut(&subscription_id)
            .ok_or(InvalidSubscription { subscription_id })
    }

    pub fn subscriptions_full(&self) -> bool {
        self.subscriptions.len() >= self.options.subscription_max_count as usize
    }

    /// Length is counted in UTF-16 code units, as clients measure it.
    pub fn subscription_too_long(&self, expr: &str) -> bool {
        expr.encode_utf16().count() > self.options.subscription_max_length as usize
    }

    pub fn connection_keys_full(&self, notification_keys: &Keys, subscription_keys: &Keys) -> bool {
        let max_keys = self.options.connection_max_keys as usize;

        notification_keys.len() > max_keys || subscription_keys.len() > max_keys
    }

    pub fn subscription_keys_full(&self, keys: &Keys) -> bool {
        keys.len() > self.options.subscription_max_keys as usize
    }

    /// Matches a notification against every subscription.
    ///
    /// `global_keys` are the producer keys that apply to the whole
    /// notification, `message_keys` the ones attached to it. A subscription
    /// matches securely when either its own keys or the connection's
    /// subscription keys match either producer set. Otherwise it can only
    /// match when both sides allow insecure delivery.
    pub fn match_subscriptions(
        &self,
        attributes: &Attributes,
        global_keys: &Keys,
        message_keys: &Keys,
        deliver_insecure: bool,
    ) -> SubscriptionMatch {
        let mut matches = SubscriptionMatch::default();

        for subscription in self.subscriptions.values() {
            let secure = self.subscription_keys.matches(global_keys)
                || self.subscription_keys.matches(message_keys)
                || subscription.keys.matches(global_keys)
                || subscription.keys.matches(message_keys);

            if (secure || (deliver_insecure && subscription.accept_insecure))
                && subscription.matches(attributes)
            {
                if secure {
                    matches.secure.push(subscription.id);
                } else {
                    matches.insecure.push(subscription.id);
                }
            }
        }

        matches
    }
}
