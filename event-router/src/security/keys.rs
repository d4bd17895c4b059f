use super::key::{Key, KeyError, KeyScheme, Role};
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Debug, PartialEq, Eq)]
enum KeySet {
    Single(HashSet<Key>),
    Dual {
        producer: HashSet<Key>,
        consumer: HashSet<Key>,
    },
}

impl KeySet {
    fn empty_for(scheme: KeyScheme) -> Self {
        if scheme.is_dual() {
            KeySet::Dual {
                producer: HashSet::new(),
                consumer: HashSet::new(),
            }
        } else {
            KeySet::Single(HashSet::new())
        }
    }

    fn len(&self) -> usize {
        match self {
            KeySet::Single(keys) => keys.len(),
            KeySet::Dual { producer, consumer } => producer.len() + consumer.len(),
        }
    }

    fn add_all(&mut self, other: &KeySet) {
        match (self, other) {
            (KeySet::Single(keys), KeySet::Single(more)) => keys.extend(more.iter().cloned()),
            (
                KeySet::Dual { producer, consumer },
                KeySet::Dual {
                    producer: more_producer,
                    consumer: more_consumer,
                },
            ) => {
                producer.extend(more_producer.iter().cloned());
                consumer.extend(more_consumer.iter().cloned());
            }
            _ => {}
        }
    }

    fn remove_all(&mut self, other: &KeySet) {
        match (self, other) {
            (KeySet::Single(keys), KeySet::Single(less)) => keys.retain(|key| !less.contains(key)),
            (
                KeySet::Dual { producer, consumer },
                KeySet::Dual {
                    producer: less_producer,
                    consumer: less_consumer,
                },
            ) => {
                producer.retain(|key| !less_producer.contains(key));
                consumer.retain(|key| !less_consumer.contains(key));
            }
            _ => {}
        }
    }
}

/// A collection of key sets, one per scheme.
///
/// Empty sets are never stored, so two collections holding the same keys
/// compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Keys {
    sets: BTreeMap<KeyScheme, KeySet>,
}

impl Keys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of keys across all schemes.
    pub fn len(&self) -> usize {
        self.sets.values().map(KeySet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Adds a key to a single-set scheme.
    pub fn add(&mut self, scheme: KeyScheme, key: Key) -> Result<(), KeyError> {
        if scheme.is_dual() {
            return Err(KeyError::WrongScheme(scheme));
        }
        if let KeySet::Single(keys) = self
            .sets
            .entry(scheme)
            .or_insert_with(|| KeySet::empty_for(scheme))
        {
            keys.insert(key);
        }
        Ok(())
    }

    /// Adds a key to the producer or consumer half of the dual scheme.
    pub fn add_dual(&mut self, role: Role, key: Key) {
        if let KeySet::Dual { producer, consumer } = self
            .sets
            .entry(KeyScheme::Sha1Dual)
            .or_insert_with(|| KeySet::empty_for(KeyScheme::Sha1Dual))
        {
            match role {
                Role::Producer => producer.insert(key),
                Role::Consumer => consumer.insert(key),
            };
        }
    }

    /// Removes a key from whichever set of `scheme` holds it.
    pub fn remove(&mut self, scheme: KeyScheme, key: &Key) {
        if let Some(set) = self.sets.get_mut(&scheme) {
            match set {
                KeySet::Single(keys) => {
                    keys.remove(key);
                }
                KeySet::Dual { producer, consumer } => {
                    producer.remove(key);
                    consumer.remove(key);
                }
            }
        }
        self.prune();
    }

    /// Adds every key of `other`.
    pub fn add_all(&mut self, other: &Keys) {
        for (scheme, set) in &other.sets {
            self.sets
                .entry(*scheme)
                .or_insert_with(|| KeySet::empty_for(*scheme))
                .add_all(set);
        }
        self.prune();
    }

    /// Removes every key of `other`.
    pub fn remove_all(&mut self, other: &Keys) {
        for (scheme, set) in &other.sets {
            if let Some(existing) = self.sets.get_mut(scheme) {
                existing.remove_all(set);
            }
        }
        self.prune();
    }

    /// This collection with `to_add` added and then `to_remove` removed.
    pub fn delta(&self, to_add: &Keys, to_remove: &Keys) -> Keys {
        let mut keys = self.clone();
        keys.add_all(to_add);
        keys.remove_all(to_remove);
        keys
    }

    /// The union of this collection and `other`.
    pub fn added_to(&self, other: &Keys) -> Keys {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut keys = self.clone();
        keys.add_all(other);
        keys
    }

    /// Replaces the private keys used by `role` with their public keys.
    pub fn hash_private_keys_for_role(&mut self, role: Role) {
        for (scheme, set) in self.sets.iter_mut() {
            if !scheme.hashes_role(role) {
                continue;
            }
            match set {
                KeySet::Single(keys) => hash_keys(keys),
                KeySet::Dual { producer, consumer } => match role {
                    Role::Producer => hash_keys(producer),
                    Role::Consumer => hash_keys(consumer),
                },
            }
        }
    }

    /// True if a consumer holding these keys may receive a notification
    /// sent with `producer_keys`. Both collections hold public keys.
    pub fn matches(&self, producer_keys: &Keys) -> bool {
        if self.is_empty() || producer_keys.is_empty() {
            return false;
        }

        producer_keys.sets.iter().any(|(scheme, producer_set)| {
            self.sets
                .get(scheme)
                .is_some_and(|consumer_set| sets_match(producer_set, consumer_set))
        })
    }

    fn prune(&mut self) {
        self.sets.retain(|_, set| set.len() > 0);
    }
}

fn hash_keys(keys: &mut HashSet<Key>) {
    *keys = keys.iter().map(Key::public_key).collect();
}

fn sets_match(producer_set: &KeySet, consumer_set: &KeySet) -> bool {
    match (producer_set, consumer_set) {
        (KeySet::Single(producer), KeySet::Single(consumer)) => {
            !producer.is_disjoint(consumer)
        }
        (
            KeySet::Dual {
                producer: producer_producer,
                consumer: producer_consumer,
            },
            KeySet::Dual {
                producer: consumer_producer,
                consumer: consumer_consumer,
            },
        ) => {
            !producer_producer.is_disjoint(consumer_producer)
                && !consumer_consumer.is_disjoint(producer_consumer)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> Key {
        Key::from_password(text).unwrap()
    }

    fn single(scheme: KeyScheme, keys: &[Key]) -> Keys {
        let mut collection = Keys::new();
        for k in keys {
            collection.add(scheme, k.clone()).unwrap();
        }
        collection
    }

    #[test]
    fn producer_scheme_verifies_the_producer() {
        let alice = key("alice private");
        let mut notification = single(KeyScheme::Sha1Producer, &[alice.clone()]);
        let mut subscription = single(KeyScheme::Sha1Producer, &[alice.public_key()]);

        notification.hash_private_keys_for_role(Role::Producer);
        subscription.hash_private_keys_for_role(Role::Consumer);

        assert!(subscription.matches(&notification));
        assert!(!subscription.matches(&single(KeyScheme::Sha1Producer, &[key("mallory")])));
    }

    #[test]
    fn consumer_scheme_verifies_the_consumer() {
        let bob = key("bob private");
        let mut notification = single(KeyScheme::Sha1Consumer, &[bob.public_key()]);
        let mut subscription = single(KeyScheme::Sha1Consumer, &[bob]);

        notification.hash_private_keys_for_role(Role::Producer);
        subscription.hash_private_keys_for_role(Role::Consumer);

        assert!(subscription.matches(&notification));
    }

    #[test]
    fn dual_scheme_needs_both_halves() {
        let alice = key("alice");
        let bob = key("bob");

        let mut notification = Keys::new();
        notification.add_dual(Role::Producer, alice.clone());
        notification.add_dual(Role::Consumer, bob.public_key());
        notification.hash_private_keys_for_role(Role::Producer);

        let mut subscription = Keys::new();
        subscription.add_dual(Role::Producer, alice.public_key());
        subscription.add_dual(Role::Consumer, bob.clone());
        subscription.hash_private_keys_for_role(Role::Consumer);

        assert!(subscription.matches(&notification));

        let mut half = Keys::new();
        half.add_dual(Role::Producer, alice.public_key());
        assert!(!half.matches(&notification));
    }

    #[test]
    fn empty_never_matches() {
        let keys = single(KeyScheme::Sha1Producer, &[key("k")]);

        assert!(!Keys::new().matches(&keys));
        assert!(!keys.matches(&Keys::new()));
    }

    #[test]
    fn different_schemes_do_not_match() {
        let shared = key("shared");
        let producer = single(KeyScheme::Sha1Producer, &[shared.clone()]);
        let consumer = single(KeyScheme::Sha1Consumer, &[shared]);

        assert!(!consumer.matches(&producer));
    }

    #[test]
    fn delta_and_union() {
        let a = key("a");
        let b = key("b");
        let base = single(KeyScheme::Sha1Producer, &[a.clone()]);

        let changed = base.delta(
            &single(KeyScheme::Sha1Producer, &[b.clone()]),
            &single(KeyScheme::Sha1Producer, &[a.clone()]),
        );
        assert_eq!(changed, single(KeyScheme::Sha1Producer, &[b.clone()]));

        let emptied = base.delta(&Keys::new(), &base);
        assert!(emptied.is_empty());

        let union = base.added_to(&single(KeyScheme::Sha1Consumer, &[b]));
        assert_eq!(union.len(), 2);
        assert_eq!(base.added_to(&Keys::new()), base);
    }

    #[test]
    fn dual_scheme_is_rejected_for_single_add() {
        assert_eq!(
            Keys::new().add(KeyScheme::Sha1Dual, key("k")),
            Err(KeyError::WrongScheme(KeyScheme::Sha1Dual))
        );
    }
}
