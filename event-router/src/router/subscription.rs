//! One client subscription and the generator of its ids.

use crate::security::{Keys, Role};
use crate::subscription::{parse_and_validate, Attributes, Node, ParseError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out subscription ids, unique for the lifetime of one router.
#[derive(Debug)]
pub struct SubscriptionIdGenerator {
    next: AtomicU64,
}

impl SubscriptionIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SubscriptionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: u64,
    pub expr: String,
    pub accept_insecure: bool,
    pub keys: Keys,
    ast: Node,
}

impl Subscription {
    /// Parses `expr` and hashes `keys` for the consumer role.
    pub fn new(
        id: u64,
        expr: &str,
        mut keys: Keys,
        accept_insecure: bool,
    ) -> Result<Self, ParseError> {
        let ast = parse_and_validate(expr)?;
        keys.hash_private_keys_for_role(Role::Consumer);

        Ok(Self {
            id,
            expr: expr.to_string(),
            accept_insecure,
            keys,
            ast,
        })
    }

    /// Replaces the expression. On a parse error the subscription is unchanged.
    pub fn update_expression(&mut self, expr: &str) -> Result<(), ParseError> {
        self.ast = parse_and_validate(expr)?;
        self.expr = expr.to_string();
        Ok(())
    }

    pub fn ast(&self) -> &Node {
        &self.ast
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        self.ast.matches(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::attributes;

    #[test]
    fn ids_start_at_one_and_increase() {
        let ids = SubscriptionIdGenerator::new();

        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
    }

    #[test]
    fn failed_update_keeps_old_expression() {
        let mut subscription = Subscription::new(1, "number == 1", Keys::new(), true).unwrap();

        assert!(subscription.update_expression("number ==").is_err());
        assert_eq!(subscription.expr, "number == 1");
        assert!(subscription.matches(&attributes([("number", 1)])));
    }

    #[test]
    fn rejects_constant_expression() {
        let err = Subscription::new(1, "1 == 1", Keys::new(), true).unwrap_err();

        assert!(err.is_trivial());
    }
}
