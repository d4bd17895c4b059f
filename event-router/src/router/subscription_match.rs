/// Subscription ids of one connection matched by one notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionMatch {
    pub secure: Vec<u64>,
    pub insecure: Vec<u64>,
}

impl SubscriptionMatch {
    pub fn matched(&self) -> bool {
        !self.secure.is_empty() || !self.insecure.is_empty()
    }
}
