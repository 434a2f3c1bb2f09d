use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValueEx<V> {
    pub val: V,
    pub expiration: Instant,
}

impl<V> ValueEx<V> {
    pub fn new(val: V, ttl: Duration) -> Self {
        Self {
            val,
            expiration: Instant::now() + ttl,
        }
    }

    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expiration
    }
}
