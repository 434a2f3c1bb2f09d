use std::time::Duration;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_BUFFER: usize = 1024;

/// Construction parameters of an [`ExpiringMap`](super::hm::ExpiringMap).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheOptions {
    /// Lifetime given to an entry on every write unless the write overrides it.
    pub ttl: Duration,
    /// Period of the background sweep.
    pub sweep_interval: Duration,
    /// Capacity of the command channel.
    pub buffer: usize,
}

impl CacheOptions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            buffer: DEFAULT_BUFFER,
        }
    }

    pub fn sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }
}
