use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::expiring_cache::options::{CacheOptions, DEFAULT_BUFFER, DEFAULT_SWEEP_INTERVAL};

pub const DEFAULT_DOMAIN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_VISITOR_TTL: Duration = Duration::from_secs(20 * 60);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
}

/// Whether activity on a known domain extends how long the domain is tracked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DomainPolicy {
    /// A domain is forgotten one domain TTL after it was first seen.
    Fixed,
    /// Every touch restarts the domain TTL.
    #[default]
    KeepAlive,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Counts distinct visitors per domain over a sliding window")]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "IPNOTES_LISTEN", default_value = "0.0.0.0:7711")]
    pub listen: SocketAddr,

    /// How long a domain stays tracked, in seconds
    #[arg(long, env = "IPNOTES_DOMAIN_TTL_SECS", default_value_t = DEFAULT_DOMAIN_TTL.as_secs())]
    pub domain_ttl_secs: u64,

    /// How long an IP counts as present for a domain, in seconds
    #[arg(long, env = "IPNOTES_VISITOR_TTL_SECS", default_value_t = DEFAULT_VISITOR_TTL.as_secs())]
    pub visitor_ttl_secs: u64,

    /// Period of the background sweep of expired entries, in seconds
    #[arg(long, env = "IPNOTES_SWEEP_INTERVAL_SECS", default_value_t = DEFAULT_SWEEP_INTERVAL.as_secs())]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "IPNOTES_DOMAIN_POLICY", value_enum, default_value_t = DomainPolicy::KeepAlive)]
    pub domain_policy: DomainPolicy,

    /// Command channel capacity of every cache task
    #[arg(long, env = "IPNOTES_CHANNEL_BUFFER", default_value_t = DEFAULT_BUFFER)]
    pub channel_buffer: usize,

    /// Log level, overridden by RUST_LOG
    #[arg(long, env = "IPNOTES_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("domain-ttl-secs", self.domain_ttl_secs),
            ("visitor-ttl-secs", self.visitor_ttl_secs),
            ("sweep-interval-secs", self.sweep_interval_secs),
            ("channel-buffer", self.channel_buffer as u64),
        ];
        match checks.into_iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(ConfigError::ZeroValue { field }),
            None => Ok(()),
        }
    }

    pub fn counter_config(&self) -> CounterConfig {
        CounterConfig {
            domain_ttl: Duration::from_secs(self.domain_ttl_secs),
            visitor_ttl: Duration::from_secs(self.visitor_ttl_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            buffer: self.channel_buffer,
            domain_policy: self.domain_policy,
        }
    }
}

/// Settings of a [`VisitorCounter`](crate::counter::visitor::VisitorCounter).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterConfig {
    pub domain_ttl: Duration,
    pub visitor_ttl: Duration,
    pub sweep_interval: Duration,
    pub buffer: usize,
    pub domain_policy: DomainPolicy,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            domain_ttl: DEFAULT_DOMAIN_TTL,
            visitor_ttl: DEFAULT_VISITOR_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            buffer: DEFAULT_BUFFER,
            domain_policy: DomainPolicy::default(),
        }
    }
}

impl CounterConfig {
    pub fn domain_options(&self) -> CacheOptions {
        CacheOptions::new(self.domain_ttl)
            .sweep_interval(self.sweep_interval)
            .buffer(self.buffer)
    }

    pub fn visitor_options(&self) -> CacheOptions {
        CacheOptions::new(self.visitor_ttl)
            .sweep_interval(self.sweep_interval)
            .buffer(self.buffer)
    }
}
