use tracing::{debug, trace};

use crate::config::{CounterConfig, DomainPolicy};
use crate::expiring_cache::error::ExpiringCacheError;
use crate::expiring_cache::hm::ExpiringMap;
use crate::expiring_cache::options::CacheOptions;

/// IPs recently seen on one domain. The value is only a presence marker.
pub type VisitorSet = ExpiringMap<String, ()>;

/// Every tracked domain, owning its [`VisitorSet`].
pub type DomainRegistry = ExpiringMap<String, VisitorSet>;

/// Counts distinct visitor IPs per domain over a sliding window.
///
/// Cloning yields another handle onto the same registry.
#[derive(Debug, Clone)]
pub struct VisitorCounter {
    domains: DomainRegistry,
    visitor_options: CacheOptions,
    refresh_domains: bool,
}

impl Default for VisitorCounter {
    fn default() -> Self {
        Self::new(CounterConfig::default())
    }
}

impl VisitorCounter {
    /// Builds a counter and starts the registry's sweep. Must be called
    /// within a tokio runtime.
    pub fn new(config: CounterConfig) -> Self {
        // A domain leaving the registry takes its visitor set down with it.
        let domains = DomainRegistry::with_eviction_hook(
            config.domain_options(),
            |domain: String, visitors: VisitorSet| {
                debug!(%domain, "domain expired");
                visitors.shutdown();
            },
        );

        Self {
            domains,
            visitor_options: config.visitor_options(),
            refresh_domains: config.domain_policy == DomainPolicy::KeepAlive,
        }
    }

    /// Records `ip` as a visitor of `domain` and returns the number of
    /// distinct visitors currently live for it.
    pub async fn touch(&self, domain: &str, ip: &str) -> Result<usize, ExpiringCacheError> {
        match self.record(domain, ip).await {
            // The visitor set stopped after the registry handed it out.
            // Drop it unless someone already replaced it, then resolve again.
            Err(ExpiringCacheError::Send | ExpiringCacheError::Receive) => {
                debug!(%domain, "visitor set closed during touch, retrying");
                self.domains
                    .remove_if(domain.to_owned(), |visitors: &VisitorSet| visitors.is_closed())
                    .await?;
                self.record(domain, ip).await
            }
            res => res,
        }
    }

    /// Number of live visitors of `domain`, or `None` if the domain is not
    /// tracked. Never creates or refreshes anything.
    pub async fn peek(&self, domain: &str) -> Result<Option<usize>, ExpiringCacheError> {
        let Some(visitors) = self.domains.get(domain.to_owned()).await? else {
            return Ok(None);
        };
        match visitors.len().await {
            Ok(count) => Ok(Some(count)),
            Err(_) => Ok(None),
        }
    }

    /// Number of tracked domains.
    pub async fn domains(&self) -> Result<usize, ExpiringCacheError> {
        self.domains.len().await
    }

    async fn record(&self, domain: &str, ip: &str) -> Result<usize, ExpiringCacheError> {
        let visitors = self.visitors_of(domain).await?;
        if visitors.set(ip.to_owned(), (), None).await? {
            trace!(%domain, %ip, "new visitor");
        }
        visitors.len().await
    }

    pub(crate) async fn visitors_of(&self, domain: &str) -> Result<VisitorSet, ExpiringCacheError> {
        let options = self.visitor_options;
        let owned = domain.to_owned();
        self.domains
            .get_or_insert_with(domain.to_owned(), self.refresh_domains, move || {
                debug!(domain = %owned, "tracking new domain");
                VisitorSet::new(options)
            })
            .await
    }
}
