// Destination address resolution with a time-based cache.
// Invariants: resolution never errors out of this module; an unresolved destination simply yields None.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::app::DestinationSpec;

/// Name-to-address lookup used by the resolver.
#[allow(async_fn_in_trait)]
pub trait HostLookup {
    async fn lookup(&self, host: &str, port: u16) -> Option<IpAddr>;
}

/// System resolver. IP literals short-circuit; IPv4 answers are preferred
/// since the outbound socket is IPv4.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLookup;

impl HostLookup for SystemLookup {
    async fn lookup(&self, host: &str, port: u16) -> Option<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }
        match tokio::net::lookup_host((host, port)).await {
            Ok(addrs) => {
                let addrs: Vec<SocketAddr> = addrs.collect();
                addrs
                    .iter()
                    .find(|addr| addr.is_ipv4())
                    .or_else(|| addrs.first())
                    .map(|addr| addr.ip())
            }
            Err(err) => {
                debug!(?err, host, "host lookup failed");
                None
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Destination {
    spec: DestinationSpec,
    resolved: Option<IpAddr>,
    last_resolve: Option<Instant>,
}

impl Destination {
    pub fn new(spec: DestinationSpec) -> Self {
        Self {
            spec,
            resolved: None,
            last_resolve: None,
        }
    }

    pub fn resolved(&self) -> Option<IpAddr> {
        self.resolved
    }

    /// Returns the cached address while it is younger than `interval`,
    /// otherwise resolves again. A failed lookup clears the cache, so the
    /// next call retries.
    pub async fn resolve<L: HostLookup>(
        &mut self,
        lookup: &L,
        interval: Duration,
        now: Instant,
    ) -> Option<SocketAddr> {
        let stale = match (self.resolved, self.last_resolve) {
            (Some(_), Some(at)) => now.saturating_duration_since(at) > interval,
            _ => true,
        };
        if stale {
            self.resolved = lookup.lookup(&self.spec.host, self.spec.port).await;
            self.last_resolve = Some(now);
            match self.resolved {
                Some(ip) => debug!(destination = %self.spec, %ip, "destination resolved"),
                None => debug!(destination = %self.spec, "destination unresolved"),
            }
        }
        self.resolved.map(|ip| SocketAddr::new(ip, self.spec.port))
    }
}
