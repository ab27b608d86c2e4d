//! Corporate directory lookups: UPN → deliverable mail address.

pub mod graph;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

/// Upper bound on in-flight directory lookups for one request.
pub const MAX_CONCURRENT_RESOLUTIONS: usize = 5;

#[async_trait]
pub trait DirectoryResolver: Send + Sync {
    /// Resolve one UPN. Fails on unknown identifiers.
    async fn address_for_upn(&self, upn: &str) -> anyhow::Result<String>;
}

/// How a batch resolution treats individual failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Abort on the first failure (approver notification).
    Strict,
    /// Skip failed entries (informational listings).
    BestEffort,
}

/// Resolve a batch of UPNs with bounded concurrency, preserving input order.
///
/// Under `Strict` the first failure is returned. Under `BestEffort` a failed
/// entry yields `None` and is logged at debug level.
pub async fn resolve_addresses(
    resolver: &dyn DirectoryResolver,
    upns: &[String],
    policy: ResolutionPolicy,
) -> anyhow::Result<Vec<Option<String>>> {
    let mut lookups = stream::iter(upns.iter().cloned())
        .map(|upn| async move {
            let result = resolver.address_for_upn(&upn).await;
            (upn, result)
        })
        .buffered(MAX_CONCURRENT_RESOLUTIONS);

    let mut resolved = Vec::with_capacity(upns.len());
    while let Some((upn, result)) = lookups.next().await {
        match (result, policy) {
            (Ok(address), _) => resolved.push(Some(address)),
            (Err(e), ResolutionPolicy::Strict) => {
                return Err(e.context(format!("could not resolve mail address for {}", upn)));
            }
            (Err(e), ResolutionPolicy::BestEffort) => {
                tracing::debug!(upn = %upn, error = %e, "skipping unresolvable directory entry");
                resolved.push(None);
            }
        }
    }
    Ok(resolved)
}
