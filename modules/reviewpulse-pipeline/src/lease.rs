use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use reviewpulse_common::{Entity, ReviewPulseError, RunKind};

use crate::traits::ReviewStore;

/// Default age after which a lease is considered abandoned.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30 * 60);

/// Run `work` while holding the per-entity lease for `kind`.
///
/// Fails with [`ReviewPulseError::LeaseConflict`] without running `work` when
/// another runner holds a live lease. The lease is released whatever `work`
/// returns; a failed release is logged and left to expire.
pub async fn with_lease<T, Fut>(
    store: &dyn ReviewStore,
    entity: &Entity,
    kind: RunKind,
    ttl: Duration,
    work: Fut,
) -> Result<T, ReviewPulseError>
where
    Fut: Future<Output = Result<T, ReviewPulseError>>,
{
    if !store.try_acquire_lease(entity, kind, ttl).await? {
        info!(entity = entity.name.as_str(), %kind, "Lease held by another runner, skipping");
        return Err(ReviewPulseError::LeaseConflict {
            entity: entity.name.clone(),
            kind: kind.to_string(),
        });
    }

    let result = work.await;

    if let Err(e) = store.release_lease(entity, kind).await {
        warn!(entity = entity.name.as_str(), %kind, error = %e, "Failed to release lease");
    }

    result
}
