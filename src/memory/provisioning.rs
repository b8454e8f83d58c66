//! Shared store provisioning.
//!
//! Every agent process calls [`ensure_store`] at startup and must end up
//! with the same store identifier, even when several fresh deployments
//! start at once. Coordination happens only through the backing service:
//! list first, create if absent, and on a name conflict re-list to pick up
//! whichever caller won.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::memory::core::config::StoreConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::StoreId;
use crate::memory::service::{CreateStoreRequest, MemoryService, StoreStatus, StoreSummary};

/// Client plus resolved store identifier, threaded through every memory call.
#[derive(Clone)]
pub struct StoreHandle {
    service: Arc<dyn MemoryService>,
    store_id: StoreId,
}

impl StoreHandle {
    /// Pair a service with a known store.
    #[must_use]
    pub fn new(service: Arc<dyn MemoryService>, store_id: StoreId) -> Self {
        Self { service, store_id }
    }

    /// Backing service.
    #[must_use]
    pub fn service(&self) -> &dyn MemoryService {
        self.service.as_ref()
    }

    /// Resolved store identifier.
    #[must_use]
    pub const fn store_id(&self) -> &StoreId {
        &self.store_id
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("store_id", &self.store_id)
            .finish_non_exhaustive()
    }
}

/// Find or create the named store.
///
/// Listing failures are logged and treated as "not found".
///
/// # Errors
/// Returns an error if creation fails for any reason other than a name
/// conflict, if the new store fails or does not become active in time, or
/// if a conflict is reported but the store cannot be found afterwards.
pub async fn ensure_store(
    service: Arc<dyn MemoryService>,
    config: &StoreConfig,
) -> MemoryResult<StoreHandle> {
    if let Some(existing) = find_existing(service.as_ref(), &config.name).await {
        info!(store_id = %existing.id, "Using existing memory store");
        return Ok(StoreHandle::new(service, existing.id));
    }

    let request = CreateStoreRequest {
        name: config.name.clone(),
        description: config.description.clone(),
        strategies: config.strategies.clone(),
        event_expiry_days: config.event_expiry_days,
    };

    match service.create_store(request).await {
        Ok(created) => {
            info!(store_id = %created.id, "Created memory store");
            let store_id = wait_until_active(service.as_ref(), created, config).await?;
            Ok(StoreHandle::new(service, store_id))
        }
        Err(err) if err.is_already_exists() => {
            info!(name = %config.name, "Memory store created concurrently, re-listing");
            match find_existing(service.as_ref(), &config.name).await {
                Some(existing) => {
                    info!(store_id = %existing.id, "Recovered concurrently created memory store");
                    Ok(StoreHandle::new(service, existing.id))
                }
                None => {
                    error!(name = %config.name, "Memory store conflict but no store listed");
                    Err(MemoryError::Inconsistent {
                        name: config.name.clone(),
                    })
                }
            }
        }
        Err(err) => {
            error!(name = %config.name, %err, "Memory store creation failed");
            Err(err)
        }
    }
}

async fn find_existing(service: &dyn MemoryService, name: &str) -> Option<StoreSummary> {
    let stores = match service.list_stores().await {
        Ok(stores) => stores,
        Err(err) => {
            warn!(%err, "Listing memory stores failed; treating as not found");
            return None;
        }
    };

    let mut matching: Vec<StoreSummary> =
        stores.into_iter().filter(|s| s.matches_name(name)).collect();
    if matching.len() > 1 {
        warn!(count = matching.len(), "Several memory stores share the name");
    }
    let active = matching.iter().position(|s| s.status == StoreStatus::Active);
    match active {
        Some(index) => Some(matching.swap_remove(index)),
        None => matching.into_iter().next(),
    }
}

async fn wait_until_active(
    service: &dyn MemoryService,
    created: StoreSummary,
    config: &StoreConfig,
) -> MemoryResult<StoreId> {
    let waited = config.creation_timeout();
    let id = created.id.to_string();
    tokio::time::timeout(waited, poll_until_active(service, created, config))
        .await
        .map_err(|_| {
            error!(store_id = %id, ?waited, "Memory store did not become active");
            MemoryError::CreationTimeout { id, waited }
        })?
}

async fn poll_until_active(
    service: &dyn MemoryService,
    mut current: StoreSummary,
    config: &StoreConfig,
) -> MemoryResult<StoreId> {
    loop {
        match current.status {
            StoreStatus::Active => return Ok(current.id),
            StoreStatus::Failed => {
                return Err(MemoryError::StoreFailed {
                    id: current.id.to_string(),
                    reason: current
                        .failure_reason
                        .unwrap_or_else(|| "no reason reported".to_string()),
                });
            }
            StoreStatus::Creating => {
                debug!(store_id = %current.id, "Waiting for memory store");
                tokio::time::sleep(config.poll_interval()).await;
                current = service.get_store(current.id.clone()).await?;
            }
        }
    }
}

/// Outcome of [`prune_duplicate_stores`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Store that was kept, if any matched.
    pub kept: Option<StoreId>,
    /// Stores deleted.
    pub deleted: Vec<StoreId>,
    /// Stores whose deletion failed, with the reason.
    pub failed: Vec<(StoreId, String)>,
}

/// Delete all but one store carrying `name`, keeping the first active one.
///
/// Nothing is deleted when no matching store is active. Individual delete
/// failures are logged and reported, not returned as errors.
///
/// # Errors
/// Returns an error if the stores cannot be listed.
pub async fn prune_duplicate_stores(
    service: &dyn MemoryService,
    name: &str,
) -> MemoryResult<PruneReport> {
    let matching: Vec<StoreSummary> = service
        .list_stores()
        .await?
        .into_iter()
        .filter(|s| s.matches_name(name))
        .collect();

    if matching.len() <= 1 {
        debug!(count = matching.len(), "No duplicate memory stores");
        return Ok(PruneReport {
            kept: matching.into_iter().next().map(|s| s.id),
            ..PruneReport::default()
        });
    }

    let Some(keep) = matching
        .iter()
        .find(|s| s.status == StoreStatus::Active)
        .map(|s| s.id.clone())
    else {
        warn!(count = matching.len(), "Duplicate memory stores but none active; leaving them");
        return Ok(PruneReport::default());
    };

    info!(store_id = %keep, count = matching.len(), "Pruning duplicate memory stores");
    let mut report = PruneReport {
        kept: Some(keep.clone()),
        ..PruneReport::default()
    };
    for store in matching.into_iter().filter(|s| s.id != keep) {
        match service.delete_store(store.id.clone()).await {
            Ok(()) => report.deleted.push(store.id),
            Err(err) => {
                warn!(store_id = %store.id, %err, "Deleting duplicate memory store failed");
                report.failed.push((store.id, err.to_string()));
            }
        }
    }
    Ok(report)
}
