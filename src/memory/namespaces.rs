//! Strategy namespace resolution.

use std::collections::BTreeMap;

use tracing::warn;

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::strategy::StrategyKind;
use crate::memory::provisioning::StoreHandle;

/// Map each configured strategy kind to its first namespace template.
///
/// Strategies without a namespace are skipped. When two strategies share a
/// kind, the first one listed wins.
///
/// # Errors
/// Returns an error if the strategies cannot be listed.
pub async fn try_namespaces(handle: &StoreHandle) -> MemoryResult<BTreeMap<StrategyKind, String>> {
    let strategies = handle
        .service()
        .list_strategies(handle.store_id().clone())
        .await?;

    let mut namespaces = BTreeMap::new();
    for strategy in strategies {
        if let Some(template) = strategy.primary_namespace() {
            namespaces
                .entry(strategy.kind)
                .or_insert_with(|| template.to_string());
        }
    }
    Ok(namespaces)
}

/// Same as [`try_namespaces`], but any failure yields an empty mapping.
///
/// Public fault-free entry point for callers that only need the mapping.
/// [`crate::memory::profile::ProfileAggregator`] calls [`try_namespaces`]
/// instead so it can report the fault alongside its fallback.
pub async fn namespaces_for(handle: &StoreHandle) -> BTreeMap<StrategyKind, String> {
    match try_namespaces(handle).await {
        Ok(namespaces) => namespaces,
        Err(err) => {
            warn!(store_id = %handle.store_id(), %err, "Resolving strategy namespaces failed");
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::ids::StoreId;
    use crate::memory::core::strategy::{StrategyConfig, default_strategies};
    use crate::memory::service::{InMemoryFaults, InMemoryMemoryService, StoreStatus};

    async fn handle_with(strategies: Vec<StrategyConfig>, faults: InMemoryFaults) -> StoreHandle {
        let service = InMemoryMemoryService::new().unwrap().with_faults(faults).shared();
        let id = StoreId::new("Market-ns00000001");
        service
            .insert_store(id.clone(), "Market", StoreStatus::Active, strategies)
            .await;
        StoreHandle::new(service, id)
    }

    #[tokio::test]
    async fn maps_kinds_to_templates() {
        let handle = handle_with(default_strategies(), InMemoryFaults::default()).await;
        let namespaces = namespaces_for(&handle).await;
        assert_eq!(namespaces.len(), 2);
        assert_eq!(
            namespaces[&StrategyKind::UserPreference],
            "market-trends/broker/{actorId}/preferences"
        );
        assert_eq!(
            namespaces[&StrategyKind::Semantic],
            "market-trends/broker/{actorId}/semantic"
        );
    }

    #[tokio::test]
    async fn strategies_without_namespace_are_skipped() {
        let mut bare = StrategyConfig::new(StrategyKind::Summary, "Summary", "none", "x");
        bare.namespaces.clear();
        let handle = handle_with(vec![bare], InMemoryFaults::default()).await;
        assert!(namespaces_for(&handle).await.is_empty());
    }

    #[tokio::test]
    async fn failure_yields_empty_mapping() {
        let handle = handle_with(
            default_strategies(),
            InMemoryFaults {
                list_strategies: true,
                ..InMemoryFaults::default()
            },
        )
        .await;
        assert!(try_namespaces(&handle).await.is_err());
        assert!(namespaces_for(&handle).await.is_empty());
    }
}
