//! Share inventory enriched with live metric values
//!
//! Every listing is rebuilt from the providers; nothing is cached and the
//! poller's detector windows are never consulted.

use crate::models::{DimensionFilter, MetricKind, ShareInfo, ShareTarget};
use crate::sources::{InventoryError, InventorySource, MetricsSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Joins provider quotas with the latest metric values per monitored share
#[derive(Clone)]
pub struct InventoryView {
    inventory: Arc<dyn InventorySource>,
    metrics: Arc<dyn MetricsSource>,
    targets: Arc<[ShareTarget]>,
}

impl InventoryView {
    pub fn new(
        inventory: Arc<dyn InventorySource>,
        metrics: Arc<dyn MetricsSource>,
        targets: impl Into<Arc<[ShareTarget]>>,
    ) -> Self {
        Self {
            inventory,
            metrics,
            targets: targets.into(),
        }
    }

    pub fn targets(&self) -> &[ShareTarget] {
        &self.targets
    }

    /// One record per monitored share
    ///
    /// Fails only when the inventory itself cannot be listed. A share
    /// missing from the inventory gets quota 0 and a metric that cannot
    /// be fetched reads as 0.
    pub async fn shares(&self) -> Result<Vec<ShareInfo>, InventoryError> {
        let quotas: HashMap<String, i32> = self
            .inventory
            .list()
            .await?
            .into_iter()
            .map(|share| (share.name, share.quota_gb))
            .collect();

        let mut records = Vec::with_capacity(self.targets.len());
        for target in self.targets.iter() {
            let quota = quotas.get(&target.name).copied().unwrap_or(0);
            let mut info = ShareInfo::new(&target.name, quota);
            let filter = DimensionFilter::share(&target.name);

            for kind in MetricKind::ALL {
                match self
                    .metrics
                    .get_metric(&target.resource_id, kind, &filter)
                    .await
                {
                    Ok(sample) => info.set_metric(kind, sample.value),
                    Err(e) => {
                        debug!(share = %target.name, metric = %kind, error = %e, "Metric unavailable");
                    }
                }
            }

            records.push(info);
        }

        Ok(records)
    }
}
