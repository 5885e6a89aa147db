//! Registry for all collectors, keyed by authority identifier.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{CollectorId, CollectorMeta};
use crate::ports::Collector;

/// Read-only map from authority identifier to collector, built once at startup.
pub struct CollectorRegistry {
    collectors: HashMap<CollectorId, Arc<dyn Collector>>,
}

impl CollectorRegistry {
    /// Build a registry from the provided collectors. Later duplicates replace earlier ones.
    #[must_use]
    pub fn new(collectors: Vec<Arc<dyn Collector>>) -> Self {
        let collectors = collectors
            .into_iter()
            .map(|collector| (collector.id().clone(), collector))
            .collect();
        Self { collectors }
    }

    /// Metadata for all registered collectors, sorted by name.
    #[must_use]
    pub fn collectors(&self) -> Vec<CollectorMeta> {
        let mut metas: Vec<_> = self
            .collectors
            .values()
            .map(|collector| collector.meta().clone())
            .collect();
        metas.sort_by(|left, right| left.name.cmp(&right.name));
        metas
    }

    /// Look up a collector by identifier.
    #[must_use]
    pub fn collector(&self, id: &CollectorId) -> Option<&Arc<dyn Collector>> {
        self.collectors.get(id)
    }

    /// Whether a collector exists for the identifier.
    #[must_use]
    pub fn contains(&self, id: &CollectorId) -> bool {
        self.collectors.contains_key(id)
    }

    /// Number of registered collectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    /// Whether no collector is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}
