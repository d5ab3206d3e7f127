//! Service lookup index built from parsed proxy routes.

use std::collections::HashMap;

use crate::models::{ProxyRouteEntry, ServiceKey, Workload};

/// Maps `(service, namespace)` to the comma-joined access paths that route
/// to it.
///
/// Built once per parse batch and read-only afterwards. Repeated keys are
/// appended in insertion order without deduplication.
#[derive(Debug, Clone, Default)]
pub struct ServiceLookupIndex {
    entries: HashMap<ServiceKey, String>,
}

impl ServiceLookupIndex {
    pub fn build<'a>(routes: impl IntoIterator<Item = &'a ProxyRouteEntry>) -> Self {
        let mut entries: HashMap<ServiceKey, String> = HashMap::new();
        for route in routes {
            let key = ServiceKey::new(&route.target_service, &route.target_namespace);
            let value = route.access_path();
            entries
                .entry(key)
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        Self { entries }
    }

    /// Access paths for a service, or `""` when nothing routes to it.
    pub fn lookup(&self, service: &str, namespace: &str) -> &str {
        self.entries
            .get(&ServiceKey::new(service, namespace))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All keys and values, sorted by key for stable display.
    pub fn sorted_entries(&self) -> Vec<(&ServiceKey, &str)> {
        let mut all: Vec<_> = self.entries.iter().map(|(k, v)| (k, v.as_str())).collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }
}

/// Fill in each workload's `access_path` from the index.
pub fn annotate_workloads(index: &ServiceLookupIndex, workloads: &mut [Workload]) {
    for workload in workloads {
        workload.access_path = index.lookup(&workload.name, &workload.namespace).to_string();
    }
}
