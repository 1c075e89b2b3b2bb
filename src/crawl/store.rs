// src/crawl/store.rs
// =============================================================================
// The directory of qualifying servers, keyed by host.
//
// Every worker writes here, so the map sits behind a Mutex. The map itself
// has no order; `snapshot()` sorts by host every time it is called.
// =============================================================================

use super::address::Address;
use super::filters::Software;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

// One row of the output directory
//
// Serialized in camelCase because that is what the published JSON files
// have always looked like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub url: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub icon: Option<String>,
    pub software: Software,
    pub registration_mode: String,
}

impl Instance {
    pub fn new(
        address: &Address,
        software: Software,
        description: Option<String>,
        icon: Option<String>,
        registration_mode: String,
    ) -> Self {
        Self {
            url: address.to_string(),
            host: address.host(),
            description: description.filter(|d| !d.trim().is_empty()),
            icon: icon.filter(|i| !i.trim().is_empty()),
            software,
            registration_mode,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResultStore {
    instances: Mutex<HashMap<String, Instance>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instance>> {
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Inserts or replaces the record for `instance.host`
    //
    // Returns: true if the host was not in the store before
    pub fn upsert(&self, instance: Instance) -> bool {
        self.lock()
            .insert(instance.host.clone(), instance)
            .is_none()
    }

    // Every record, sorted ascending by host
    pub fn snapshot(&self) -> Vec<Instance> {
        let mut rows: Vec<Instance> = self.lock().values().cloned().collect();
        rows.sort_by(|a, b| a.host.cmp(&b.host));
        rows
    }
}
