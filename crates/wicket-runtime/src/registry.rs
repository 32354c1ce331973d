use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::bundle::BundleKind;

/// Identity of one widget invocation.
///
/// Used as the staged file stem and, for Python bundles, as the module name,
/// so it is always a valid identifier: `widget_<counter>_<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvocationId(String);

impl InvocationId {
    fn generate(counter: u64) -> Self {
        Self(format!("widget_{counter}_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Wrap an existing identifier. Only meant for tests and tooling.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the registry knows about an in-flight invocation.
#[derive(Debug, Clone)]
pub struct InvocationInfo {
    pub id: InvocationId,
    pub kind: BundleKind,
    /// SHA-256 of the bundle source.
    pub digest: String,
    pub started_at: DateTime<Utc>,
}

/// Process-wide table of in-flight invocations.
///
/// Entries are only created through [`InvocationRegistry::acquire`], which
/// hands out a fresh identity, and removed when the returned
/// [`InvocationLease`] is dropped.
#[derive(Debug, Default)]
pub struct InvocationRegistry {
    counter: AtomicU64,
    active: Mutex<HashMap<InvocationId, InvocationInfo>>,
}

impl InvocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(self: &Arc<Self>, kind: BundleKind, digest: String) -> InvocationLease {
        let mut active = self.lock();
        let id = loop {
            let candidate = InvocationId::generate(self.counter.fetch_add(1, Ordering::Relaxed) + 1);
            if !active.contains_key(&candidate) {
                break candidate;
            }
        };
        active.insert(
            id.clone(),
            InvocationInfo {
                id: id.clone(),
                kind,
                digest,
                started_at: Utc::now(),
            },
        );
        drop(active);

        InvocationLease {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Snapshot of the invocations currently running.
    pub fn active(&self) -> Vec<InvocationInfo> {
        self.lock().values().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    pub fn contains(&self, id: &InvocationId) -> bool {
        self.lock().contains_key(id)
    }

    fn release(&self, id: &InvocationId) {
        self.lock().remove(id);
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<InvocationId, InvocationInfo>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ownership of one registry entry. Dropping it releases the identity.
#[derive(Debug)]
pub struct InvocationLease {
    registry: Arc<InvocationRegistry>,
    id: InvocationId,
}

impl InvocationLease {
    pub fn id(&self) -> &InvocationId {
        &self.id
    }
}

impl Drop for InvocationLease {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}
