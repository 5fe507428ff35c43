//! Versioned policy store.
//!
//! Readers load the current snapshot with a single atomic pointer read and
//! keep using it for the whole call; writers publish whole new snapshots.

use arc_swap::{ArcSwap, Guard};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster::ClusterPolicy;
use crate::error::PolicyError;

/// Immutable set of cluster policies at one version
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySnapshot {
    /// Snapshot version
    pub version: u64,
    /// Policies by service name
    pub services: HashMap<String, Arc<ClusterPolicy>>,
}

#[derive(Deserialize)]
struct PolicyDocument {
    version: u64,
    #[serde(default)]
    services: Vec<ClusterPolicy>,
}

impl PolicySnapshot {
    /// Build a snapshot from policies
    #[must_use]
    pub fn new(version: u64, policies: impl IntoIterator<Item = ClusterPolicy>) -> Self {
        let services = policies
            .into_iter()
            .map(|p| (p.service.clone(), Arc::new(p)))
            .collect();
        Self { version, services }
    }

    /// Parse `{"version": n, "services": [...]}` and validate every policy
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or a policy is invalid
    pub fn from_json_str(json: &str) -> Result<Self, PolicyError> {
        let document: PolicyDocument = serde_json::from_str(json)?;
        for policy in &document.services {
            policy.validate()?;
        }
        Ok(Self::new(document.version, document.services))
    }

    /// Policy for a service
    #[must_use]
    pub fn get(&self, service: &str) -> Option<Arc<ClusterPolicy>> {
        self.services.get(service).cloned()
    }

    /// Number of governed services
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no service is governed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Store publishing policy snapshots
pub struct PolicyStore {
    snapshot: ArcSwap<PolicySnapshot>,
}

impl PolicyStore {
    /// Create an empty store at version 0
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(PolicySnapshot::default()),
        }
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshot.load_full()
    }

    /// Current version
    #[must_use]
    pub fn version(&self) -> u64 {
        self.snapshot.load().version
    }

    /// Policy for a service in the current snapshot
    #[must_use]
    pub fn get(&self, service: &str) -> Option<Arc<ClusterPolicy>> {
        self.snapshot.load().get(service)
    }

    /// Replace the whole snapshot
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot version does not move forward
    pub fn publish(&self, snapshot: PolicySnapshot) -> Result<u64, PolicyError> {
        let next = Arc::new(snapshot);
        let mut current = self.snapshot.load_full();
        loop {
            if next.version <= current.version {
                return Err(PolicyError::StaleVersion {
                    current: current.version,
                    offered: next.version,
                });
            }
            let previous = self.snapshot.compare_and_swap(&current, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &current) {
                tracing::debug!(
                    version = next.version,
                    services = next.len(),
                    "published policy snapshot"
                );
                return Ok(next.version);
            }
            current = Guard::into_inner(previous);
        }
    }

    /// Insert or replace one service's policy, bumping the snapshot version
    ///
    /// # Errors
    ///
    /// Returns error if the policy is invalid
    pub fn update_service(&self, policy: ClusterPolicy) -> Result<u64, PolicyError> {
        policy.validate()?;
        let policy = Arc::new(policy);
        let updated = self.snapshot.rcu(|current| {
            let mut services = current.services.clone();
            services.insert(policy.service.clone(), Arc::clone(&policy));
            PolicySnapshot {
                version: current.version + 1,
                services,
            }
        });
        Ok(updated.version + 1)
    }

    /// Remove one service's policy, bumping the snapshot version
    ///
    /// Returns whether the service was governed.
    pub fn remove_service(&self, service: &str) -> bool {
        let previous = self.snapshot.rcu(|current| {
            let mut services = current.services.clone();
            services.remove(service);
            PolicySnapshot {
                version: current.version + 1,
                services,
            }
        });
        previous.services.contains_key(service)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}
