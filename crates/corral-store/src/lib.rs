// Capability seams over the upstream policy and resource sources.
//
// The authorization cache only ever talks to these traits. Deployments back
// them with whatever feeds their control plane; the in-memory stores here
// back the tests and the demo.
use async_trait::async_trait;
use corral_common::{ClusterSet, labels::LabelSelector};
use corral_rbac::{Role, RoleBinding};

mod memory;

pub use memory::{MemoryClusterSetStore, MemoryPolicyStore};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Temporary failure reading from the source; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("internal store error: {0}")]
    Internal(String),
}

/// Read access to roles and role bindings, plus a change signal.
///
/// `revision` must increase on every role or binding mutation; the cache
/// compares revisions between sync ticks to decide whether to rebuild.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Snapshot of all current role bindings.
    async fn role_bindings(&self) -> Result<Vec<RoleBinding>>;

    /// Look up a role by name.
    async fn role(&self, name: &str) -> Result<Option<Role>>;

    /// Monotonic counter bumped on every mutation.
    fn revision(&self) -> u64;

    /// Whether the store has completed its initial load.
    fn has_synced(&self) -> bool;
}

/// Read access to the cluster-set resources the cache filters.
#[async_trait]
pub trait ClusterSetStore: Send + Sync {
    /// Fetch one cluster set by name.
    async fn get(&self, name: &str) -> Result<Option<ClusterSet>>;

    /// List cluster sets whose labels satisfy the selector.
    async fn list(&self, selector: &LabelSelector) -> Result<Vec<ClusterSet>>;

    /// Monotonic counter bumped on every mutation.
    fn revision(&self) -> u64;

    /// Whether the store has completed its initial load.
    fn has_synced(&self) -> bool;
}
