use crate::{ClusterSetStore, PolicyStore, Result};
use async_trait::async_trait;
use corral_common::{ClusterSet, labels::LabelSelector};
use corral_rbac::{Role, RoleBinding};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory policy source for tests, demos, and embedded deployments.
///
/// ```
/// use corral_rbac::{Role, Rule};
/// use corral_store::{MemoryPolicyStore, PolicyStore};
///
/// let store = MemoryPolicyStore::new();
/// let rt = tokio::runtime::Runtime::new().expect("rt");
/// rt.block_on(async {
///     store
///         .upsert_role(Role::new("viewer").with_rule(
///             Rule::new("fleet.corral.dev", "clustersets").with_verbs(["get"]),
///         ))
///         .await;
///     assert!(store.role("viewer").await.expect("role").is_some());
/// });
/// ```
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    // RwLock keeps snapshot reads cheap while mutations stay exclusive.
    roles: RwLock<HashMap<String, Role>>,
    bindings: RwLock<HashMap<String, RoleBinding>>,
    revision: AtomicU64,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_role(&self, role: Role) {
        self.roles.write().await.insert(role.name.clone(), role);
        self.bump();
    }

    pub async fn remove_role(&self, name: &str) {
        if self.roles.write().await.remove(name).is_some() {
            self.bump();
        }
    }

    pub async fn upsert_binding(&self, binding: RoleBinding) {
        self.bindings
            .write()
            .await
            .insert(binding.name.clone(), binding);
        self.bump();
    }

    pub async fn remove_binding(&self, name: &str) {
        if self.bindings.write().await.remove(name).is_some() {
            self.bump();
        }
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn role_bindings(&self) -> Result<Vec<RoleBinding>> {
        Ok(self.bindings.read().await.values().cloned().collect())
    }

    async fn role(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.roles.read().await.get(name).cloned())
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    fn has_synced(&self) -> bool {
        // Memory stores are authoritative from construction.
        true
    }
}

/// In-memory cluster-set source mirroring a lister-backed store.
#[derive(Debug, Default)]
pub struct MemoryClusterSetStore {
    inner: RwLock<HashMap<String, ClusterSet>>,
    revision: AtomicU64,
}

impl MemoryClusterSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, set: ClusterSet) {
        self.inner.write().await.insert(set.name.clone(), set);
        self.bump();
    }

    pub async fn remove(&self, name: &str) {
        if self.inner.write().await.remove(name).is_some() {
            self.bump();
        }
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClusterSetStore for MemoryClusterSetStore {
    async fn get(&self, name: &str) -> Result<Option<ClusterSet>> {
        Ok(self.inner.read().await.get(name).cloned())
    }

    async fn list(&self, selector: &LabelSelector) -> Result<Vec<ClusterSet>> {
        Ok(self
            .inner
            .read()
            .await
            .values()
            .filter(|set| selector.matches(&set.labels))
            .cloned()
            .collect())
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    fn has_synced(&self) -> bool {
        true
    }
}
