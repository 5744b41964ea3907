//! The authorization cache.
//!
//! This is the orchestrator between the upstream policy/resource stores and
//! the permission index. It keeps the hot read path (`list` / `get` /
//! index lookups) free of upstream I/O beyond lister-style reads, and it
//! converges eventually: a sync loop polls the store revision counters and
//! rebuilds the index when either moves.
//!
//! Failure mode philosophy
//! - Upstream read failures during a rebuild are non-fatal: the previous
//!   index stays authoritative, the revision cursor is not advanced, and
//!   the next tick retries.
//! - A single binding that cannot be interpreted (missing role, unhandled
//!   subject kind) is skipped with a log and never aborts the rebuild.
//! - Only the initial sync can fail `start`; everything later is retried.

use crate::config::CacheConfig;
use crate::event::MembershipChange;
use crate::index::PermissionIndex;
use crate::watch::{
    ClusterSetWatch, WatchOptions, WatchParts, WatchableCache, WatcherId, start_watch,
};
use async_trait::async_trait;
use corral_common::{ClusterSet, SubjectKind, UserInfo, labels::LabelSelector};
use corral_rbac::{NameGrant, Scope, TargetResource, granted_names};
use corral_store::{ClusterSetStore, PolicyStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::MissedTickBehavior;

const SYNC_POLL_SLICE: Duration = Duration::from_millis(50);

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("initial sync did not complete within {0:?}")]
    InitialSync(Duration),
    #[error("cache is stopped")]
    Stopped,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Permission-filtered cache over cluster sets.
///
/// One instance is parameterized over a single target resource tuple and a
/// single scope; a deployment that serves both view and admin callers runs
/// two instances. Clones share the same state.
pub struct AuthorizationCache<P, C> {
    inner: Arc<CacheInner<P, C>>,
}

impl<P, C> Clone for AuthorizationCache<P, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct CacheInner<P, C> {
    policy: Arc<P>,
    cluster_sets: Arc<C>,
    target: TargetResource,
    scope: Scope,
    config: CacheConfig,
    index: PermissionIndex,
    // Watch id -> membership notification sender.
    watchers: RwLock<HashMap<WatcherId, mpsc::Sender<MembershipChange>>>,
    next_watcher_id: AtomicU64,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
}

impl<P, C> AuthorizationCache<P, C>
where
    P: PolicyStore + 'static,
    C: ClusterSetStore + 'static,
{
    pub fn new(
        policy: Arc<P>,
        cluster_sets: Arc<C>,
        target: TargetResource,
        scope: Scope,
        config: CacheConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(CacheInner {
                policy,
                cluster_sets,
                target,
                scope,
                config,
                index: PermissionIndex::new(),
                watchers: RwLock::new(HashMap::new()),
                next_watcher_id: AtomicU64::new(0),
                shutdown,
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Wait for the upstream stores, build the first index, and spawn the
    /// sync loop. Calling start again is a no-op.
    pub async fn start(&self) -> crate::Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.wait_for_initial_sync().await?;

        // Snapshot the revision tuple before the first rebuild so mutations
        // racing the rebuild trigger another pass.
        let seen = self.revisions();
        self.inner.rebuild_and_notify().await?;
        tracing::info!(
            target_group = %self.inner.target.group,
            target_resource = %self.inner.target.resource,
            "authorization cache started"
        );

        let inner = self.inner.clone();
        tokio::spawn(sync_loop(inner, seen));
        Ok(())
    }

    /// Signal shutdown: the sync loop exits and every watch closes.
    /// Idempotent.
    pub fn stop(&self) {
        if !self.inner.shutdown.send_replace(true) {
            tracing::info!("authorization cache stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Cluster sets the caller may see, filtered by the label selector.
    /// Order is unspecified.
    pub async fn list(
        &self,
        user: &UserInfo,
        selector: &LabelSelector,
    ) -> crate::Result<Vec<ClusterSet>> {
        let names = self.inner.index.lookup_for(user).await;
        let mut sets = Vec::with_capacity(names.len());
        for name in names {
            // Names can outlive their resource between rebuilds; skip those.
            match self.inner.cluster_sets.get(&name).await? {
                Some(set) if selector.matches(&set.labels) => sets.push(set),
                _ => {}
            }
        }
        Ok(sets)
    }

    /// Read-through to the resource store. Does not apply permissions;
    /// combine with `list` semantics where that matters.
    pub async fn get(&self, name: &str) -> crate::Result<Option<ClusterSet>> {
        Ok(self.inner.cluster_sets.get(name).await?)
    }

    /// Names the caller may currently see, straight from the index.
    pub async fn visible_names(&self, user: &UserInfo) -> HashSet<String> {
        self.inner.index.lookup_for(user).await
    }

    /// Open a permission-aware watch for the caller.
    pub async fn watch(
        &self,
        user: &UserInfo,
        options: WatchOptions,
    ) -> crate::Result<ClusterSetWatch> {
        if self.is_stopped() {
            return Err(CacheError::Stopped);
        }

        let id = WatcherId(self.inner.next_watcher_id.fetch_add(1, Ordering::SeqCst));
        let (notify_tx, notify_rx) = mpsc::channel(self.inner.config.notify_buffer.max(1));
        self.inner.watchers.write().await.insert(id, notify_tx);

        // Snapshot after registration so no rebuild falls between the
        // snapshot and the subscription.
        let snapshot = match self.list(user, &LabelSelector::everything()).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.inner.watchers.write().await.remove(&id);
                return Err(err);
            }
        };
        let known = snapshot
            .iter()
            .map(|set| (set.name.clone(), set.resource_version.clone()))
            .collect();
        let initial = if options.include_initial {
            snapshot
        } else {
            Vec::new()
        };

        Ok(start_watch(
            self.inner.clone(),
            WatchParts {
                user: user.clone(),
                id,
                initial,
                known,
                notifications: notify_rx,
                shutdown: self.inner.shutdown.subscribe(),
                event_buffer: options.event_buffer.unwrap_or(self.inner.config.event_buffer),
                event_timeout: options.event_timeout.unwrap_or(self.inner.config.event_timeout),
            },
        ))
    }

    /// Drop a watch from the notification registry without stopping its
    /// consumer side.
    pub async fn remove_watcher(&self, id: WatcherId) {
        self.inner.watchers.write().await.remove(&id);
    }

    /// Number of currently registered watches; for monitoring.
    pub async fn watcher_count(&self) -> usize {
        self.inner.watchers.read().await.len()
    }

    fn revisions(&self) -> (u64, u64) {
        (
            self.inner.policy.revision(),
            self.inner.cluster_sets.revision(),
        )
    }

    async fn wait_for_initial_sync(&self) -> crate::Result<()> {
        let deadline = tokio::time::Instant::now() + self.inner.config.initial_sync_timeout;
        while !(self.inner.policy.has_synced() && self.inner.cluster_sets.has_synced()) {
            if tokio::time::Instant::now() >= deadline {
                return Err(CacheError::InitialSync(self.inner.config.initial_sync_timeout));
            }
            tokio::time::sleep(SYNC_POLL_SLICE).await;
        }
        Ok(())
    }
}

// Poll the store revisions and rebuild when either moves. The cursor only
// advances on a successful rebuild, so failures retry on the next tick.
async fn sync_loop<P, C>(inner: Arc<CacheInner<P, C>>, mut seen: (u64, u64))
where
    P: PolicyStore + 'static,
    C: ClusterSetStore + 'static,
{
    let mut shutdown = inner.shutdown.subscribe();
    let mut ticker = tokio::time::interval(inner.config.sync_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        let current = (inner.policy.revision(), inner.cluster_sets.revision());
        if current == seen {
            continue;
        }
        match inner.rebuild_and_notify().await {
            Ok(()) => seen = current,
            Err(err) => {
                tracing::warn!(error = %err, "authorization index rebuild failed; retrying on next tick");
            }
        }
    }
    tracing::debug!("authorization cache sync loop exited");
}

impl<P, C> CacheInner<P, C>
where
    P: PolicyStore + 'static,
    C: ClusterSetStore + 'static,
{
    // Recompute the whole index from the current binding/role/resource
    // snapshots, publish it, and notify every watch. Any store error
    // abandons the pass with the previous index intact.
    async fn rebuild_and_notify(&self) -> corral_store::Result<()> {
        let bindings = self.policy.role_bindings().await?;
        let mut users: HashMap<String, HashSet<String>> = HashMap::new();
        let mut groups: HashMap<String, HashSet<String>> = HashMap::new();

        for binding in &bindings {
            let role = match self.policy.role(&binding.role_ref).await? {
                Some(role) => role,
                None => {
                    tracing::debug!(
                        binding = %binding.name,
                        role = %binding.role_ref,
                        "bound role not found; skipping binding"
                    );
                    continue;
                }
            };
            let granted = match granted_names(&role, &self.target, self.scope) {
                // Full access expands to the name set that exists right now.
                NameGrant::All => self
                    .cluster_sets
                    .list(&LabelSelector::everything())
                    .await?
                    .into_iter()
                    .map(|set| set.name)
                    .collect::<HashSet<_>>(),
                NameGrant::Names(names) => names,
            };
            if granted.is_empty() {
                continue;
            }
            for subject in &binding.subjects {
                let bucket = match subject.kind {
                    SubjectKind::User => &mut users,
                    SubjectKind::Group => &mut groups,
                    SubjectKind::Unknown => {
                        tracing::debug!(
                            binding = %binding.name,
                            subject = %subject.name,
                            "unhandled subject kind; skipping"
                        );
                        continue;
                    }
                };
                bucket
                    .entry(subject.name.clone())
                    .or_default()
                    .extend(granted.iter().cloned());
            }
        }

        // Notification payload comes from the maps about to be published.
        let mut all_names = HashSet::new();
        for granted in users.values().chain(groups.values()) {
            all_names.extend(granted.iter().cloned());
        }
        let all_users: HashSet<String> = users.keys().cloned().collect();
        let all_groups: HashSet<String> = groups.keys().cloned().collect();

        let diff = self.index.replace(users, groups).await;
        tracing::debug!(
            users = all_users.len(),
            groups = all_groups.len(),
            names = all_names.len(),
            "authorization index rebuilt"
        );

        self.fan_out(MembershipChange {
            names: all_names,
            users: all_users,
            groups: all_groups,
        })
        .await;

        if diff.removed_any() {
            // Revoked subjects are no longer keyed in the index; give their
            // watches an explicit signal to flush to zero.
            self.fan_out(MembershipChange {
                names: HashSet::new(),
                users: diff.removed_users,
                groups: diff.removed_groups,
            })
            .await;
        }
        Ok(())
    }

    async fn fan_out(&self, change: MembershipChange) {
        // Snapshot the senders so no watch can stall others while holding
        // the registry lock.
        let senders: Vec<(WatcherId, mpsc::Sender<MembershipChange>)> = self
            .watchers
            .read()
            .await
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        for (id, sender) in senders {
            match sender.try_send(change.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // The watch re-derives visibility on every notification,
                    // so a dropped hint is repaired by the next one.
                    tracing::warn!(watcher = %id, "notification queue full; dropping change hint");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.watchers.write().await.remove(&id);
                }
            }
        }
    }
}

#[async_trait]
impl<P, C> WatchableCache for CacheInner<P, C>
where
    P: PolicyStore + 'static,
    C: ClusterSetStore + 'static,
{
    async fn visible_names(&self, user: &UserInfo) -> HashSet<String> {
        self.index.lookup_for(user).await
    }

    async fn fetch(&self, name: &str) -> corral_store::Result<Option<ClusterSet>> {
        self.cluster_sets.get(name).await
    }

    async fn remove_watcher(&self, id: WatcherId) {
        self.watchers.write().await.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthorizationCache, CacheError};
    use crate::config::CacheConfig;
    use async_trait::async_trait;
    use corral_common::{ClusterSet, SubjectKind, SubjectRef, UserInfo, labels::LabelSelector};
    use corral_rbac::{Role, RoleBinding, Rule, Scope, TargetResource};
    use corral_store::{
        MemoryClusterSetStore, MemoryPolicyStore, PolicyStore, Result as StoreResult, StoreError,
    };
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn target() -> TargetResource {
        TargetResource::new("fleet.corral.dev", "clustersets")
    }

    fn fast_config() -> CacheConfig {
        CacheConfig {
            sync_interval: Duration::from_millis(20),
            initial_sync_timeout: Duration::from_millis(500),
            ..CacheConfig::default()
        }
    }

    fn viewer_role(names: &[&str]) -> Role {
        let mut rule = Rule::new("fleet.corral.dev", "clustersets").with_verbs(["get", "list"]);
        if !names.is_empty() {
            rule = rule.with_resource_names(names.to_vec());
        }
        Role::new("viewer").with_rule(rule)
    }

    async fn new_cache(
        policy: Arc<MemoryPolicyStore>,
        sets: Arc<MemoryClusterSetStore>,
    ) -> AuthorizationCache<MemoryPolicyStore, MemoryClusterSetStore> {
        let cache = AuthorizationCache::new(policy, sets, target(), Scope::View, fast_config());
        cache.start().await.expect("start");
        cache
    }

    async fn wait_for_visible(
        cache: &AuthorizationCache<MemoryPolicyStore, MemoryClusterSetStore>,
        user: &UserInfo,
        expected: &HashSet<String>,
    ) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if &cache.visible_names(user).await == expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("index did not converge");
    }

    fn names(input: &[&str]) -> HashSet<String> {
        input.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn named_grant_populates_index() {
        let policy = Arc::new(MemoryPolicyStore::new());
        let sets = Arc::new(MemoryClusterSetStore::new());
        sets.upsert(ClusterSet::new("dev", "1")).await;
        sets.upsert(ClusterSet::new("prod", "1")).await;
        policy.upsert_role(viewer_role(&["dev"])).await;
        policy
            .upsert_binding(
                RoleBinding::new("b1", "viewer").with_subject(SubjectRef::user("alice")),
            )
            .await;

        let cache = new_cache(policy, sets).await;
        let alice = UserInfo::new("alice");

        assert_eq!(cache.visible_names(&alice).await, names(&["dev"]));
        let listed = cache.list(&alice, &LabelSelector::everything()).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "dev");
        cache.stop();
    }

    #[tokio::test]
    async fn global_grant_snapshots_current_sets() {
        let policy = Arc::new(MemoryPolicyStore::new());
        let sets = Arc::new(MemoryClusterSetStore::new());
        sets.upsert(ClusterSet::new("a", "1")).await;
        sets.upsert(ClusterSet::new("b", "1")).await;
        policy.upsert_role(viewer_role(&[])).await;
        policy
            .upsert_binding(RoleBinding::new("b1", "viewer").with_subject(SubjectRef::group("ops")))
            .await;

        let cache = new_cache(policy, sets.clone()).await;
        let member = UserInfo::new("carol").with_groups(["ops"]);
        assert_eq!(cache.visible_names(&member).await, names(&["a", "b"]));

        // A new set shows up after the next rebuild.
        sets.upsert(ClusterSet::new("c", "1")).await;
        wait_for_visible(&cache, &member, &names(&["a", "b", "c"])).await;
        cache.stop();
    }

    #[tokio::test]
    async fn missing_role_skips_binding() {
        let policy = Arc::new(MemoryPolicyStore::new());
        let sets = Arc::new(MemoryClusterSetStore::new());
        sets.upsert(ClusterSet::new("dev", "1")).await;
        policy
            .upsert_binding(
                RoleBinding::new("dangling", "ghost").with_subject(SubjectRef::user("alice")),
            )
            .await;
        policy.upsert_role(viewer_role(&["dev"])).await;
        policy
            .upsert_binding(RoleBinding::new("ok", "viewer").with_subject(SubjectRef::user("bob")))
            .await;

        let cache = new_cache(policy, sets).await;
        assert!(cache.visible_names(&UserInfo::new("alice")).await.is_empty());
        assert_eq!(cache.visible_names(&UserInfo::new("bob")).await, names(&["dev"]));
        cache.stop();
    }

    #[tokio::test]
    async fn unknown_subject_kinds_are_skipped() {
        let policy = Arc::new(MemoryPolicyStore::new());
        let sets = Arc::new(MemoryClusterSetStore::new());
        sets.upsert(ClusterSet::new("dev", "1")).await;
        policy.upsert_role(viewer_role(&["dev"])).await;
        policy
            .upsert_binding(
                RoleBinding::new("b1", "viewer")
                    .with_subject(SubjectRef {
                        kind: SubjectKind::Unknown,
                        name: "robot".to_string(),
                    })
                    .with_subject(SubjectRef::user("alice")),
            )
            .await;

        let cache = new_cache(policy, sets).await;
        assert_eq!(cache.visible_names(&UserInfo::new("alice")).await, names(&["dev"]));
        assert!(cache.visible_names(&UserInfo::new("robot")).await.is_empty());
        cache.stop();
    }

    #[tokio::test]
    async fn list_drops_missing_and_filtered_sets() {
        let policy = Arc::new(MemoryPolicyStore::new());
        let sets = Arc::new(MemoryClusterSetStore::new());
        sets.upsert(ClusterSet::new("dev", "1").with_label("env", "dev")).await;
        sets.upsert(ClusterSet::new("prod", "1").with_label("env", "prod")).await;
        policy.upsert_role(viewer_role(&["dev", "prod", "ghost"])).await;
        policy
            .upsert_binding(
                RoleBinding::new("b1", "viewer").with_subject(SubjectRef::user("alice")),
            )
            .await;

        let cache = new_cache(policy, sets).await;
        let alice = UserInfo::new("alice");

        // "ghost" is granted but does not exist; the label filter drops dev.
        let prod_only = cache
            .list(&alice, &LabelSelector::default().with_label("env", "prod"))
            .await
            .expect("list");
        assert_eq!(prod_only.len(), 1);
        assert_eq!(prod_only[0].name, "prod");
        cache.stop();
    }

    #[tokio::test]
    async fn get_ignores_permissions() {
        let policy = Arc::new(MemoryPolicyStore::new());
        let sets = Arc::new(MemoryClusterSetStore::new());
        sets.upsert(ClusterSet::new("secret", "1")).await;

        let cache = new_cache(policy, sets).await;
        assert!(cache.get("secret").await.expect("get").is_some());
        assert!(cache.get("missing").await.expect("get").is_none());
        cache.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_blocks_new_watches() {
        let policy = Arc::new(MemoryPolicyStore::new());
        let sets = Arc::new(MemoryClusterSetStore::new());
        let cache = new_cache(policy, sets).await;

        cache.stop();
        cache.stop();
        assert!(cache.is_stopped());

        let err = cache
            .watch(&UserInfo::new("alice"), Default::default())
            .await
            .expect_err("watch on stopped cache");
        assert!(matches!(err, CacheError::Stopped));
    }

    // Policy store whose reads can be switched to fail, for rebuild
    // abandonment coverage.
    struct FlakyPolicyStore {
        inner: MemoryPolicyStore,
        fail: AtomicBool,
    }

    impl FlakyPolicyStore {
        fn new(inner: MemoryPolicyStore) -> Self {
            Self {
                inner,
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl PolicyStore for FlakyPolicyStore {
        async fn role_bindings(&self) -> StoreResult<Vec<corral_rbac::RoleBinding>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected".to_string()));
            }
            self.inner.role_bindings().await
        }

        async fn role(&self, name: &str) -> StoreResult<Option<Role>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected".to_string()));
            }
            self.inner.role(name).await
        }

        fn revision(&self) -> u64 {
            self.inner.revision()
        }

        fn has_synced(&self) -> bool {
            self.inner.has_synced()
        }
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_index_then_recovers() {
        let memory = MemoryPolicyStore::new();
        memory.upsert_role(viewer_role(&["dev"])).await;
        memory
            .upsert_binding(
                RoleBinding::new("b1", "viewer").with_subject(SubjectRef::user("alice")),
            )
            .await;
        let policy = Arc::new(FlakyPolicyStore::new(memory));
        let sets = Arc::new(MemoryClusterSetStore::new());
        sets.upsert(ClusterSet::new("dev", "1")).await;
        sets.upsert(ClusterSet::new("stg", "1")).await;

        let cache =
            AuthorizationCache::new(policy.clone(), sets.clone(), target(), Scope::View, fast_config());
        cache.start().await.expect("start");
        let alice = UserInfo::new("alice");
        assert_eq!(cache.visible_names(&alice).await, names(&["dev"]));

        // Break the store, then widen the grant. The rebuild fails and the
        // old index stays authoritative.
        policy.fail.store(true, Ordering::SeqCst);
        policy.inner.upsert_role(viewer_role(&["dev", "stg"])).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.visible_names(&alice).await, names(&["dev"]));

        // Heal the store; the retry converges without further mutations.
        policy.fail.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if cache.visible_names(&alice).await == names(&["dev", "stg"]) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("index did not recover");
        cache.stop();
    }

    // Store that never reports synced, for start() timeout coverage.
    struct NeverSyncedStore;

    #[async_trait]
    impl PolicyStore for NeverSyncedStore {
        async fn role_bindings(&self) -> StoreResult<Vec<corral_rbac::RoleBinding>> {
            Ok(Vec::new())
        }

        async fn role(&self, _name: &str) -> StoreResult<Option<Role>> {
            Ok(None)
        }

        fn revision(&self) -> u64 {
            0
        }

        fn has_synced(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn start_times_out_without_initial_sync() {
        let policy = Arc::new(NeverSyncedStore);
        let sets = Arc::new(MemoryClusterSetStore::new());
        let config = CacheConfig {
            initial_sync_timeout: Duration::from_millis(100),
            ..fast_config()
        };
        let cache = AuthorizationCache::new(policy, sets, target(), Scope::View, config);

        let err = cache.start().await.expect_err("start should time out");
        assert!(matches!(err, CacheError::InitialSync(_)));
    }

    #[tokio::test]
    async fn closed_watch_is_pruned_from_registry() {
        let policy = Arc::new(MemoryPolicyStore::new());
        let sets = Arc::new(MemoryClusterSetStore::new());
        sets.upsert(ClusterSet::new("dev", "1")).await;
        policy.upsert_role(viewer_role(&["dev"])).await;
        policy
            .upsert_binding(
                RoleBinding::new("b1", "viewer").with_subject(SubjectRef::user("alice")),
            )
            .await;

        let cache = new_cache(policy, sets).await;
        let watch = cache
            .watch(&UserInfo::new("alice"), Default::default())
            .await
            .expect("watch");
        assert_eq!(cache.watcher_count().await, 1);

        watch.stop();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if cache.watcher_count().await == 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("watch was not pruned");
        cache.stop();
    }
}
