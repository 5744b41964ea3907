use corral_common::{SubjectKind, UserInfo};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Concurrent subject to resource-name mapping.
///
/// One reader-writer lock guards both maps. Published value sets are never
/// mutated in place; a rebuild swaps both maps wholesale so readers always
/// observe a self-consistent snapshot. Lookups return defensive copies.
#[derive(Debug, Default)]
pub struct PermissionIndex {
    inner: RwLock<IndexState>,
}

#[derive(Debug, Default)]
struct IndexState {
    users: HashMap<String, HashSet<String>>,
    groups: HashMap<String, HashSet<String>>,
}

/// Subjects gained and lost by one index replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDiff {
    pub added_users: HashSet<String>,
    pub removed_users: HashSet<String>,
    pub added_groups: HashSet<String>,
    pub removed_groups: HashSet<String>,
}

impl IndexDiff {
    pub fn removed_any(&self) -> bool {
        !self.removed_users.is_empty() || !self.removed_groups.is_empty()
    }
}

impl PermissionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resource names granted to one subject. Missing subjects get an empty
    /// set.
    pub async fn lookup(&self, kind: SubjectKind, name: &str) -> HashSet<String> {
        let state = self.inner.read().await;
        let map = match kind {
            SubjectKind::User => &state.users,
            SubjectKind::Group => &state.groups,
            SubjectKind::Unknown => return HashSet::new(),
        };
        map.get(name).cloned().unwrap_or_default()
    }

    /// Union of the caller's user grant with each of their group grants,
    /// read in a single critical section.
    pub async fn lookup_for(&self, user: &UserInfo) -> HashSet<String> {
        let state = self.inner.read().await;
        let mut names = state
            .users
            .get(&user.username)
            .cloned()
            .unwrap_or_default();
        for group in &user.groups {
            if let Some(granted) = state.groups.get(group) {
                names.extend(granted.iter().cloned());
            }
        }
        names
    }

    /// Atomically swap in freshly built maps, reporting which subjects
    /// appeared and disappeared relative to the previous index.
    pub async fn replace(
        &self,
        users: HashMap<String, HashSet<String>>,
        groups: HashMap<String, HashSet<String>>,
    ) -> IndexDiff {
        let mut state = self.inner.write().await;
        let old_users: HashSet<String> = state.users.keys().cloned().collect();
        let old_groups: HashSet<String> = state.groups.keys().cloned().collect();
        let new_users: HashSet<String> = users.keys().cloned().collect();
        let new_groups: HashSet<String> = groups.keys().cloned().collect();

        let (added_users, removed_users) = diff_keys(&old_users, &new_users);
        let (added_groups, removed_groups) = diff_keys(&old_groups, &new_groups);

        state.users = users;
        state.groups = groups;

        IndexDiff {
            added_users,
            removed_users,
            added_groups,
            removed_groups,
        }
    }

    /// The subject names currently keyed in the index, as (users, groups).
    pub async fn known_subjects(&self) -> (HashSet<String>, HashSet<String>) {
        let state = self.inner.read().await;
        (
            state.users.keys().cloned().collect(),
            state.groups.keys().cloned().collect(),
        )
    }
}

// (added, removed) between two key sets.
fn diff_keys(old: &HashSet<String>, new: &HashSet<String>) -> (HashSet<String>, HashSet<String>) {
    let added = new.difference(old).cloned().collect();
    let removed = old.difference(new).cloned().collect();
    (added, removed)
}
