use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(thiserror::Error, Debug)]
pub enum MapperError {
    #[error("resource type mismatch: {ours} vs {theirs}")]
    TypeMismatch { ours: String, theirs: String },
}

/// Concurrent cluster-set to member-name mapping.
///
/// Used by the permission-filtered read path when the cached sets carry
/// membership. Each mapper is tagged with the member resource type it
/// tracks; merging two mappers with different tags is an error. Read
/// operations return deep copies.
///
/// ```
/// use corral_cache::ClusterSetMapper;
/// use std::collections::HashSet;
///
/// let mapper = ClusterSetMapper::new("clusters");
/// let rt = tokio::runtime::Runtime::new().expect("rt");
/// rt.block_on(async {
///     mapper.add_member("prod", "cluster-1").await;
///     assert!(mapper.members("prod").await.contains("cluster-1"));
/// });
/// ```
#[derive(Debug)]
pub struct ClusterSetMapper {
    resource_type: String,
    // Set name -> member names. A set with no members is not kept.
    inner: RwLock<HashMap<String, HashSet<String>>>,
}

impl ClusterSetMapper {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Replace one set's membership. Empty members delete the set.
    pub async fn update_set(&self, set_name: &str, members: HashSet<String>) {
        if set_name.is_empty() {
            return;
        }
        let mut guard = self.inner.write().await;
        if members.is_empty() {
            guard.remove(set_name);
        } else {
            guard.insert(set_name.to_string(), members);
        }
    }

    pub async fn delete_set(&self, set_name: &str) {
        if set_name.is_empty() {
            return;
        }
        self.inner.write().await.remove(set_name);
    }

    /// Add a member to one set without touching its other memberships.
    pub async fn add_member(&self, set_name: &str, member: &str) {
        if set_name.is_empty() || member.is_empty() {
            return;
        }
        self.inner
            .write()
            .await
            .entry(set_name.to_string())
            .or_default()
            .insert(member.to_string());
    }

    /// Remove a member from every set, dropping sets that become empty.
    pub async fn remove_member(&self, member: &str) {
        if member.is_empty() {
            return;
        }
        let mut guard = self.inner.write().await;
        guard.retain(|_, members| {
            members.remove(member);
            !members.is_empty()
        });
    }

    /// Move a member into one set and out of every other, atomically.
    pub async fn move_member(&self, member: &str, set_name: &str) {
        if set_name.is_empty() || member.is_empty() {
            return;
        }
        let mut guard = self.inner.write().await;
        guard
            .entry(set_name.to_string())
            .or_default()
            .insert(member.to_string());
        guard.retain(|set, members| {
            if set != set_name {
                members.remove(member);
            }
            !members.is_empty()
        });
    }

    /// Deep copy of one set's members. Missing sets yield an empty set.
    pub async fn members(&self, set_name: &str) -> HashSet<String> {
        self.inner
            .read()
            .await
            .get(set_name)
            .cloned()
            .unwrap_or_default()
    }

    /// First set containing the member. Sets stay disjoint as long as
    /// membership changes go through `move_member`, so a linear scan is
    /// enough.
    pub async fn set_for_member(&self, member: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .iter()
            .find(|(_, members)| members.contains(member))
            .map(|(set, _)| set.clone())
    }

    /// Deep copy of the whole mapping.
    pub async fn all(&self) -> HashMap<String, HashSet<String>> {
        self.inner.read().await.clone()
    }

    /// Union with another mapper of the same resource type into a new one.
    pub async fn merge(&self, other: &ClusterSetMapper) -> Result<ClusterSetMapper, MapperError> {
        self.check_type(other)?;
        let merged = ClusterSetMapper::new(self.resource_type.clone());
        {
            let mut out = merged.inner.write().await;
            for (set, members) in self.inner.read().await.iter() {
                out.insert(set.clone(), members.clone());
            }
            for (set, members) in other.inner.read().await.iter() {
                out.entry(set.clone())
                    .or_default()
                    .extend(members.iter().cloned());
            }
        }
        Ok(merged)
    }

    /// Replace this mapper's contents wholesale with another's.
    pub async fn replace_with(&self, other: &ClusterSetMapper) -> Result<(), MapperError> {
        self.check_type(other)?;
        let snapshot = other.inner.read().await.clone();
        *self.inner.write().await = snapshot;
        Ok(())
    }

    fn check_type(&self, other: &ClusterSetMapper) -> Result<(), MapperError> {
        if self.resource_type != other.resource_type {
            return Err(MapperError::TypeMismatch {
                ours: self.resource_type.clone(),
                theirs: other.resource_type.clone(),
            });
        }
        Ok(())
    }
}
