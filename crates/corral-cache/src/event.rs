use corral_common::{ClusterSet, UserInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One event on a watch stream.
///
/// `Deleted` may carry a placeholder object holding only the name when the
/// underlying resource is already gone. `Error` is terminal: the stream
/// closes after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "object")]
pub enum WatchEvent {
    Added(ClusterSet),
    Modified(ClusterSet),
    Deleted(ClusterSet),
    Error(String),
}

impl WatchEvent {
    pub fn object(&self) -> Option<&ClusterSet> {
        match self {
            WatchEvent::Added(set) | WatchEvent::Modified(set) | WatchEvent::Deleted(set) => {
                Some(set)
            }
            WatchEvent::Error(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.object().map(|set| set.name.as_str())
    }
}

/// Fan-out payload sent to every watch after an index rebuild.
///
/// `names` is the union of resource names across all subjects; `users` and
/// `groups` are the subjects currently keyed in the index (or, on a flush
/// notification, the subjects just removed from it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChange {
    pub names: HashSet<String>,
    pub users: HashSet<String>,
    pub groups: HashSet<String>,
}

impl MembershipChange {
    /// Whether this notification involves the given caller at all.
    pub fn concerns(&self, user: &UserInfo) -> bool {
        self.users.contains(&user.username)
            || user.groups.iter().any(|group| self.groups.contains(group))
    }
}
