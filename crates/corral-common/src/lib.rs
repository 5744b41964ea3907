// Shared data types used across the corral crates.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A cluster set as cached from the fleet resource store.
///
/// ```
/// use corral_common::ClusterSet;
///
/// let set = ClusterSet::new("prod", "42").with_label("env", "prod");
/// assert_eq!(set.name, "prod");
/// assert_eq!(set.labels.get("env").map(String::as_str), Some("prod"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSet {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub resource_version: String,
}

impl ClusterSet {
    pub fn new(name: impl Into<String>, resource_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            resource_version: resource_version.into(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    // Stub carrying only the name, for events about objects that can no
    // longer be fetched.
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            resource_version: String::new(),
        }
    }
}

/// Kind of a subject named by a role binding.
///
/// Kinds other than `User` and `Group` deserialize to `Unknown` and are
/// ignored by the authorization cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubjectKind {
    User,
    Group,
    Unknown,
}

impl From<String> for SubjectKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "User" => SubjectKind::User,
            "Group" => SubjectKind::Group,
            _ => SubjectKind::Unknown,
        }
    }
}

impl From<SubjectKind> for String {
    fn from(value: SubjectKind) -> Self {
        match value {
            SubjectKind::User => "User",
            SubjectKind::Group => "Group",
            SubjectKind::Unknown => "Unknown",
        }
        .to_string()
    }
}

/// A subject reference as it appears in a role binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub name: String,
}

impl SubjectRef {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::User,
            name: name.into(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Group,
            name: name.into(),
        }
    }
}

/// Identity of an authenticated caller: a user name plus group memberships.
///
/// ```
/// use corral_common::UserInfo;
///
/// let alice = UserInfo::new("alice").with_groups(["ops"]);
/// assert_eq!(alice.username, "alice");
/// assert!(alice.in_group("ops"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl UserInfo {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

pub mod labels {
    // Equality- and expression-based label selection over resource labels.
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum Operator {
        In,
        NotIn,
        Exists,
        DoesNotExist,
    }

    /// One expression requirement, e.g. `env in (prod, stage)`.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Requirement {
        pub key: String,
        pub operator: Operator,
        #[serde(default)]
        pub values: Vec<String>,
    }

    impl Requirement {
        pub fn new<I, S>(key: impl Into<String>, operator: Operator, values: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                key: key.into(),
                operator,
                values: values.into_iter().map(Into::into).collect(),
            }
        }

        fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
            let value = labels.get(&self.key);
            match self.operator {
                Operator::In => value.is_some_and(|v| self.values.iter().any(|want| want == v)),
                Operator::NotIn => !value.is_some_and(|v| self.values.iter().any(|want| want == v)),
                Operator::Exists => value.is_some(),
                Operator::DoesNotExist => value.is_none(),
            }
        }
    }

    /// Label selector with equality requirements and expressions.
    ///
    /// An empty selector matches everything.
    ///
    /// ```
    /// use corral_common::labels::LabelSelector;
    /// use std::collections::BTreeMap;
    ///
    /// let selector = LabelSelector::default().with_label("env", "prod");
    /// let mut labels = BTreeMap::new();
    /// labels.insert("env".to_string(), "prod".to_string());
    /// assert!(selector.matches(&labels));
    /// ```
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LabelSelector {
        #[serde(default)]
        pub match_labels: BTreeMap<String, String>,
        #[serde(default)]
        pub match_expressions: Vec<Requirement>,
    }

    impl LabelSelector {
        // Selector matching every object.
        pub fn everything() -> Self {
            Self::default()
        }

        pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
            self.match_labels.insert(key.into(), value.into());
            self
        }

        pub fn with_expression(mut self, requirement: Requirement) -> Self {
            self.match_expressions.push(requirement);
            self
        }

        pub fn is_empty(&self) -> bool {
            self.match_labels.is_empty() && self.match_expressions.is_empty()
        }

        pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
            for (key, value) in &self.match_labels {
                if labels.get(key) != Some(value) {
                    return false;
                }
            }
            self.match_expressions
                .iter()
                .all(|requirement| requirement.matches(labels))
        }
    }
}
