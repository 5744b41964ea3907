use corral_common::SubjectRef;
use serde::{Deserialize, Serialize};

/// The (api-group, resource plural) pair a cache instance filters.
///
/// ```
/// use corral_rbac::TargetResource;
///
/// let target = TargetResource::new("fleet.corral.dev", "clustersets");
/// assert_eq!(target.group, "fleet.corral.dev");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetResource {
    pub group: String,
    pub resource: String,
}

impl TargetResource {
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }
}

/// One policy rule granting verbs on resources.
///
/// An empty `resource_names` list means the rule covers every name of the
/// matched resource types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub api_groups: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default)]
    pub resource_names: Vec<String>,
}

impl Rule {
    pub fn new(api_group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            api_groups: vec![api_group.into()],
            resources: vec![resource.into()],
            verbs: Vec::new(),
            resource_names: Vec::new(),
        }
    }

    pub fn with_verbs<I, S>(mut self, verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verbs = verbs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resource_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// A named, ordered list of rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Links a list of subjects to exactly one role by name.
///
/// The binding is the only linkage between subjects and roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub name: String,
    pub role_ref: String,
    #[serde(default)]
    pub subjects: Vec<SubjectRef>,
}

impl RoleBinding {
    pub fn new(name: impl Into<String>, role_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role_ref: role_ref.into(),
            subjects: Vec::new(),
        }
    }

    pub fn with_subject(mut self, subject: SubjectRef) -> Self {
        self.subjects.push(subject);
        self
    }
}
