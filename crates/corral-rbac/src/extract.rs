use crate::{Role, Scope, TargetResource};
use std::collections::HashSet;

const GROUP_ALL: &str = "*";

/// Result of extracting resource names from a role for one target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameGrant {
    /// The role covers every resource name of the target type.
    All,
    /// The role covers exactly these names; may be empty.
    Names(HashSet<String>),
}

impl NameGrant {
    pub fn is_all(&self) -> bool {
        matches!(self, NameGrant::All)
    }

    /// Whether the grant yields nothing at all.
    pub fn is_empty(&self) -> bool {
        match self {
            NameGrant::All => false,
            NameGrant::Names(names) => names.is_empty(),
        }
    }
}

/// Extract the cluster-set names a role grants for `target` under `scope`.
///
/// Walks the role's rules in order. A rule contributes when its api-groups
/// cover the target group, its resources cover the target resource, and its
/// verbs satisfy the scope. A contributing rule without resource names
/// short-circuits to [`NameGrant::All`]; otherwise names are unioned across
/// all contributing rules. Malformed rules simply contribute nothing.
///
/// ```
/// use corral_rbac::{NameGrant, Role, Rule, Scope, TargetResource, granted_names};
///
/// let target = TargetResource::new("fleet.corral.dev", "clustersets");
/// let role = Role::new("viewer").with_rule(
///     Rule::new("fleet.corral.dev", "clustersets")
///         .with_verbs(["get"])
///         .with_resource_names(["dev"]),
/// );
/// let grant = granted_names(&role, &target, Scope::View);
/// assert!(!grant.is_all());
/// ```
pub fn granted_names(role: &Role, target: &TargetResource, scope: Scope) -> NameGrant {
    let mut names = HashSet::new();
    for rule in &role.rules {
        if !covers(&rule.api_groups, &target.group) {
            continue;
        }
        if !covers(&rule.resources, &target.resource) {
            continue;
        }
        if !scope.satisfied_by(&rule.verbs) {
            continue;
        }
        if rule.resource_names.is_empty() {
            return NameGrant::All;
        }
        names.extend(rule.resource_names.iter().cloned());
    }
    NameGrant::Names(names)
}

// Literal or wildcard membership.
fn covers(values: &[String], wanted: &str) -> bool {
    values.iter().any(|value| value == wanted || value == GROUP_ALL)
}
