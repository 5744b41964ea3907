//! Corral RBAC primitives shared by the authorization cache.
//!
//! # Purpose
//! Defines the role/binding policy model and the pure resource-name
//! extraction used to decide which cluster sets a policy grants.
//!
//! # How it fits
//! The authorization cache walks role bindings, loads the referenced roles,
//! and calls [`granted_names`] to turn each role into either a finite name
//! set or a grant covering every resource of the target type. Keeping the
//! extraction pure keeps scope semantics independently testable.
//!
//! # Key invariants
//! - `"*"` is honoured in api-groups, resources, and verbs.
//! - A contributing rule with no resource names grants every name of the
//!   target type.

mod extract;
mod scope;
mod types;

pub use extract::{NameGrant, granted_names};
pub use scope::Scope;
pub use types::{Role, RoleBinding, Rule, TargetResource};
