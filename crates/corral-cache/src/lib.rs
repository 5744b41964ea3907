// RBAC-aware visibility cache for cluster sets.
// The cache turns role/binding policy into a per-subject permission index,
// serves permission-filtered reads, and drives per-subject watches that
// emit events on both resource changes and permission changes.

mod cache;
mod config;
mod event;
mod index;
mod mapper;
mod watch;

pub use cache::{AuthorizationCache, CacheError};
pub use config::CacheConfig;
pub use event::{MembershipChange, WatchEvent};
pub use index::{IndexDiff, PermissionIndex};
pub use mapper::{ClusterSetMapper, MapperError};
pub use watch::{ClusterSetWatch, WatchOptions, WatcherId};

pub type Result<T> = std::result::Result<T, CacheError>;
