//! # Purpose
//! Demonstrate the full permission-filtered watch flow against in-memory
//! stores: policy mutations and resource mutations both surface as watch
//! events, scoped to what each subject may see.
//!
//! # High-level flow
//! 1. Seed roles, bindings, and cluster sets into the memory stores.
//! 2. Start a view-scoped authorization cache over them.
//! 3. Open a watch for `alice` (named grant) and one for `carol` (global
//!    grant via the `ops` group), replaying the initial visibility.
//! 4. Mutate the world: bump a resource version, create a set, revoke part
//!    of alice's grant.
//! 5. Print every event each watch observes.
//!
//! # Notes on determinism
//! - Mutations wait for the expected event instead of sleeping blindly.
//! - Every await is wrapped in an explicit timeout so a regression fails
//!   fast instead of hanging.
use anyhow::{Context, Result, bail};
use corral_cache::{AuthorizationCache, CacheConfig, ClusterSetWatch, WatchEvent, WatchOptions};
use corral_common::{ClusterSet, SubjectRef, UserInfo};
use corral_rbac::{Role, RoleBinding, Rule, Scope, TargetResource};
use corral_store::{MemoryClusterSetStore, MemoryPolicyStore};
use std::sync::Arc;
use std::time::Duration;

const EVENT_WAIT: Duration = Duration::from_secs(5);

fn viewer_role(names: &[&str]) -> Role {
    let mut rule = Rule::new("fleet.corral.dev", "clustersets").with_verbs(["get", "list"]);
    if !names.is_empty() {
        rule = rule.with_resource_names(names.to_vec());
    }
    Role::new("cluster-set-viewer").with_rule(rule)
}

async fn next_event(label: &str, watch: &mut ClusterSetWatch) -> Result<WatchEvent> {
    let event = tokio::time::timeout(EVENT_WAIT, watch.recv())
        .await
        .with_context(|| format!("{label}: timed out waiting for an event"))?;
    let Some(event) = event else {
        bail!("{label}: stream closed unexpectedly");
    };
    println!("  [{label}] {}", serde_json::to_string(&event)?);
    Ok(event)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let policy = Arc::new(MemoryPolicyStore::new());
    let sets = Arc::new(MemoryClusterSetStore::new());

    println!("== seeding policy and cluster sets");
    sets.upsert(ClusterSet::new("dev", "1").with_label("env", "dev")).await;
    sets.upsert(ClusterSet::new("stg", "1").with_label("env", "stage")).await;
    policy.upsert_role(viewer_role(&["dev", "stg"])).await;
    policy
        .upsert_binding(
            RoleBinding::new("alice-view", "cluster-set-viewer")
                .with_subject(SubjectRef::user("alice")),
        )
        .await;
    policy
        .upsert_role(
            Role::new("fleet-admin").with_rule(Rule::new("*", "*").with_verbs(["*"])),
        )
        .await;
    policy
        .upsert_binding(
            RoleBinding::new("ops-admin", "fleet-admin").with_subject(SubjectRef::group("ops")),
        )
        .await;

    println!("== starting the authorization cache");
    let cache = AuthorizationCache::new(
        policy.clone(),
        sets.clone(),
        TargetResource::new("fleet.corral.dev", "clustersets"),
        Scope::View,
        CacheConfig {
            sync_interval: Duration::from_millis(50),
            ..CacheConfig::default()
        },
    );
    cache.start().await.context("cache start")?;

    let alice = UserInfo::new("alice");
    let carol = UserInfo::new("carol").with_groups(["ops"]);
    let mut alice_watch = cache.watch(&alice, WatchOptions::with_initial()).await?;
    let mut carol_watch = cache.watch(&carol, WatchOptions::with_initial()).await?;

    println!("== initial replay (two sets each)");
    for _ in 0..2 {
        next_event("alice", &mut alice_watch).await?;
    }
    for _ in 0..2 {
        next_event("carol", &mut carol_watch).await?;
    }

    println!("== bumping resource version of dev");
    sets.upsert(ClusterSet::new("dev", "2").with_label("env", "dev")).await;
    for (label, watch) in [("alice", &mut alice_watch), ("carol", &mut carol_watch)] {
        let event = next_event(label, watch).await?;
        if !matches!(event, WatchEvent::Modified(_)) {
            bail!("{label}: expected MODIFIED, got {event:?}");
        }
    }

    println!("== creating cluster set prod (visible to carol only)");
    sets.upsert(ClusterSet::new("prod", "1").with_label("env", "prod")).await;
    let event = next_event("carol", &mut carol_watch).await?;
    if event.name() != Some("prod") {
        bail!("carol: expected ADDED prod, got {event:?}");
    }

    println!("== revoking alice's access to stg");
    policy.upsert_role(viewer_role(&["dev"])).await;
    let event = next_event("alice", &mut alice_watch).await?;
    if !matches!(&event, WatchEvent::Deleted(set) if set.name == "stg") {
        bail!("alice: expected DELETED stg, got {event:?}");
    }

    println!("== shutting down");
    alice_watch.stop();
    carol_watch.stop();
    cache.stop();
    println!("demo complete: both watches saw exactly their own permissions");
    Ok(())
}
