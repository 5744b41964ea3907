//! Per-subject watch streams.
//!
//! A watch is owned by a single caller identity. Its event loop is one task
//! multiplexing membership notifications from the cache, the cache-wide
//! shutdown signal, and the per-watch stop signal. On each notification the
//! loop re-derives the subject's visible name set from the permission index
//! and diffs it against the names it has already reported, so a resource
//! becoming newly visible or newly invisible synthesizes the matching
//! event. Events for one name are strictly ordered; nothing is guaranteed
//! across names.

use crate::event::{MembershipChange, WatchEvent};
use async_trait::async_trait;
use corral_common::{ClusterSet, UserInfo};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const EVENT_TIMEOUT_MESSAGE: &str = "event notification timeout";

/// Identifies one registered watch inside a cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(pub(crate) u64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

// The slice of the cache a watch event loop needs. Kept narrow so the loop
// can be driven by a fake in tests.
#[async_trait]
pub(crate) trait WatchableCache: Send + Sync {
    /// Names currently visible to the caller, per the permission index.
    async fn visible_names(&self, user: &UserInfo) -> HashSet<String>;

    /// Fetch one cluster set by name from the resource store.
    async fn fetch(&self, name: &str) -> corral_store::Result<Option<ClusterSet>>;

    /// Drop a watch from the notification registry.
    async fn remove_watcher(&self, id: WatcherId);
}

/// Per-watch construction options. `None` inherits the cache config.
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    // Replay the currently visible resources as ADDED events on start.
    pub include_initial: bool,
    // Output queue depth override.
    pub event_buffer: Option<usize>,
    // Enqueue timeout override.
    pub event_timeout: Option<Duration>,
}

impl WatchOptions {
    pub fn with_initial() -> Self {
        Self {
            include_initial: true,
            ..Self::default()
        }
    }
}

/// Consumer handle for one watch stream.
///
/// Dropping the handle stops the watch. `stop` is idempotent; once the loop
/// exits the stream yields `None` forever.
#[derive(Debug)]
pub struct ClusterSetWatch {
    id: WatcherId,
    events: mpsc::Receiver<WatchEvent>,
    stop: watch::Sender<bool>,
    known_len: Arc<AtomicUsize>,
}

impl ClusterSetWatch {
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Next event, or `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Ask the event loop to exit. Safe to call repeatedly.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// How many resources the watch currently tracks; for monitoring.
    pub fn known_len(&self) -> usize {
        self.known_len.load(Ordering::SeqCst)
    }
}

impl futures::Stream for ClusterSetWatch {
    type Item = WatchEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

// Everything the spawned event loop owns.
pub(crate) struct WatchParts {
    pub user: UserInfo,
    pub id: WatcherId,
    pub initial: Vec<ClusterSet>,
    pub known: HashMap<String, String>,
    pub notifications: mpsc::Receiver<MembershipChange>,
    pub shutdown: watch::Receiver<bool>,
    pub event_buffer: usize,
    pub event_timeout: Duration,
}

pub(crate) fn start_watch(cache: Arc<dyn WatchableCache>, parts: WatchParts) -> ClusterSetWatch {
    let (event_tx, event_rx) = mpsc::channel(parts.event_buffer.max(1));
    let (stop_tx, stop_rx) = watch::channel(false);
    let known_len = Arc::new(AtomicUsize::new(parts.known.len()));

    let worker = WatchWorker {
        user: parts.user,
        id: parts.id,
        cache,
        known: parts.known,
        known_len: known_len.clone(),
        out: event_tx,
        notifications: parts.notifications,
        stop: stop_rx,
        shutdown: parts.shutdown,
        event_timeout: parts.event_timeout,
    };
    tokio::spawn(worker.run(parts.initial));

    ClusterSetWatch {
        id: parts.id,
        events: event_rx,
        stop: stop_tx,
        known_len,
    }
}

enum Emit {
    Sent,
    TimedOut,
    Closed,
}

struct WatchWorker {
    user: UserInfo,
    id: WatcherId,
    cache: Arc<dyn WatchableCache>,
    // Name -> last reported resource version. Only this task touches it.
    known: HashMap<String, String>,
    known_len: Arc<AtomicUsize>,
    out: mpsc::Sender<WatchEvent>,
    notifications: mpsc::Receiver<MembershipChange>,
    stop: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
    event_timeout: Duration,
}

impl WatchWorker {
    async fn run(mut self, initial: Vec<ClusterSet>) {
        for set in initial {
            match self.emit(WatchEvent::Added(set)).await {
                Emit::Sent => {}
                Emit::TimedOut => {
                    self.terminate_on_timeout().await;
                    return;
                }
                Emit::Closed => {
                    self.cache.remove_watcher(self.id).await;
                    return;
                }
            }
        }

        loop {
            let change = tokio::select! {
                _ = self.stop.changed() => break,
                _ = self.shutdown.changed() => break,
                change = self.notifications.recv() => match change {
                    Some(change) => change,
                    // Registry dropped our sender; nothing more will come.
                    None => break,
                },
            };
            if !self.apply(change).await {
                return;
            }
        }

        self.cache.remove_watcher(self.id).await;
        tracing::debug!(watcher = %self.id, "watch stopped");
    }

    // Diff the subject's visibility against what was already reported.
    // Returns false when the watch terminated mid-pass.
    async fn apply(&mut self, change: MembershipChange) -> bool {
        if !change.concerns(&self.user) {
            return true;
        }

        // The notification carries the union across all subjects; narrow to
        // what this subject may actually see before diffing.
        let visible = self.cache.visible_names(&self.user).await;

        let revoked: Vec<String> = self
            .known
            .keys()
            .filter(|name| !visible.contains(*name))
            .cloned()
            .collect();
        for name in revoked {
            self.known.remove(&name);
            self.known_len.store(self.known.len(), Ordering::SeqCst);
            let event = WatchEvent::Deleted(ClusterSet::placeholder(name));
            if !self.emit_or_terminate(event).await {
                return false;
            }
        }

        for name in visible {
            let set = match self.cache.fetch(&name).await {
                Ok(Some(set)) => set,
                // Vanished between rebuild and fetch; the next rebuild
                // notification flushes it as DELETED.
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!(watcher = %self.id, name = %name, error = %err, "fetch failed; skipping");
                    continue;
                }
            };
            let resource_version = set.resource_version.clone();
            let event = match self.known.get(&name) {
                None => WatchEvent::Added(set),
                Some(previous) if *previous != resource_version => WatchEvent::Modified(set),
                // Already reported at this version.
                Some(_) => continue,
            };
            self.known.insert(name, resource_version);
            self.known_len.store(self.known.len(), Ordering::SeqCst);
            if !self.emit_or_terminate(event).await {
                return false;
            }
        }
        true
    }

    async fn emit_or_terminate(&mut self, event: WatchEvent) -> bool {
        match self.emit(event).await {
            Emit::Sent => true,
            Emit::TimedOut => {
                self.terminate_on_timeout().await;
                false
            }
            Emit::Closed => {
                self.cache.remove_watcher(self.id).await;
                false
            }
        }
    }

    // Enqueue one event, giving up on stop, shutdown, a closed consumer,
    // or the enqueue timeout.
    async fn emit(&mut self, event: WatchEvent) -> Emit {
        tokio::select! {
            _ = self.stop.changed() => Emit::Closed,
            _ = self.shutdown.changed() => Emit::Closed,
            outcome = tokio::time::timeout(self.event_timeout, self.out.send(event)) => {
                match outcome {
                    Ok(Ok(())) => Emit::Sent,
                    Ok(Err(_)) => Emit::Closed,
                    Err(_) => Emit::TimedOut,
                }
            }
        }
    }

    // Saturated consumer: leave the registry, then surface a single ERROR
    // event. The error send blocks until the consumer drains the queue or
    // the watch is stopped, so a recovering consumer still sees it.
    async fn terminate_on_timeout(&mut self) {
        tracing::warn!(watcher = %self.id, "event notification timeout; terminating watch");
        self.cache.remove_watcher(self.id).await;
        let event = WatchEvent::Error(EVENT_TIMEOUT_MESSAGE.to_string());
        tokio::select! {
            _ = self.stop.changed() => {}
            _ = self.shutdown.changed() => {}
            _ = self.out.send(event) => {}
        }
    }
}
