use std::time::Duration;

const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_INITIAL_SYNC_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_EVENT_BUFFER: usize = 1000;
const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_NOTIFY_BUFFER: usize = 1024;

/// Authorization cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    // Poll interval between upstream revision checks.
    pub sync_interval: Duration,
    // Max time start() waits for the upstream stores to finish loading.
    pub initial_sync_timeout: Duration,
    // Per-watch output queue depth.
    pub event_buffer: usize,
    // Max time a watch waits to enqueue one event before self-destructing.
    pub event_timeout: Duration,
    // Per-watch membership notification queue depth.
    pub notify_buffer: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sync_interval: DEFAULT_SYNC_INTERVAL,
            initial_sync_timeout: DEFAULT_INITIAL_SYNC_TIMEOUT,
            event_buffer: DEFAULT_EVENT_BUFFER,
            event_timeout: DEFAULT_EVENT_TIMEOUT,
            notify_buffer: DEFAULT_NOTIFY_BUFFER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CacheConfig;

    #[test]
    fn defaults_are_sane() {
        let config = CacheConfig::default();
        assert!(config.sync_interval.as_millis() > 0);
        assert!(config.event_buffer > 0);
        assert!(config.event_timeout > config.sync_interval);
    }
}
