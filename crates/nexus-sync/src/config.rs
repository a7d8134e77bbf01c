//! Sync layer configuration.

use std::time::Duration;

use nexus_core::defaults;

/// Tunables for the entity cache and event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Age after which a cached collection is refetched on read.
    pub stale_after: Duration,
    /// Idle time after which an unsubscribed entry is evicted.
    pub gc_after: Duration,
    /// Buffer size of the sync event channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(defaults::CACHE_STALE_SECS),
            gc_after: Duration::from_secs(defaults::CACHE_GC_SECS),
            event_capacity: defaults::EVENT_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `NEXUS_CACHE_STALE_SECS` | `300` | Freshness window |
    /// | `NEXUS_CACHE_GC_SECS` | `600` | Idle eviction window |
    /// | `NEXUS_EVENT_CAPACITY` | `256` | Event buffer size |
    pub fn from_env() -> Self {
        let secs = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        let event_capacity = std::env::var("NEXUS_EVENT_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::EVENT_CAPACITY)
            .max(1);

        Self {
            stale_after: Duration::from_secs(secs(
                "NEXUS_CACHE_STALE_SECS",
                defaults::CACHE_STALE_SECS,
            )),
            gc_after: Duration::from_secs(secs("NEXUS_CACHE_GC_SECS", defaults::CACHE_GC_SECS)),
            event_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows() {
        let config = SyncConfig::default();
        assert_eq!(config.stale_after, Duration::from_secs(300));
        assert_eq!(config.gc_after, Duration::from_secs(600));
        assert_eq!(config.event_capacity, 256);
    }
}
