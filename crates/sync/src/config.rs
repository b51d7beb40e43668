use core::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the sync engine.
///
/// The defaults are the protocol constants; tests shrink the timer-driven
/// ones to keep paused-clock scenarios fast.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay before a non-full record-request batch is flushed.
    #[serde(rename = "batch_delay_ms", with = "serde_duration_ms")]
    pub batch_delay: Duration,

    /// Flush a record-request batch immediately at this size.
    pub max_batch_size: usize,

    /// How long a built Merkle tree may be reused unchanged.
    #[serde(rename = "merkle_cache_ttl_ms", with = "serde_duration_ms")]
    pub merkle_cache_ttl: Duration,

    /// Floor for the adaptive root-recompute debounce.
    #[serde(rename = "min_merkle_delay_ms", with = "serde_duration_ms")]
    pub min_merkle_delay: Duration,

    /// Ceiling for the adaptive root-recompute debounce.
    #[serde(rename = "max_merkle_delay_ms", with = "serde_duration_ms")]
    pub max_merkle_delay: Duration,

    /// How many batch arrival times feed the adaptive debounce.
    pub batch_timing_history: usize,

    /// Inactivity window after which a sync is force-cancelled.
    #[serde(rename = "sync_timeout_ms", with = "serde_duration_ms")]
    pub sync_timeout: Duration,

    /// Delay before verifying a sync has no outstanding work.
    #[serde(rename = "completion_check_delay_ms", with = "serde_duration_ms")]
    pub completion_check_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_millis(100),
            max_batch_size: 50,
            merkle_cache_ttl: Duration::from_secs(1),
            min_merkle_delay: Duration::from_millis(500),
            max_merkle_delay: Duration::from_secs(5),
            batch_timing_history: 5,
            sync_timeout: Duration::from_secs(120),
            completion_check_delay: Duration::from_secs(2),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            sync_timeout: timeout,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    #[must_use]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    #[must_use]
    pub fn completion_check_delay(mut self, delay: Duration) -> Self {
        self.completion_check_delay = delay;
        self
    }

    #[must_use]
    pub fn merkle_delays(mut self, min: Duration, max: Duration) -> Self {
        self.min_merkle_delay = min;
        self.max_merkle_delay = max;
        self
    }
}

mod serde_duration_ms {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
