use serde::{Deserialize, Serialize};

/// Coordinator behavior/configuration knobs.
///
/// All liveness thresholds are derived from `heartbeat_interval_ms`; all
/// state-machine dwell times are derived from `status_update_interval_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdlConfig {
    /// Max region work units a worker may hold queued+running at once.
    pub max_concurrent_per_worker: usize,
    /// Base interval for index visibility-state propagation.
    pub status_update_interval_ms: u64,
    /// Multiplier bounding in-flight backfill units per table
    /// (`doing <= region_count * max_region_ratio`).
    pub max_region_ratio: usize,
    /// Max retries for a single region work unit before job rollback.
    pub max_retry: u32,
    /// Worker heartbeat cadence (inherited from the catalog layer).
    pub heartbeat_interval_ms: u64,
    /// Max new Idle units admitted per controller tick.
    pub max_batch_per_tick: usize,
    /// Controller loop cadence.
    pub tick_interval_ms: u64,
    /// Sweeper loop cadence.
    pub sweep_interval_ms: u64,
    /// Backoff while not leader.
    pub not_leader_backoff_ms: u64,
    /// Per-unit backfill row limit handed to workers.
    pub backfill_scan_limit: u32,
}

impl Default for DdlConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_worker: 10,
            status_update_interval_ms: 10_000,
            max_region_ratio: 2,
            max_retry: 30,
            heartbeat_interval_ms: 10_000,
            max_batch_per_tick: 20,
            tick_interval_ms: 20_000,
            sweep_interval_ms: 20_000,
            not_leader_backoff_ms: 5_000,
            backfill_scan_limit: 10_000,
        }
    }
}

impl DdlConfig {
    /// Minimum residency in a visibility state before advancing.
    pub fn dwell_us(&self) -> u64 {
        5 * self.status_update_interval_ms * 1_000
    }

    /// Age after which a queued/running unit is requeued by the sweeper.
    pub fn work_stale_after_us(&self) -> u64 {
        20 * self.heartbeat_interval_ms * 1_000
    }

    /// Heartbeat silence after which a worker is marked faulty.
    pub fn worker_faulty_after_us(&self) -> u64 {
        20 * self.heartbeat_interval_ms * 1_000
    }

    /// Heartbeat silence after which a worker is evicted entirely.
    pub fn worker_evict_after_us(&self) -> u64 {
        90 * self.heartbeat_interval_ms * 1_000
    }

    /// Silence after which a worker is dropped from a broadcast barrier.
    pub fn broadcast_silent_after_us(&self) -> u64 {
        30 * self.heartbeat_interval_ms * 1_000
    }
}

#[cfg(test)]
mod tests {
    use super::DdlConfig;

    #[test]
    fn thresholds_scale_with_heartbeat_interval() {
        let cfg = DdlConfig {
            heartbeat_interval_ms: 100,
            status_update_interval_ms: 50,
            ..DdlConfig::default()
        };
        assert_eq!(cfg.work_stale_after_us(), 2_000_000);
        assert_eq!(cfg.worker_faulty_after_us(), 2_000_000);
        assert_eq!(cfg.broadcast_silent_after_us(), 3_000_000);
        assert_eq!(cfg.worker_evict_after_us(), 9_000_000);
        assert_eq!(cfg.dwell_us(), 250_000);
    }
}
