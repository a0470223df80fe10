//! Worker-pool scheduler: worker registry, per-worker work queues,
//! round-robin admission, liveness sweeps.
//!
//! The pool is purely in-memory; persistence of the status transitions it
//! produces is the caller's responsibility. Every unit lives in at most one
//! worker's `todo` or `doing` queue at any instant.

use std::collections::{BTreeMap, HashMap};

use odl_common::{DdlConfig, TableId};
use tracing::{debug, info, warn};

use crate::job::{RegionWork, WorkStatus};

/// Worker health derived from heartbeat age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Recently heartbeated; eligible for assignment.
    Healthy,
    /// Silent past the faulty threshold; skipped by admission.
    Faulty,
}

/// A known backfill worker.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    /// Worker address, unique across the pool.
    pub address: String,
    /// Locality tag reported by the worker.
    pub room: String,
    /// Current health state.
    pub state: WorkerState,
    /// Timestamp of the last heartbeat.
    pub last_seen_us: u64,
}

#[derive(Debug, Clone)]
struct QueuedWork {
    work: RegionWork,
    update_timestamp_us: u64,
}

/// Per-worker scheduling queues keyed by task id.
#[derive(Debug, Default)]
pub struct WorkerQueues {
    todo: HashMap<String, QueuedWork>,
    doing: HashMap<String, QueuedWork>,
}

impl WorkerQueues {
    /// Units waiting to be pulled by the worker.
    pub fn todo_len(&self) -> usize {
        self.todo.len()
    }

    /// Units the worker has pulled and not yet finished.
    pub fn doing_len(&self) -> usize {
        self.doing.len()
    }

    fn len(&self) -> usize {
        self.todo.len() + self.doing.len()
    }

    /// Task ids across both queues (invariant checks in tests).
    pub fn task_ids(&self) -> Vec<String> {
        self.todo.keys().chain(self.doing.keys()).cloned().collect()
    }
}

/// Tracks known workers and owns their work queues.
pub struct WorkerPool {
    max_concurrent: usize,
    work_stale_after_us: u64,
    worker_faulty_after_us: u64,
    worker_evict_after_us: u64,
    // BTreeMap so round-robin order is deterministic per worker-set snapshot.
    workers: BTreeMap<String, WorkerInfo>,
    queues: HashMap<String, WorkerQueues>,
    last_assigned: Option<String>,
}

impl WorkerPool {
    /// Pool with thresholds derived from `config`.
    pub fn new(config: &DdlConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_per_worker,
            work_stale_after_us: config.work_stale_after_us(),
            worker_faulty_after_us: config.worker_faulty_after_us(),
            worker_evict_after_us: config.worker_evict_after_us(),
            workers: BTreeMap::new(),
            queues: HashMap::new(),
            last_assigned: None,
        }
    }

    /// Record a heartbeat; first contact registers the worker.
    pub fn touch(&mut self, address: &str, room: &str, now_us: u64) {
        self.workers
            .entry(address.to_string())
            .and_modify(|info| {
                info.last_seen_us = now_us;
                info.state = WorkerState::Healthy;
                info.room = room.to_string();
            })
            .or_insert_with(|| WorkerInfo {
                address: address.to_string(),
                room: room.to_string(),
                state: WorkerState::Healthy,
                last_seen_us: now_us,
            });
    }

    /// Assign one unit to a worker, round-robin with a per-worker cap.
    ///
    /// On success the unit's `retry_time` is incremented, its `address` set,
    /// and a copy is queued on the chosen worker's `todo`. Returns the
    /// chosen address, or `None` when no healthy worker has capacity.
    pub fn submit(&mut self, work: &mut RegionWork, now_us: u64) -> Option<String> {
        let address = self.select_round_robin()?;
        work.retry_time += 1;
        work.address = address.clone();
        let task_id = work.task_id();
        self.queues.entry(address.clone()).or_default().todo.insert(
            task_id.clone(),
            QueuedWork {
                work: work.clone(),
                update_timestamp_us: now_us,
            },
        );
        info!(
            address = %address,
            task_id = %task_id,
            retry_time = work.retry_time,
            operator = "SchedulerSubmit",
            "queued region work"
        );
        Some(address)
    }

    fn select_round_robin(&mut self) -> Option<String> {
        if self.workers.is_empty() {
            return None;
        }
        // Start from the slot after the previously chosen worker.
        let candidates: Vec<String> = match &self.last_assigned {
            Some(last) => self
                .workers
                .range::<String, _>((
                    std::ops::Bound::Excluded(last.clone()),
                    std::ops::Bound::Unbounded,
                ))
                .map(|(addr, _)| addr.clone())
                .chain(
                    self.workers
                        .range::<String, _>((
                            std::ops::Bound::Unbounded,
                            std::ops::Bound::Included(last.clone()),
                        ))
                        .map(|(addr, _)| addr.clone()),
                )
                .collect(),
            None => self.workers.keys().cloned().collect(),
        };
        for address in candidates {
            let info = self.workers.get(&address)?;
            if info.state == WorkerState::Faulty {
                debug!(address = %address, operator = "SchedulerSelect", "skipping faulty worker");
                continue;
            }
            let load = self.queues.get(&address).map(WorkerQueues::len).unwrap_or(0);
            if load >= self.max_concurrent {
                continue;
            }
            self.last_assigned = Some(address.clone());
            return Some(address);
        }
        None
    }

    /// Place a unit whose durable status was `Doing` straight into the
    /// recorded worker's `doing` queue (leader takeover path).
    pub fn restore(&mut self, work: RegionWork, now_us: u64) {
        let address = work.address.clone();
        let task_id = work.task_id();
        info!(
            address = %address,
            task_id = %task_id,
            operator = "SchedulerRestore",
            "restored in-flight region work"
        );
        self.queues.entry(address).or_default().doing.insert(
            task_id,
            QueuedWork {
                work,
                update_timestamp_us: now_us,
            },
        );
    }

    /// Move all of a worker's `todo` units into `doing` and return them as
    /// assignments, marked `Doing` with a fresh timestamp.
    pub fn drain_todo(&mut self, address: &str, now_us: u64) -> Vec<RegionWork> {
        let Some(queues) = self.queues.get_mut(address) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(queues.todo.len());
        for (task_id, mut queued) in queues.todo.drain() {
            queued.work.status = WorkStatus::Doing;
            queued.work.address = address.to_string();
            queued.update_timestamp_us = now_us;
            out.push(queued.work.clone());
            queues.doing.insert(task_id, queued);
        }
        out.sort_by_key(|w| (w.table_id, w.region_id));
        out
    }

    /// Refresh the timestamp of a running unit.
    pub fn refresh_doing(&mut self, address: &str, task_id: &str, now_us: u64) -> bool {
        if let Some(queued) = self
            .queues
            .get_mut(address)
            .and_then(|q| q.doing.get_mut(task_id))
        {
            queued.update_timestamp_us = now_us;
            return true;
        }
        false
    }

    /// Remove a finished unit from the worker's `doing` queue.
    pub fn take_doing(&mut self, address: &str, task_id: &str) -> Option<RegionWork> {
        self.queues
            .get_mut(address)
            .and_then(|q| q.doing.remove(task_id))
            .map(|queued| queued.work)
    }

    /// Drop all queued units belonging to a finished job.
    pub fn clear_table(&mut self, table_id: TableId) {
        for queues in self.queues.values_mut() {
            queues.todo.retain(|_, q| q.work.table_id != table_id);
            queues.doing.retain(|_, q| q.work.table_id != table_id);
        }
    }

    /// Remove queue entries whose timestamp aged out and hand them back as
    /// `Idle` units eligible for re-admission.
    pub fn requeue_stale(&mut self, now_us: u64) -> Vec<RegionWork> {
        let stale_after_us = self.work_stale_after_us;
        let mut out = Vec::new();
        for queues in self.queues.values_mut() {
            for map in [&mut queues.todo, &mut queues.doing] {
                let stale: Vec<String> = map
                    .iter()
                    .filter(|(_, q)| now_us.saturating_sub(q.update_timestamp_us) > stale_after_us)
                    .map(|(task_id, _)| task_id.clone())
                    .collect();
                for task_id in stale {
                    if let Some(mut queued) = map.remove(&task_id) {
                        warn!(
                            task_id = %task_id,
                            address = %queued.work.address,
                            operator = "SchedulerSweep",
                            "region work timed out; resetting to idle"
                        );
                        queued.work.status = WorkStatus::Idle;
                        out.push(queued.work);
                    }
                }
            }
        }
        out
    }

    /// Mark silent workers faulty, drain their queues as `Idle` units, and
    /// evict workers silent past the eviction threshold.
    ///
    /// Returns the faulty addresses and the drained units.
    pub fn sweep_workers(&mut self, now_us: u64) -> (Vec<String>, Vec<RegionWork>) {
        let mut faulty = Vec::new();
        for info in self.workers.values_mut() {
            if now_us.saturating_sub(info.last_seen_us) > self.worker_faulty_after_us {
                if info.state != WorkerState::Faulty {
                    warn!(
                        address = %info.address,
                        operator = "SchedulerSweep",
                        "worker lost heartbeat; marking faulty"
                    );
                }
                info.state = WorkerState::Faulty;
                faulty.push(info.address.clone());
            }
        }

        let mut drained = Vec::new();
        for address in &faulty {
            if let Some(queues) = self.queues.get_mut(address) {
                for map in [&mut queues.todo, &mut queues.doing] {
                    for (task_id, mut queued) in map.drain() {
                        info!(
                            task_id = %task_id,
                            address = %address,
                            operator = "SchedulerSweep",
                            "relaunching work from faulty worker"
                        );
                        queued.work.status = WorkStatus::Idle;
                        drained.push(queued.work);
                    }
                }
            }
        }

        let evict_after = self.worker_evict_after_us;
        let doomed: Vec<String> = self
            .workers
            .values()
            .filter(|info| now_us.saturating_sub(info.last_seen_us) > evict_after)
            .map(|info| info.address.clone())
            .collect();
        for address in doomed {
            info!(address = %address, operator = "SchedulerSweep", "worker dead; evicting");
            self.workers.remove(&address);
            self.queues.remove(&address);
        }

        (faulty, drained)
    }

    /// Addresses of all healthy workers, in deterministic order.
    pub fn live_workers(&self) -> Vec<String> {
        self.workers
            .values()
            .filter(|info| info.state == WorkerState::Healthy)
            .map(|info| info.address.clone())
            .collect()
    }

    /// Registered worker count by state.
    pub fn count_by_state(&self, state: WorkerState) -> usize {
        self.workers.values().filter(|w| w.state == state).count()
    }

    /// Look up a worker's registry entry.
    pub fn worker(&self, address: &str) -> Option<&WorkerInfo> {
        self.workers.get(address)
    }

    /// Look up a worker's queues.
    pub fn queues(&self, address: &str) -> Option<&WorkerQueues> {
        self.queues.get(address)
    }

    /// All addresses that currently hold queues.
    pub fn queued_addresses(&self) -> Vec<String> {
        self.queues
            .iter()
            .filter(|(_, q)| q.len() > 0)
            .map(|(addr, _)| addr.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odl_common::{IndexId, RegionId};

    fn pool(max_concurrent: usize) -> WorkerPool {
        WorkerPool::new(&DdlConfig {
            max_concurrent_per_worker: max_concurrent,
            heartbeat_interval_ms: 10,
            ..DdlConfig::default()
        })
    }

    fn work(region: i64) -> RegionWork {
        RegionWork::new(TableId(1), RegionId(region), IndexId(2), 0, vec![], vec![])
    }

    #[test]
    fn round_robin_rotates_across_healthy_workers() {
        let mut p = pool(10);
        p.touch("w1", "r1", 0);
        p.touch("w2", "r1", 0);
        p.touch("w3", "r1", 0);

        let mut picks = Vec::new();
        for region in 0..6 {
            let mut w = work(region);
            picks.push(p.submit(&mut w, 0).expect("capacity"));
        }
        assert_eq!(picks, vec!["w1", "w2", "w3", "w1", "w2", "w3"]);
    }

    #[test]
    fn submit_skips_faulty_and_full_workers() {
        let mut p = pool(1);
        p.touch("w1", "r1", 0);
        p.touch("w2", "r1", 0);
        // w1 full
        let mut w0 = work(0);
        assert_eq!(p.submit(&mut w0, 0).expect("first"), "w1");
        // next submission skips w1 (cap 1) and lands on w2
        let mut w1 = work(1);
        assert_eq!(p.submit(&mut w1, 0).expect("second"), "w2");
        // both full now
        let mut w2 = work(2);
        assert!(p.submit(&mut w2, 0).is_none());
    }

    #[test]
    fn submit_increments_retry_time_and_sets_address() {
        let mut p = pool(10);
        p.touch("w1", "r1", 0);
        let mut w = work(0);
        p.submit(&mut w, 0).expect("capacity");
        assert_eq!(w.retry_time, 1);
        assert_eq!(w.address, "w1");
    }

    #[test]
    fn drain_todo_moves_units_to_doing_as_assignments() {
        let mut p = pool(10);
        p.touch("w1", "r1", 0);
        let mut w = work(0);
        p.submit(&mut w, 0).expect("capacity");

        let assigned = p.drain_todo("w1", 5);
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].status, WorkStatus::Doing);
        let queues = p.queues("w1").expect("queues");
        assert_eq!(queues.todo_len(), 0);
        assert_eq!(queues.doing_len(), 1);
        // second drain returns nothing
        assert!(p.drain_todo("w1", 6).is_empty());
    }

    #[test]
    fn stale_entries_are_requeued_idle() {
        let mut p = pool(10);
        p.touch("w1", "r1", 0);
        let mut w = work(0);
        p.submit(&mut w, 0).expect("capacity");
        p.drain_todo("w1", 0);

        // not yet stale
        assert!(p.requeue_stale(p.work_stale_after_us).is_empty());
        let requeued = p.requeue_stale(p.work_stale_after_us + 1);
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].status, WorkStatus::Idle);
        assert_eq!(p.queues("w1").expect("queues").doing_len(), 0);
    }

    #[test]
    fn silent_worker_goes_faulty_then_is_evicted() {
        let mut p = pool(10);
        p.touch("w1", "r1", 0);
        let mut w = work(0);
        p.submit(&mut w, 0).expect("capacity");

        let (faulty, drained) = p.sweep_workers(p.worker_faulty_after_us + 1);
        assert_eq!(faulty, vec!["w1".to_string()]);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].status, WorkStatus::Idle);
        assert_eq!(p.count_by_state(WorkerState::Faulty), 1);
        assert!(p.live_workers().is_empty());
        // faulty workers are never selected
        let mut w2 = work(1);
        assert!(p.submit(&mut w2, 0).is_none());

        let (_, _) = p.sweep_workers(p.worker_evict_after_us + 1);
        assert!(p.worker("w1").is_none());
    }

    #[test]
    fn restore_places_unit_in_recorded_workers_doing_queue() {
        let mut p = pool(10);
        let mut w = work(0);
        w.status = WorkStatus::Doing;
        w.address = "w9".to_string();
        p.restore(w, 100);
        let queues = p.queues("w9").expect("queues");
        assert_eq!(queues.doing_len(), 1);
    }

    #[test]
    fn clear_table_drops_only_that_tables_units() {
        let mut p = pool(10);
        p.touch("w1", "r1", 0);
        let mut a = work(0);
        p.submit(&mut a, 0).expect("capacity");
        let mut b = RegionWork::new(TableId(2), RegionId(0), IndexId(2), 0, vec![], vec![]);
        p.submit(&mut b, 0).expect("capacity");

        p.clear_table(TableId(1));
        let ids = p.queues("w1").expect("queues").task_ids();
        assert_eq!(ids, vec!["2_0".to_string()]);
    }
}
