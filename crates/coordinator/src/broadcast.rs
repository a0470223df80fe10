//! All-workers schema broadcast barrier.
//!
//! Before a table enters the backfill phase, every live worker must adopt
//! the write-only schema state so no transaction started under the old
//! schema can miss index maintenance. A barrier snapshots the live worker
//! set at start; workers pull the payload via heartbeat, then ack `Done` or
//! `Fail`. Workers that go silent are dropped from the barrier by the
//! sweeper (no longer present, so nothing to wait for).

use std::collections::HashMap;

use odl_common::TableId;
use tracing::{debug, info, warn};

use crate::job::{DdlJob, WorkStatus};

/// Barrier progress observed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    /// Some worker has not acked yet.
    Pending,
    /// Every worker in the barrier acked adoption.
    AllAcked,
    /// A worker reported failure; the job must roll back.
    Failed,
}

#[derive(Debug)]
struct BroadcastTask {
    job: DdlJob,
    /// Workers that have not pulled the payload yet, by last-seen timestamp.
    todo: HashMap<String, u64>,
    /// Workers that pulled the payload and have not acked, by timestamp.
    doing: HashMap<String, u64>,
    number: i64,
}

/// Pending and resolved broadcast barriers, one per table.
pub struct BroadcastSet {
    silent_after_us: u64,
    tasks: HashMap<TableId, BroadcastTask>,
    outcomes: HashMap<TableId, bool>,
}

impl BroadcastSet {
    /// Barrier set dropping workers silent longer than `silent_after_us`.
    pub fn new(silent_after_us: u64) -> Self {
        Self {
            silent_after_us,
            tasks: HashMap::new(),
            outcomes: HashMap::new(),
        }
    }

    /// Open a barrier for `job` against the current live worker set.
    pub fn start(&mut self, job: DdlJob, workers: &[String], now_us: u64) {
        let table_id = job.table_id;
        let todo: HashMap<String, u64> = workers
            .iter()
            .map(|addr| (addr.clone(), now_us))
            .collect();
        let number = todo.len() as i64;
        info!(
            table_id = %table_id,
            workers = number,
            operator = "BroadcastStart",
            "schema barrier opened"
        );
        self.tasks.insert(
            table_id,
            BroadcastTask {
                job,
                todo,
                doing: HashMap::new(),
                number,
            },
        );
    }

    /// Whether a barrier for the table is open or already resolved.
    pub fn started(&self, table_id: TableId) -> bool {
        self.tasks.contains_key(&table_id) || self.outcomes.contains_key(&table_id)
    }

    /// Hand pending payloads to a heartbeating worker, moving it `todo` ->
    /// `doing`.
    pub fn pull(&mut self, address: &str, now_us: u64) -> Vec<DdlJob> {
        let mut out = Vec::new();
        for task in self.tasks.values_mut() {
            if task.todo.remove(address).is_some() {
                task.doing.insert(address.to_string(), now_us);
                out.push(task.job.clone());
            }
        }
        out
    }

    /// Merge one worker's barrier ack.
    pub fn ack(&mut self, table_id: TableId, address: &str, status: WorkStatus, now_us: u64) {
        let Some(task) = self.tasks.get_mut(&table_id) else {
            debug!(
                table_id = %table_id,
                address = %address,
                operator = "BroadcastAck",
                "ack for unknown barrier ignored"
            );
            return;
        };
        match status {
            WorkStatus::Doing => {
                if let Some(ts) = task.doing.get_mut(address) {
                    *ts = now_us;
                } else if let Some(ts) = task.todo.get_mut(address) {
                    *ts = now_us;
                }
            }
            WorkStatus::Done => {
                if task.doing.remove(address).is_some() {
                    task.number -= 1;
                }
                if task.number <= 0 {
                    info!(
                        table_id = %table_id,
                        operator = "BroadcastAck",
                        "all workers adopted schema state"
                    );
                    self.tasks.remove(&table_id);
                    self.outcomes.insert(table_id, true);
                }
            }
            WorkStatus::Fail => {
                warn!(
                    table_id = %table_id,
                    address = %address,
                    operator = "BroadcastAck",
                    "worker failed schema adoption"
                );
                self.tasks.remove(&table_id);
                self.outcomes.insert(table_id, false);
            }
            other => {
                debug!(
                    table_id = %table_id,
                    address = %address,
                    status = ?other,
                    operator = "BroadcastAck",
                    "unexpected barrier ack status ignored"
                );
            }
        }
    }

    /// Poll barrier progress; resolves a barrier whose worker set drained.
    pub fn tick(&mut self, table_id: TableId) -> BarrierState {
        if let Some(success) = self.outcomes.get(&table_id) {
            return if *success {
                BarrierState::AllAcked
            } else {
                BarrierState::Failed
            };
        }
        if let Some(task) = self.tasks.get(&table_id) {
            if task.number <= 0 {
                self.tasks.remove(&table_id);
                self.outcomes.insert(table_id, true);
                return BarrierState::AllAcked;
            }
        }
        BarrierState::Pending
    }

    /// Drop workers silent past the threshold from every open barrier.
    pub fn sweep(&mut self, now_us: u64) {
        let silent_after_us = self.silent_after_us;
        for (table_id, task) in self.tasks.iter_mut() {
            for map in [&mut task.todo, &mut task.doing] {
                let silent: Vec<String> = map
                    .iter()
                    .filter(|(_, ts)| now_us.saturating_sub(**ts) > silent_after_us)
                    .map(|(addr, _)| addr.clone())
                    .collect();
                for address in silent {
                    warn!(
                        table_id = %table_id,
                        address = %address,
                        operator = "BroadcastSweep",
                        "worker silent; dropping from barrier"
                    );
                    map.remove(&address);
                    task.number -= 1;
                }
            }
        }
    }

    /// Remove one worker from every open barrier (faulty-worker path).
    pub fn drop_worker(&mut self, address: &str) {
        for task in self.tasks.values_mut() {
            if task.todo.remove(address).is_some() {
                task.number -= 1;
            }
            if task.doing.remove(address).is_some() {
                task.number -= 1;
            }
        }
    }

    /// Forget a table's barrier and outcome.
    pub fn clear(&mut self, table_id: TableId) {
        self.tasks.remove(&table_id);
        self.outcomes.remove(&table_id);
    }

    /// Open barriers awaiting resolution.
    pub fn pending_count(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odl_common::IndexId;

    fn job() -> DdlJob {
        DdlJob::add_index(TableId(1), IndexId(2))
    }

    fn workers(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("w{i}")).collect()
    }

    #[test]
    fn barrier_resolves_after_every_worker_acks() {
        let mut b = BroadcastSet::new(1_000);
        b.start(job(), &workers(2), 0);
        assert_eq!(b.tick(TableId(1)), BarrierState::Pending);

        assert_eq!(b.pull("w1", 1).len(), 1);
        b.ack(TableId(1), "w1", WorkStatus::Done, 2);
        assert_eq!(b.tick(TableId(1)), BarrierState::Pending);

        assert_eq!(b.pull("w2", 3).len(), 1);
        b.ack(TableId(1), "w2", WorkStatus::Done, 4);
        assert_eq!(b.tick(TableId(1)), BarrierState::AllAcked);
    }

    #[test]
    fn one_failed_worker_fails_the_barrier() {
        let mut b = BroadcastSet::new(1_000);
        b.start(job(), &workers(2), 0);
        b.pull("w1", 1);
        b.ack(TableId(1), "w1", WorkStatus::Fail, 2);
        assert_eq!(b.tick(TableId(1)), BarrierState::Failed);
    }

    #[test]
    fn ack_done_without_pull_does_not_decrement() {
        let mut b = BroadcastSet::new(1_000);
        b.start(job(), &workers(1), 0);
        // never pulled, so the ack is not counted
        b.ack(TableId(1), "w1", WorkStatus::Done, 1);
        assert_eq!(b.tick(TableId(1)), BarrierState::Pending);
    }

    #[test]
    fn silent_workers_are_dropped_and_barrier_can_drain() {
        let mut b = BroadcastSet::new(1_000);
        b.start(job(), &workers(2), 0);
        b.pull("w1", 0);
        b.ack(TableId(1), "w1", WorkStatus::Done, 0);
        // w2 never pulls; it goes silent past the threshold
        b.sweep(2_000);
        assert_eq!(b.tick(TableId(1)), BarrierState::AllAcked);
    }

    #[test]
    fn empty_worker_set_resolves_immediately() {
        let mut b = BroadcastSet::new(1_000);
        b.start(job(), &[], 0);
        assert_eq!(b.tick(TableId(1)), BarrierState::AllAcked);
    }

    #[test]
    fn doing_ack_refreshes_timestamp_and_survives_sweep() {
        let mut b = BroadcastSet::new(1_000);
        b.start(job(), &workers(1), 0);
        b.pull("w1", 0);
        b.ack(TableId(1), "w1", WorkStatus::Doing, 1_500);
        b.sweep(2_000);
        assert_eq!(b.tick(TableId(1)), BarrierState::Pending);
        b.ack(TableId(1), "w1", WorkStatus::Done, 2_100);
        assert_eq!(b.tick(TableId(1)), BarrierState::AllAcked);
    }
}
