//! Table-level DDL controller and scheduling entry points.
//!
//! Responsibilities:
//! - drive each job through its visibility-state chain under a dwell policy;
//! - admit per-region backfill units into the worker pool with batch and
//!   ratio caps;
//! - gate the write-only -> write-local transition on the all-workers
//!   broadcast barrier;
//! - merge worker heartbeats (status reports, barrier acks, assignment
//!   pulls);
//! - roll jobs back on data-fatal statuses, retry exhaustion, or barrier
//!   failure, and clean up terminal jobs through the consensus log;
//! - rehydrate every in-flight job and unit from the meta store on leader
//!   takeover.
//!
//! Persistence rule: terminal unit transitions are appended to the
//! consensus log before memory is updated; only the transient Idle->Doing
//! admission is memory-first (the sweeper reconciles it).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use odl_common::metrics::global_metrics;
use odl_common::{DdlConfig, IndexId, OdlError, RegionId, Result, TableId};
use odl_store::{keys, MetaStore};
use tracing::{debug, error, info, warn};

use crate::broadcast::{BarrierState, BroadcastSet};
use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::consensus::{ConsensusLog, ConsensusOp};
use crate::heartbeat::{HeartbeatRequest, HeartbeatResponse};
use crate::job::{DdlJob, DdlOp, IndexState, JobErrCode, RegionWork, WorkStatus};
use crate::scheduler::{WorkerPool, WorkerState};

/// Minimum-residency gate for visibility-state transitions.
///
/// The first visit to a `(table, state)` pair only records the entry time;
/// later visits allow advancing once the residency exceeds the dwell
/// window, which gives caches and workers time to observe the previous
/// state through normal schema propagation.
#[derive(Debug, Default)]
struct DwellPolicy {
    min_residency_us: u64,
    entered_at: HashMap<(TableId, IndexState), u64>,
}

impl DwellPolicy {
    fn new(min_residency_us: u64) -> Self {
        Self {
            min_residency_us,
            entered_at: HashMap::new(),
        }
    }

    fn should_advance(&mut self, table_id: TableId, state: IndexState, now_us: u64) -> bool {
        match self.entered_at.entry((table_id, state)) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(now_us);
                false
            }
            std::collections::hash_map::Entry::Occupied(slot) => {
                now_us.saturating_sub(*slot.get()) > self.min_residency_us
            }
        }
    }

    fn clear(&mut self, table_id: TableId) {
        self.entered_at.retain(|(t, _), _| *t != table_id);
    }
}

/// Leader-side coordinator owning all in-memory DDL state.
///
/// All mutation goes through `&mut self`; the RPC layer serializes access
/// through a single `Arc<Mutex<DdlCoordinator>>`. The meta store holds the
/// canonical state; the maps here are derived views rebuilt by
/// [`DdlCoordinator::rehydrate`] on leader takeover.
pub struct DdlCoordinator {
    config: DdlConfig,
    clock: Arc<dyn Clock>,
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn MetaStore>,
    consensus: Arc<dyn ConsensusLog>,
    pool: WorkerPool,
    broadcast: BroadcastSet,
    jobs: HashMap<TableId, DdlJob>,
    region_work: HashMap<TableId, BTreeMap<RegionId, RegionWork>>,
    doing_counts: HashMap<TableId, i64>,
    dwell: DwellPolicy,
}

impl DdlCoordinator {
    /// Build a coordinator over its four external seams.
    pub fn new(
        config: DdlConfig,
        clock: Arc<dyn Clock>,
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn MetaStore>,
        consensus: Arc<dyn ConsensusLog>,
    ) -> Self {
        let pool = WorkerPool::new(&config);
        let broadcast = BroadcastSet::new(config.broadcast_silent_after_us());
        let dwell = DwellPolicy::new(config.dwell_us());
        Self {
            config,
            clock,
            catalog,
            store,
            consensus,
            pool,
            broadcast,
            jobs: HashMap::new(),
            region_work: HashMap::new(),
            doing_counts: HashMap::new(),
            dwell,
        }
    }

    /// Coordinator configuration.
    pub fn config(&self) -> &DdlConfig {
        &self.config
    }

    /// Start an add-global-index job: persist the job record, register the
    /// hidden index state, and create one idle unit per region.
    pub fn submit_add_index(&mut self, table_id: TableId, index_id: IndexId) -> Result<()> {
        if self.jobs.contains_key(&table_id) {
            return Err(OdlError::Schedule(format!(
                "table {table_id} already has a ddl job running"
            )));
        }
        let job = DdlJob::add_index(table_id, index_id);
        self.store
            .put(keys::ddl_job_key(table_id), job.encode()?)?;
        self.catalog.publish_index_state(&job)?;

        let regions = self.catalog.regions(table_id)?;
        info!(
            table_id = %table_id,
            index_id = %index_id,
            regions = regions.len(),
            operator = "DdlSubmit",
            "add global index job initialized"
        );
        let mut map = BTreeMap::new();
        for desc in regions {
            let work = RegionWork::new(
                table_id,
                desc.region_id,
                index_id,
                desc.partition,
                desc.start_key,
                desc.end_key,
            );
            self.store.put(
                keys::region_work_key(table_id, desc.region_id),
                work.encode()?,
            )?;
            map.insert(desc.region_id, work);
        }
        self.region_work.insert(table_id, map);
        self.jobs.insert(table_id, job);
        Ok(())
    }

    /// Start a drop-global-index job walking the inverse state chain.
    pub fn submit_drop_index(&mut self, table_id: TableId, index_id: IndexId) -> Result<()> {
        if self.jobs.contains_key(&table_id) {
            return Err(OdlError::Schedule(format!(
                "table {table_id} already has a ddl job running"
            )));
        }
        // The index must be known before we start walking it down.
        self.catalog.index_state(table_id, index_id)?;
        let job = DdlJob::drop_index(table_id, index_id);
        self.store
            .put(keys::ddl_job_key(table_id), job.encode()?)?;
        info!(
            table_id = %table_id,
            index_id = %index_id,
            operator = "DdlSubmit",
            "drop global index job initialized"
        );
        self.jobs.insert(table_id, job);
        Ok(())
    }

    /// Pause a job; in-flight state is preserved and no progress is made.
    pub fn suspend(&mut self, table_id: TableId) -> Result<()> {
        if !self.jobs.contains_key(&table_id) {
            return Err(OdlError::Schedule(format!("no ddl job for table {table_id}")));
        }
        self.consensus
            .append(&ConsensusOp::SuspendDdlWork { table_id })?;
        if let Some(job) = self.jobs.get_mut(&table_id) {
            job.suspended = true;
        }
        info!(table_id = %table_id, operator = "DdlSuspend", "job suspended");
        Ok(())
    }

    /// Resume a suspended job.
    pub fn resume(&mut self, table_id: TableId) -> Result<()> {
        if !self.jobs.contains_key(&table_id) {
            return Err(OdlError::Schedule(format!("no ddl job for table {table_id}")));
        }
        self.consensus
            .append(&ConsensusOp::RestartDdlWork { table_id })?;
        if let Some(job) = self.jobs.get_mut(&table_id) {
            job.suspended = false;
        }
        info!(table_id = %table_id, operator = "DdlSuspend", "job resumed");
        Ok(())
    }

    /// Merge one worker heartbeat and build its response.
    ///
    /// Order matters: the worker's reports and barrier acks are applied
    /// first, then new assignments and barrier payloads are drained, so a
    /// unit the worker just returned is never re-emitted in the same beat.
    pub fn on_heartbeat(&mut self, request: HeartbeatRequest) -> Result<HeartbeatResponse> {
        if !request.can_do_ddl {
            return Ok(HeartbeatResponse::default());
        }
        let now = self.clock.now_us();
        self.pool.touch(&request.address, &request.physical_room, now);

        for work in request.region_works {
            let task_id = work.task_id();
            match work.status {
                WorkStatus::Doing => {
                    self.pool.refresh_doing(&work.address, &task_id, now);
                }
                _ => {
                    if self.pool.take_doing(&work.address, &task_id).is_some() {
                        info!(
                            task_id = %task_id,
                            status = ?work.status,
                            address = %work.address,
                            operator = "Heartbeat",
                            "region work finished"
                        );
                        self.update_region_work(work)?;
                    } else {
                        debug!(
                            task_id = %task_id,
                            status = ?work.status,
                            operator = "Heartbeat",
                            "stale report for unqueued work ignored"
                        );
                    }
                }
            }
        }

        for ack in request.broadcast_acks {
            self.broadcast
                .ack(ack.table_id, &request.address, ack.status, now);
        }

        let assignments = self.pool.drain_todo(&request.address, now);
        for work in &assignments {
            debug!(
                task_id = %work.task_id(),
                address = %request.address,
                operator = "Heartbeat",
                "assigned region work"
            );
            global_metrics().inc_work_assigned(work.table_id.0);
            self.update_region_work(work.clone())?;
        }

        let broadcasts = self.broadcast.pull(&request.address, now);

        Ok(HeartbeatResponse {
            assignments,
            broadcasts,
        })
    }

    /// One controller cycle: finish terminal jobs, then advance each active,
    /// non-suspended job by at most one transition.
    pub fn tick(&mut self) -> Result<()> {
        let started = Instant::now();

        let terminal: Vec<DdlJob> = self
            .jobs
            .values()
            .filter(|j| j.errcode != JobErrCode::InProcess)
            .cloned()
            .collect();
        for job in terminal {
            self.finish_job(&job)?;
        }

        let active: Vec<DdlJob> = self
            .jobs
            .values()
            .filter(|j| j.errcode == JobErrCode::InProcess)
            .cloned()
            .collect();
        for job in active {
            if job.suspended {
                info!(table_id = %job.table_id, operator = "DdlTick", "job is suspended");
                continue;
            }
            match job.op {
                DdlOp::AddGlobalIndex => self.advance_add(job)?,
                DdlOp::DropGlobalIndex => self.advance_drop(job)?,
            }
        }

        global_metrics().set_jobs_active(self.jobs.len() as u64);
        global_metrics().observe_tick_seconds(started.elapsed().as_secs_f64());
        Ok(())
    }

    /// One sweeper cycle: requeue timed-out units, prune silent workers
    /// from barriers, mark/evict faulty workers and relaunch their work.
    pub fn sweep(&mut self) -> Result<()> {
        let now = self.clock.now_us();

        for work in self.pool.requeue_stale(now) {
            global_metrics().inc_work_requeued(work.table_id.0);
            self.update_region_work(work)?;
        }

        self.broadcast.sweep(now);

        let (faulty, drained) = self.pool.sweep_workers(now);
        for work in drained {
            global_metrics().inc_work_requeued(work.table_id.0);
            self.update_region_work(work)?;
        }
        for address in &faulty {
            self.broadcast.drop_worker(address);
        }

        global_metrics().set_workers("healthy", self.pool.count_by_state(WorkerState::Healthy) as u64);
        global_metrics().set_workers("faulty", self.pool.count_by_state(WorkerState::Faulty) as u64);
        global_metrics().set_broadcast_pending(self.broadcast.pending_count() as u64);
        Ok(())
    }

    /// Rebuild all in-memory state from the meta store (leader takeover).
    ///
    /// Every unit whose durable status is `Doing` is restored into its
    /// recorded worker's queue, and the per-table doing counter is reset to
    /// the count of such units; stale queues from any previous leadership
    /// stint are discarded wholesale.
    pub fn rehydrate(&mut self) -> Result<()> {
        let now = self.clock.now_us();
        self.pool = WorkerPool::new(&self.config);
        self.broadcast = BroadcastSet::new(self.config.broadcast_silent_after_us());
        self.dwell = DwellPolicy::new(self.config.dwell_us());
        self.jobs.clear();
        self.region_work.clear();
        self.doing_counts.clear();

        for (_, value) in self.store.scan_prefix(&keys::ddl_job_prefix())? {
            match DdlJob::decode(&value) {
                Ok(job) => {
                    info!(
                        table_id = %job.table_id,
                        state = ?job.job_state,
                        operator = "DdlRehydrate",
                        "loaded job snapshot"
                    );
                    self.jobs.insert(job.table_id, job);
                }
                Err(e) => error!(error = %e, operator = "DdlRehydrate", "job snapshot decode failed"),
            }
        }

        for (_, value) in self.store.scan_prefix(&keys::region_work_namespace())? {
            let work = match RegionWork::decode(&value) {
                Ok(work) => work,
                Err(e) => {
                    error!(error = %e, operator = "DdlRehydrate", "region snapshot decode failed");
                    continue;
                }
            };
            if work.status == WorkStatus::Doing {
                *self.doing_counts.entry(work.table_id).or_insert(0) += 1;
                self.pool.restore(work.clone(), now);
            }
            self.region_work
                .entry(work.table_id)
                .or_default()
                .insert(work.region_id, work);
        }

        info!(
            jobs = self.jobs.len(),
            tables_with_work = self.region_work.len(),
            operator = "DdlRehydrate",
            "leader state rebuilt"
        );
        Ok(())
    }

    /// Current job snapshot for a table, if one is in flight.
    pub fn job(&self, table_id: TableId) -> Option<DdlJob> {
        self.jobs.get(&table_id).cloned()
    }

    /// All region work snapshots for a table, in region order.
    pub fn region_works(&self, table_id: TableId) -> Vec<RegionWork> {
        self.region_work
            .get(&table_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of units currently counted as running for a table.
    pub fn doing_count(&self, table_id: TableId) -> i64 {
        self.doing_counts.get(&table_id).copied().unwrap_or(0)
    }

    /// Read access to the worker pool (introspection/invariant checks).
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Read access to the broadcast barriers.
    pub fn broadcast(&self) -> &BroadcastSet {
        &self.broadcast
    }

    // ---- internal state machine ----

    fn advance_add(&mut self, mut job: DdlJob) -> Result<()> {
        let table_id = job.table_id;
        let now = self.clock.now_us();
        let state = match self.catalog.index_state(table_id, job.index_id) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    table_id = %table_id,
                    index_id = %job.index_id,
                    error = %e,
                    operator = "DdlTick",
                    "index not readable yet; retrying next cycle"
                );
                return Ok(());
            }
        };
        match state {
            IndexState::None => {
                if self.dwell.should_advance(table_id, state, now) {
                    job.job_state = IndexState::DeleteOnly;
                    self.publish_state(job);
                }
            }
            IndexState::DeleteOnly => {
                if self.dwell.should_advance(table_id, state, now) {
                    job.job_state = IndexState::WriteOnly;
                    self.publish_state(job);
                }
            }
            IndexState::WriteOnly => {
                if !self.broadcast.started(table_id) {
                    let workers = self.pool.live_workers();
                    self.broadcast.start(job.clone(), &workers, now);
                } else {
                    match self.broadcast.tick(table_id) {
                        BarrierState::AllAcked => {
                            info!(
                                table_id = %table_id,
                                operator = "DdlTick",
                                "barrier complete; entering backfill"
                            );
                            self.broadcast.clear(table_id);
                            job.job_state = IndexState::WriteLocal;
                            self.publish_state(job);
                        }
                        BarrierState::Failed => {
                            warn!(
                                table_id = %table_id,
                                operator = "DdlTick",
                                "barrier failed; rolling back"
                            );
                            self.broadcast.clear(table_id);
                            self.rollback(&mut job);
                        }
                        BarrierState::Pending => {
                            debug!(table_id = %table_id, operator = "DdlTick", "waiting for barrier acks");
                        }
                    }
                }
            }
            IndexState::WriteLocal => self.advance_backfill(job)?,
            IndexState::Public => {
                debug!(table_id = %table_id, operator = "DdlTick", "index already public");
            }
        }
        Ok(())
    }

    fn advance_backfill(&mut self, mut job: DdlJob) -> Result<()> {
        let table_id = job.table_id;
        let now = self.clock.now_us();
        let region_count = match self.catalog.region_count(table_id) {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    table_id = %table_id,
                    error = %e,
                    operator = "DdlBackfill",
                    "region topology unavailable; retrying next cycle"
                );
                return Ok(());
            }
        };
        let cap = (region_count * self.config.max_region_ratio) as i64;
        if cap > 0 && self.doing_count(table_id) >= cap {
            info!(
                table_id = %table_id,
                cap,
                operator = "DdlBackfill",
                "doing budget exhausted; waiting"
            );
            return Ok(());
        }
        let Some(region_ids) = self
            .region_work
            .get(&table_id)
            .map(|m| m.keys().copied().collect::<Vec<_>>())
        else {
            warn!(table_id = %table_id, operator = "DdlBackfill", "no region work map; nothing to do");
            return Ok(());
        };

        let mut done = true;
        let mut rollback = false;
        let mut admitted = 0usize;
        let mut waiting = 0usize;

        for region_id in region_ids {
            let Some(work) = self
                .region_work
                .get(&table_id)
                .and_then(|m| m.get(&region_id))
                .cloned()
            else {
                continue;
            };
            match work.status {
                WorkStatus::Idle => {
                    done = false;
                    if self.doing_count(table_id) >= cap {
                        info!(table_id = %table_id, operator = "DdlBackfill", "doing budget reached");
                        break;
                    }
                    let mut unit = work;
                    if self.pool.submit(&mut unit, now).is_some() {
                        unit.status = WorkStatus::Doing;
                        self.memoize_work(unit);
                        self.inc_doing(table_id);
                        admitted += 1;
                        if admitted >= self.config.max_batch_per_tick {
                            info!(table_id = %table_id, operator = "DdlBackfill", "batch limit; next round");
                            break;
                        }
                    } else {
                        info!(table_id = %table_id, operator = "DdlBackfill", "no worker capacity");
                        break;
                    }
                }
                WorkStatus::Doing => {
                    done = false;
                    waiting += 1;
                }
                WorkStatus::Done => {}
                WorkStatus::Fail => {
                    done = false;
                    if work.retry_time < self.config.max_retry {
                        if self.doing_count(table_id) >= cap {
                            info!(table_id = %table_id, operator = "DdlBackfill", "doing budget reached");
                            break;
                        }
                        let mut unit = work;
                        if self.pool.submit(&mut unit, now).is_some() {
                            info!(
                                task_id = %unit.task_id(),
                                retry_time = unit.retry_time,
                                operator = "DdlBackfill",
                                "retrying failed region work"
                            );
                            global_metrics().inc_work_retries(table_id.0);
                            unit.status = WorkStatus::Doing;
                            self.memoize_work(unit);
                            self.inc_doing(table_id);
                        }
                    } else {
                        error!(
                            task_id = %work.task_id(),
                            retry_time = work.retry_time,
                            operator = "DdlBackfill",
                            "retry budget exhausted; rolling back"
                        );
                        rollback = true;
                    }
                }
                WorkStatus::DupUniq | WorkStatus::Error => {
                    error!(
                        task_id = %work.task_id(),
                        status = ?work.status,
                        operator = "DdlBackfill",
                        "data-fatal region status; rolling back"
                    );
                    done = false;
                    rollback = true;
                }
            }
            if rollback {
                break;
            }
        }

        if rollback {
            self.rollback(&mut job);
        } else if done {
            info!(table_id = %table_id, operator = "DdlBackfill", "all regions backfilled");
            job.job_state = IndexState::Public;
            job.errcode = JobErrCode::Success;
            self.publish_state(job);
        } else {
            debug!(
                table_id = %table_id,
                waiting,
                admitted,
                operator = "DdlBackfill",
                "backfill in progress"
            );
        }
        Ok(())
    }

    fn advance_drop(&mut self, mut job: DdlJob) -> Result<()> {
        let table_id = job.table_id;
        let now = self.clock.now_us();
        let state = match self.catalog.index_state(table_id, job.index_id) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    table_id = %table_id,
                    index_id = %job.index_id,
                    error = %e,
                    operator = "DdlTick",
                    "index not readable yet; retrying next cycle"
                );
                return Ok(());
            }
        };
        if !self.dwell.should_advance(table_id, state, now) {
            return Ok(());
        }
        match state {
            IndexState::Public | IndexState::WriteLocal => {
                job.job_state = IndexState::WriteOnly;
                self.publish_state(job);
            }
            IndexState::WriteOnly => {
                job.job_state = IndexState::DeleteOnly;
                self.publish_state(job);
            }
            IndexState::DeleteOnly => {
                job.job_state = IndexState::None;
                self.publish_state(job);
            }
            IndexState::None => {
                job.deleted = true;
                job.errcode = JobErrCode::Success;
                if let Err(e) = self.catalog.publish_index_state(&job) {
                    warn!(
                        table_id = %table_id,
                        error = %e,
                        operator = "DdlTick",
                        "catalog publish failed; retrying next cycle"
                    );
                    return Ok(());
                }
                self.consensus
                    .append(&ConsensusOp::DeleteDdlWork { table_id })?;
                self.consensus.append(&ConsensusOp::RemoveGlobalIndexData {
                    table_id,
                    index_id: job.index_id,
                })?;
                self.cleanup_memory(table_id);
                global_metrics().inc_job_finished(job.op.as_str(), job.errcode.as_str());
                info!(
                    table_id = %table_id,
                    index_id = %job.index_id,
                    operator = "DdlTick",
                    "drop global index finished"
                );
            }
        }
        Ok(())
    }

    fn finish_job(&mut self, job: &DdlJob) -> Result<()> {
        let table_id = job.table_id;
        self.consensus
            .append(&ConsensusOp::DeleteDdlWork { table_id })?;
        self.cleanup_memory(table_id);
        if job.errcode == JobErrCode::ExecFail && job.op == DdlOp::AddGlobalIndex {
            info!(
                table_id = %table_id,
                index_id = %job.index_id,
                operator = "DdlFinish",
                "dropping partially built index after rollback"
            );
            self.catalog.drop_index(job)?;
        }
        global_metrics().inc_job_finished(job.op.as_str(), job.errcode.as_str());
        info!(
            table_id = %table_id,
            op = job.op.as_str(),
            outcome = job.errcode.as_str(),
            operator = "DdlFinish",
            "ddl job finished"
        );
        Ok(())
    }

    fn cleanup_memory(&mut self, table_id: TableId) {
        self.jobs.remove(&table_id);
        self.region_work.remove(&table_id);
        self.doing_counts.remove(&table_id);
        self.dwell.clear(table_id);
        self.broadcast.clear(table_id);
        self.pool.clear_table(table_id);
    }

    fn rollback(&mut self, job: &mut DdlJob) {
        warn!(
            table_id = %job.table_id,
            op = job.op.as_str(),
            operator = "DdlRollback",
            "rolling back ddl job"
        );
        job.errcode = JobErrCode::ExecFail;
        self.jobs.insert(job.table_id, job.clone());
        self.dwell.clear(job.table_id);
    }

    /// Memoize a new job state and publish it to the catalog. A failed
    /// publish is retried naturally: the catalog still reports the old
    /// state, so the dwell gate fires again next cycle.
    fn publish_state(&mut self, job: DdlJob) {
        info!(
            table_id = %job.table_id,
            state = ?job.job_state,
            operator = "DdlPublish",
            "advancing index state"
        );
        self.jobs.insert(job.table_id, job.clone());
        if let Err(e) = self.catalog.publish_index_state(&job) {
            warn!(
                table_id = %job.table_id,
                error = %e,
                operator = "DdlPublish",
                "catalog publish failed; will retry next cycle"
            );
        }
    }

    /// Persist one unit's status through the consensus log, then update the
    /// in-memory view; any non-`Doing` status releases one slot of the
    /// table's doing budget.
    fn update_region_work(&mut self, work: RegionWork) -> Result<()> {
        let release = work.status != WorkStatus::Doing;
        self.consensus
            .append(&ConsensusOp::UpdateRegionWork { work: work.clone() })?;
        let table_id = work.table_id;
        self.memoize_work(work);
        if release {
            self.dec_doing(table_id);
        }
        Ok(())
    }

    fn memoize_work(&mut self, work: RegionWork) {
        if let Some(map) = self.region_work.get_mut(&work.table_id) {
            map.insert(work.region_id, work);
        }
    }

    fn inc_doing(&mut self, table_id: TableId) -> i64 {
        let count = self.doing_counts.entry(table_id).or_insert(0);
        *count += 1;
        global_metrics().set_work_doing(table_id.0, *count as u64);
        *count
    }

    fn dec_doing(&mut self, table_id: TableId) {
        if let Some(count) = self.doing_counts.get_mut(&table_id) {
            *count = (*count - 1).max(0);
            global_metrics().set_work_doing(table_id.0, *count as u64);
        }
    }
}
