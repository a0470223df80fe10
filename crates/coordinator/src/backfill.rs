//! Worker-side backfill runtime.
//!
//! Responsibilities:
//! - execute one region backfill unit: bounded locked scan, stable merge on
//!   region start key, one-pass index record construction, batch insert;
//! - classify outcomes into the unit status taxonomy the scheduler
//!   understands;
//! - run the heartbeat pull loop: report finished/running units and barrier
//!   acks, pick up assignments and barrier payloads.
//!
//! The executor is embedded in the SQL front-end process; this module only
//! defines the seams it plugs into.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use odl_common::{IndexId, OdlError, Result};
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::coordinator::DdlCoordinator;
use crate::heartbeat::{BroadcastAck, HeartbeatRequest, HeartbeatResponse};
use crate::job::{DdlJob, RegionWork, WorkStatus};

/// How a region scan is routed, used to gate backfill eligibility.
#[derive(Debug, Clone, Copy)]
pub struct ScanRoute {
    /// Scan is served by the main table's primary-key router.
    pub routes_by_primary: bool,
    /// Scan is served by a covering index.
    pub covering: bool,
}

/// One scanned row carrying the primary-key fields and the target-index
/// fields, already encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillRow {
    /// Encoded primary key, comparable bytewise.
    pub pk_key: Vec<u8>,
    /// Full index record to insert.
    pub record: Vec<u8>,
}

/// Rows scanned from one region fragment, sorted by primary key.
#[derive(Debug, Clone)]
pub struct RegionBatch {
    /// Fragment start key; the merge across fragments is stable on it.
    pub start_key: Vec<u8>,
    /// Rows in primary-key order.
    pub rows: Vec<BackfillRow>,
}

/// Index write-path failure classes.
#[derive(Debug)]
pub enum IndexWriteError {
    /// Uniqueness violated; the whole job must roll back.
    Duplicate(String),
    /// Transient failure; the unit may be retried.
    Retryable(String),
    /// Internal corruption; the whole job must roll back.
    Internal(String),
}

/// Result envelope for one executed unit.
#[derive(Debug, Clone)]
pub struct BackfillReport {
    /// Terminal unit status to report back.
    pub status: WorkStatus,
    /// Rows scanned (and, on success, inserted).
    pub scan_size: u32,
    /// First record scanned, empty when the region was empty.
    pub first_record: Vec<u8>,
    /// Last record scanned, empty when the region was empty.
    pub last_record: Vec<u8>,
    /// Largest primary key seen, encoded; bounds future scans.
    pub max_pk_key: Vec<u8>,
}

impl BackfillReport {
    fn empty(status: WorkStatus) -> Self {
        Self {
            status,
            scan_size: 0,
            first_record: Vec::new(),
            last_record: Vec::new(),
            max_pk_key: Vec::new(),
        }
    }
}

/// Storage contract the backfill executor runs against.
pub trait BackfillStorage: Send + Sync {
    /// Resolve how the unit's scan would be routed.
    fn scan_route(&self, work: &RegionWork) -> Result<ScanRoute>;
    /// Scan up to `limit` rows from the unit's region under
    /// select-for-update semantics, one batch per region fragment.
    fn scan_for_update(&self, work: &RegionWork, limit: u32) -> Result<Vec<RegionBatch>>;
    /// Insert a batch into the secondary-index write path; returns the
    /// number of rows inserted.
    fn insert_index_batch(
        &self,
        index_id: IndexId,
        rows: &[BackfillRow],
    ) -> std::result::Result<u32, IndexWriteError>;
}

/// Applies a broadcast schema state on the worker (cache invalidation and
/// write-path switch); errors ack the barrier as failed.
pub trait SchemaApplier: Send + Sync {
    /// Adopt the broadcast schema state.
    fn adopt(&self, job: &DdlJob) -> Result<()>;
}

/// Control-plane contract used by the worker pull loop.
#[async_trait::async_trait]
pub trait DdlControlPlane: Send + Sync {
    /// Exchange one heartbeat with the coordinator.
    async fn ddl_heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatResponse>;
}

/// Executes single region units against a [`BackfillStorage`].
pub struct BackfillExecutor<S> {
    storage: Arc<S>,
    limit: u32,
}

impl<S: BackfillStorage> BackfillExecutor<S> {
    /// Executor scanning at most `limit` rows per unit.
    pub fn new(storage: Arc<S>, limit: u32) -> Self {
        Self { storage, limit }
    }

    /// Run one unit to a terminal status. Never panics; every failure is
    /// folded into the report's status.
    pub fn execute(&self, work: &RegionWork) -> BackfillReport {
        let task_id = work.task_id();
        let route = match self.storage.scan_route(work) {
            Ok(route) => route,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, operator = "Backfill", "scan route unavailable");
                return BackfillReport::empty(WorkStatus::Fail);
            }
        };
        if !(route.routes_by_primary || route.covering) {
            warn!(
                task_id = %task_id,
                operator = "Backfill",
                "scan not served by primary router or covering index"
            );
            return BackfillReport::empty(WorkStatus::Fail);
        }

        let mut batches = match self.storage.scan_for_update(work, self.limit) {
            Ok(batches) => batches,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, operator = "Backfill", "region scan failed");
                return BackfillReport::empty(WorkStatus::Fail);
            }
        };
        batches.sort_by(|a, b| a.start_key.cmp(&b.start_key));

        let mut rows: Vec<BackfillRow> = Vec::new();
        let mut max_pk_key: Vec<u8> = Vec::new();
        'scan: for batch in &batches {
            for (i, row) in batch.rows.iter().enumerate() {
                rows.push(row.clone());
                let at_limit = rows.len() as u32 == self.limit;
                // Batches are pk-sorted, so only batch tails (or the limit
                // cut) can carry the maximum.
                if i + 1 == batch.rows.len() || at_limit {
                    if row.pk_key > max_pk_key {
                        max_pk_key = row.pk_key.clone();
                    }
                }
                if at_limit {
                    break 'scan;
                }
            }
        }

        let scan_size = rows.len() as u32;
        if scan_size == 0 {
            info!(task_id = %task_id, operator = "Backfill", "region empty; nothing to insert");
            return BackfillReport::empty(WorkStatus::Done);
        }
        let first_record = rows[0].record.clone();
        let last_record = rows[rows.len() - 1].record.clone();

        let status = match self.storage.insert_index_batch(work.index_id, &rows) {
            Ok(inserted) if inserted == scan_size => {
                info!(
                    task_id = %task_id,
                    scan_size,
                    operator = "Backfill",
                    "region backfill complete"
                );
                WorkStatus::Done
            }
            Ok(inserted) => {
                error!(
                    task_id = %task_id,
                    scan_size,
                    inserted,
                    operator = "Backfill",
                    "scan and insert counts differ"
                );
                WorkStatus::Fail
            }
            Err(IndexWriteError::Duplicate(msg)) => {
                error!(task_id = %task_id, error = %msg, operator = "Backfill", "uniqueness violated");
                WorkStatus::DupUniq
            }
            Err(IndexWriteError::Retryable(msg)) => {
                warn!(task_id = %task_id, error = %msg, operator = "Backfill", "index write failed");
                WorkStatus::Fail
            }
            Err(IndexWriteError::Internal(msg)) => {
                error!(task_id = %task_id, error = %msg, operator = "Backfill", "index write corrupted");
                WorkStatus::Error
            }
        };
        BackfillReport {
            status,
            scan_size,
            first_record,
            last_record,
            max_pk_key,
        }
    }
}

#[derive(Debug, Clone)]
/// Worker resource/configuration controls.
pub struct WorkerConfig {
    /// Stable worker address used in scheduling and heartbeats.
    pub address: String,
    /// Locality tag reported on every heartbeat.
    pub physical_room: String,
    /// Whether this worker accepts DDL work at all.
    pub can_do_ddl: bool,
    /// Max concurrent unit executions.
    pub slots: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:28282".to_string(),
            physical_room: "default".to_string(),
            can_do_ddl: true,
            slots: 2,
        }
    }
}

#[derive(Default)]
struct PendingReports {
    region_works: Vec<RegionWork>,
    broadcast_acks: Vec<BroadcastAck>,
}

/// Pull-loop runtime executing assigned units and acking barriers.
pub struct BackfillWorker<C, S> {
    config: WorkerConfig,
    control_plane: Arc<C>,
    executor: Arc<BackfillExecutor<S>>,
    applier: Arc<dyn SchemaApplier>,
    slots: Arc<Semaphore>,
    pending: Arc<StdMutex<PendingReports>>,
    running: Arc<StdMutex<HashMap<String, RegionWork>>>,
}

impl<C, S> BackfillWorker<C, S>
where
    C: DdlControlPlane + 'static,
    S: BackfillStorage + 'static,
{
    /// Build a worker runtime over its control plane, executor, and schema
    /// applier.
    pub fn new(
        config: WorkerConfig,
        control_plane: Arc<C>,
        executor: Arc<BackfillExecutor<S>>,
        applier: Arc<dyn SchemaApplier>,
    ) -> Self {
        let slots = config.slots.max(1);
        Self {
            config,
            control_plane,
            executor,
            applier,
            slots: Arc::new(Semaphore::new(slots)),
            pending: Arc::new(StdMutex::new(PendingReports::default())),
            running: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// One heartbeat cycle:
    /// - report finished units, running units (as `Doing`), and barrier acks
    /// - adopt broadcast payloads and queue their acks
    /// - execute new assignments up to the slot budget
    ///
    /// Returns the number of assignments received.
    pub async fn poll_once(&self) -> Result<usize> {
        let (mut region_works, broadcast_acks) = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            (
                std::mem::take(&mut pending.region_works),
                std::mem::take(&mut pending.broadcast_acks),
            )
        };
        {
            let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            region_works.extend(running.values().cloned());
        }
        let request = HeartbeatRequest {
            address: self.config.address.clone(),
            physical_room: self.config.physical_room.clone(),
            can_do_ddl: self.config.can_do_ddl,
            region_works,
            broadcast_acks,
        };

        let response = self.control_plane.ddl_heartbeat(request).await?;

        for job in response.broadcasts {
            let status = match self.applier.adopt(&job) {
                Ok(()) => {
                    info!(
                        address = %self.config.address,
                        table_id = %job.table_id,
                        state = ?job.job_state,
                        operator = "WorkerAdopt",
                        "schema state adopted"
                    );
                    WorkStatus::Done
                }
                Err(e) => {
                    error!(
                        address = %self.config.address,
                        table_id = %job.table_id,
                        error = %e,
                        operator = "WorkerAdopt",
                        "schema adoption failed"
                    );
                    WorkStatus::Fail
                }
            };
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .broadcast_acks
                .push(BroadcastAck {
                    table_id: job.table_id,
                    status,
                });
        }

        let assignment_count = response.assignments.len();
        let mut handles = Vec::with_capacity(assignment_count);
        for work in response.assignments {
            let permit = self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| OdlError::Schedule(format!("worker slot acquire failed: {e}")))?;
            let task_id = work.task_id();
            self.running
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(task_id.clone(), work.clone());
            let executor = Arc::clone(&self.executor);
            let pending = Arc::clone(&self.pending);
            let running = Arc::clone(&self.running);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let report = executor.execute(&work);
                info!(
                    task_id = %task_id,
                    status = ?report.status,
                    scan_size = report.scan_size,
                    operator = "WorkerExecute",
                    "region unit executed"
                );
                let mut finished = work;
                finished.status = report.status;
                running
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&task_id);
                pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .region_works
                    .push(finished);
            }));
        }
        for handle in handles {
            handle
                .await
                .map_err(|e| OdlError::Schedule(format!("worker execution join error: {e}")))?;
        }

        Ok(assignment_count)
    }
}

/// In-process control-plane adapter for embedded use and tests.
pub struct InProcessControlPlane {
    coordinator: Arc<Mutex<DdlCoordinator>>,
}

impl InProcessControlPlane {
    /// Adapter backed by a shared in-memory coordinator.
    pub fn new(coordinator: Arc<Mutex<DdlCoordinator>>) -> Self {
        Self { coordinator }
    }
}

#[async_trait::async_trait]
impl DdlControlPlane for InProcessControlPlane {
    async fn ddl_heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatResponse> {
        self.coordinator.lock().await.on_heartbeat(request)
    }
}

/// Schema applier that adopts every state unconditionally; real workers
/// plug their schema-cache invalidation in here.
#[derive(Debug, Default)]
pub struct NoopSchemaApplier;

impl SchemaApplier for NoopSchemaApplier {
    fn adopt(&self, _job: &DdlJob) -> Result<()> {
        Ok(())
    }
}
