//! Durable model types for table-level DDL jobs and per-region backfill units.

use odl_common::{IndexId, OdlError, RegionId, Result, TableId};
use serde::{Deserialize, Serialize};

/// Index visibility states, traversed in a strict monotone order.
///
/// Forward chain (add): `None -> DeleteOnly -> WriteOnly -> WriteLocal -> Public`.
/// Inverse chain (drop): `Public -> WriteOnly -> DeleteOnly -> None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Index is hidden from all query/write paths.
    None,
    /// Deletes propagate to the index; nothing else does.
    DeleteOnly,
    /// Writes propagate; reads still ignore the index.
    WriteOnly,
    /// Backfill phase: writes propagate and historical rows are being filled.
    WriteLocal,
    /// Index is fully visible.
    Public,
}

/// Table-level DDL operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DdlOp {
    /// Build a global secondary index online.
    AddGlobalIndex,
    /// Remove a global secondary index online.
    DropGlobalIndex,
}

impl DdlOp {
    /// Stable label for logs/metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            DdlOp::AddGlobalIndex => "add_global_index",
            DdlOp::DropGlobalIndex => "drop_global_index",
        }
    }
}

/// Job-level outcome reported through the catalog query path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrCode {
    /// Job is still being driven by the controller.
    InProcess,
    /// Job reached its terminal visibility state.
    Success,
    /// Job was rolled back.
    ExecFail,
}

impl JobErrCode {
    /// Stable label for logs/metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            JobErrCode::InProcess => "in_process",
            JobErrCode::Success => "success",
            JobErrCode::ExecFail => "exec_fail",
        }
    }
}

/// Status of one region backfill unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    /// Not assigned to any worker; eligible for admission.
    Idle,
    /// Queued on or running at a worker.
    Doing,
    /// Completed normally.
    Done,
    /// Failed; retryable while the retry budget lasts.
    Fail,
    /// Uniqueness violated while building the index; rolls the job back.
    DupUniq,
    /// Internal worker failure; rolls the job back.
    Error,
}

/// One table-level DDL operation, keyed by its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlJob {
    /// Table the job operates on; at most one job per table.
    pub table_id: TableId,
    /// Operation kind.
    pub op: DdlOp,
    /// Target index.
    pub index_id: IndexId,
    /// Last visibility state published by the controller.
    pub job_state: IndexState,
    /// Job outcome; `InProcess` until terminal.
    pub errcode: JobErrCode,
    /// Paused by an external request; in-flight state is preserved.
    pub suspended: bool,
    /// Set once a dropped index has been removed from the catalog.
    pub deleted: bool,
}

impl DdlJob {
    /// New add-index job starting from the hidden state.
    pub fn add_index(table_id: TableId, index_id: IndexId) -> Self {
        Self {
            table_id,
            op: DdlOp::AddGlobalIndex,
            index_id,
            job_state: IndexState::None,
            errcode: JobErrCode::InProcess,
            suspended: false,
            deleted: false,
        }
    }

    /// New drop-index job starting from the public state.
    pub fn drop_index(table_id: TableId, index_id: IndexId) -> Self {
        Self {
            table_id,
            op: DdlOp::DropGlobalIndex,
            index_id,
            job_state: IndexState::Public,
            errcode: JobErrCode::InProcess,
            suspended: false,
            deleted: false,
        }
    }

    /// Serialize for the meta store.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| OdlError::Persistence(format!("ddl job encode failed: {e}")))
    }

    /// Deserialize from the meta store.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| OdlError::Persistence(format!("ddl job decode failed: {e}")))
    }
}

/// One backfill task for one region of a job's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionWork {
    /// Owning job's table.
    pub table_id: TableId,
    /// Region this unit covers; unique within its job.
    pub region_id: RegionId,
    /// Index being built.
    pub index_id: IndexId,
    /// Partition the region belongs to.
    pub partition: i64,
    /// Inclusive scan lower bound.
    pub start_key: Vec<u8>,
    /// Exclusive scan upper bound.
    pub end_key: Vec<u8>,
    /// Current unit status.
    pub status: WorkStatus,
    /// Submission count; bounded by the retry budget before rollback.
    pub retry_time: u32,
    /// Assigned worker address; empty while unassigned.
    pub address: String,
}

impl RegionWork {
    /// New idle unit for one region of `table_id`.
    pub fn new(
        table_id: TableId,
        region_id: RegionId,
        index_id: IndexId,
        partition: i64,
        start_key: Vec<u8>,
        end_key: Vec<u8>,
    ) -> Self {
        Self {
            table_id,
            region_id,
            index_id,
            partition,
            start_key,
            end_key,
            status: WorkStatus::Idle,
            retry_time: 0,
            address: String::new(),
        }
    }

    /// Scheduler-wide unit key, `"{table_id}_{region_id}"`.
    pub fn task_id(&self) -> String {
        format!("{}_{}", self.table_id, self.region_id)
    }

    /// Serialize for the meta store.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| OdlError::Persistence(format!("region work encode failed: {e}")))
    }

    /// Deserialize from the meta store.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| OdlError::Persistence(format!("region work decode failed: {e}")))
    }
}
