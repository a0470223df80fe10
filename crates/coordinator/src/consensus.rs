//! Consensus-log seam.
//!
//! The coordinator treats replication as an opaque "apply this state change"
//! primitive: it appends an operation, and only after the append succeeds
//! does it update its in-memory views. [`StoreConsensus`] is the local
//! implementation that applies operation effects directly to a
//! [`MetaStore`]; a replicated deployment substitutes its own log whose
//! state machine performs the same [`StoreConsensus::apply`].

use std::sync::Arc;

use odl_common::{IndexId, Result, TableId};
use odl_store::{keys, MetaStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::job::{DdlJob, RegionWork};

/// Replicated state-change operations consumed by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum ConsensusOp {
    /// Persist one region's work status.
    UpdateRegionWork {
        /// Full region work record to store.
        work: RegionWork,
    },
    /// Terminal cleanup: remove the job record and all its region rows.
    DeleteDdlWork {
        /// Job table.
        table_id: TableId,
    },
    /// Pause a job, preserving in-flight state.
    SuspendDdlWork {
        /// Job table.
        table_id: TableId,
    },
    /// Resume a suspended job.
    RestartDdlWork {
        /// Job table.
        table_id: TableId,
    },
    /// Ask storage to reclaim dropped/rolled-back index data.
    RemoveGlobalIndexData {
        /// Job table.
        table_id: TableId,
        /// Index whose data is reclaimed.
        index_id: IndexId,
    },
}

/// Append-only replication contract.
///
/// `append` returns once the operation is durably applied; callers then
/// update memory (persist-then-memoize). Every operation is idempotent.
pub trait ConsensusLog: Send + Sync {
    /// Replicate and apply one operation.
    fn append(&self, op: &ConsensusOp) -> Result<()>;
}

/// Local consensus implementation applying directly to a meta store.
pub struct StoreConsensus {
    store: Arc<dyn MetaStore>,
}

impl StoreConsensus {
    /// Consensus seam over `store`.
    pub fn new(store: Arc<dyn MetaStore>) -> Self {
        Self { store }
    }

    /// Apply one operation's durable effects to `store`.
    ///
    /// This is the state-machine side of the log; replicated deployments
    /// call it from their apply callback.
    pub fn apply(store: &dyn MetaStore, op: &ConsensusOp) -> Result<()> {
        match op {
            ConsensusOp::UpdateRegionWork { work } => {
                store.put(
                    keys::region_work_key(work.table_id, work.region_id),
                    work.encode()?,
                )?;
            }
            ConsensusOp::DeleteDdlWork { table_id } => {
                store.delete(&keys::ddl_job_key(*table_id))?;
                store.remove_range(
                    &keys::region_work_prefix(*table_id),
                    &keys::region_work_range_end(*table_id),
                )?;
            }
            ConsensusOp::SuspendDdlWork { table_id } => {
                set_suspended(store, *table_id, true)?;
            }
            ConsensusOp::RestartDdlWork { table_id } => {
                set_suspended(store, *table_id, false)?;
            }
            ConsensusOp::RemoveGlobalIndexData { table_id, index_id } => {
                // Data reclamation happens in the storage layer; the log
                // entry is the request.
                debug!(
                    table_id = %table_id,
                    index_id = %index_id,
                    operator = "ConsensusApply",
                    "remove global index data requested"
                );
            }
        }
        Ok(())
    }
}

impl ConsensusLog for StoreConsensus {
    fn append(&self, op: &ConsensusOp) -> Result<()> {
        Self::apply(self.store.as_ref(), op)
    }
}

fn set_suspended(store: &dyn MetaStore, table_id: TableId, suspended: bool) -> Result<()> {
    let key = keys::ddl_job_key(table_id);
    match store.get(&key)? {
        Some(bytes) => {
            let mut job = DdlJob::decode(&bytes)?;
            job.suspended = suspended;
            store.put(key, job.encode()?)
        }
        None => {
            warn!(
                table_id = %table_id,
                suspended,
                operator = "ConsensusApply",
                "suspend/restart for unknown job ignored"
            );
            Ok(())
        }
    }
}
