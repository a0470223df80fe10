//! Worker heartbeat protocol model.
//!
//! Workers poll the coordinator on a fixed cadence. A request carries
//! everything the worker knows (region status updates, barrier acks); the
//! response carries everything the worker must do next (new assignments,
//! barrier payloads). Reports are merged before assignments are drained, so
//! a worker never loses track of a unit it just returned.

use serde::{Deserialize, Serialize};

use odl_common::TableId;

use crate::job::{DdlJob, RegionWork, WorkStatus};

/// One worker's acknowledgement of a schema broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAck {
    /// Table whose barrier is being acked.
    pub table_id: TableId,
    /// `Doing` while applying, `Done` on adoption, `Fail` on error.
    pub status: WorkStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// Heartbeat request sent by a worker.
pub struct HeartbeatRequest {
    /// Worker address; scheduling key.
    pub address: String,
    /// Locality tag.
    pub physical_room: String,
    /// Whether the worker currently accepts DDL work.
    pub can_do_ddl: bool,
    /// Status updates for units the worker knows about.
    pub region_works: Vec<RegionWork>,
    /// Barrier acknowledgements.
    pub broadcast_acks: Vec<BroadcastAck>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// Heartbeat response returned to a worker.
pub struct HeartbeatResponse {
    /// Newly assigned units, already marked `Doing`.
    pub assignments: Vec<RegionWork>,
    /// Schema states the worker must adopt and ack.
    pub broadcasts: Vec<DdlJob>,
}
