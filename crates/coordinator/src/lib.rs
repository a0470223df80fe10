//! Global online DDL coordinator building blocks.
//!
//! Architecture role:
//! - table-level DDL controller state machine and scheduling APIs
//! - worker-pool scheduler and all-workers broadcast barrier
//! - worker-side backfill executor and heartbeat pull loop
//! - leader loops, consensus-log and catalog seams
//!
//! Key modules:
//! - [`coordinator`]
//! - [`scheduler`]
//! - [`broadcast`]
//! - [`backfill`]
//! - `grpc` (feature-gated)
//!
//! Feature flags:
//! - `grpc`: enables tonic-generated RPC services and client/server glue.

pub mod backfill;
pub mod broadcast;
pub mod catalog;
pub mod clock;
pub mod consensus;
pub mod coordinator;
#[cfg(feature = "grpc")]
pub mod grpc;
pub mod heartbeat;
pub mod job;
pub mod runtime;
pub mod scheduler;

pub use backfill::{
    BackfillExecutor, BackfillReport, BackfillRow, BackfillStorage, BackfillWorker,
    DdlControlPlane, InProcessControlPlane, IndexWriteError, NoopSchemaApplier, RegionBatch,
    ScanRoute, SchemaApplier, WorkerConfig,
};
pub use broadcast::{BarrierState, BroadcastSet};
pub use catalog::{Catalog, MemCatalog, RegionDesc};
pub use clock::{Clock, ManualClock, SystemClock};
pub use consensus::{ConsensusLog, ConsensusOp, StoreConsensus};
pub use coordinator::DdlCoordinator;
pub use heartbeat::{BroadcastAck, HeartbeatRequest, HeartbeatResponse};
pub use job::{DdlJob, DdlOp, IndexState, JobErrCode, RegionWork, WorkStatus};
pub use runtime::{
    run_controller_loop, run_sweeper_loop, AlwaysLeader, LeaderStatus, Shutdown,
};
pub use scheduler::{WorkerInfo, WorkerPool, WorkerQueues, WorkerState};
