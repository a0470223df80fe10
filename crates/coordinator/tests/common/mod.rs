#![allow(dead_code)]

//! Shared harness for coordinator integration tests: a coordinator wired to
//! in-memory seams and a hand-advanced clock, plus scripted worker
//! heartbeats.

use std::collections::HashSet;
use std::sync::Arc;

use odl_common::{DdlConfig, IndexId, RegionId, TableId};
use odl_coordinator::{
    BroadcastAck, Catalog, DdlCoordinator, HeartbeatRequest, HeartbeatResponse, IndexState,
    ManualClock, MemCatalog, RegionDesc, RegionWork, StoreConsensus, WorkStatus,
};
use odl_store::MemMetaStore;

pub const TABLE: TableId = TableId(1);
pub const INDEX: IndexId = IndexId(100);

/// Small intervals so liveness windows are driven by the manual clock:
/// dwell 50ms, work-stale/faulty 200ms, broadcast-silence 300ms.
pub fn test_config() -> DdlConfig {
    DdlConfig {
        status_update_interval_ms: 10,
        heartbeat_interval_ms: 10,
        ..DdlConfig::default()
    }
}

pub struct Harness {
    pub config: DdlConfig,
    pub clock: Arc<ManualClock>,
    pub catalog: Arc<MemCatalog>,
    pub store: Arc<MemMetaStore>,
    pub coordinator: DdlCoordinator,
}

impl Harness {
    pub fn new(config: DdlConfig) -> Self {
        Self::from_parts(
            config,
            Arc::new(ManualClock::new(1_000_000)),
            Arc::new(MemCatalog::new()),
            Arc::new(MemMetaStore::new()),
        )
    }

    /// Build a coordinator over existing seams (new-leader simulation).
    pub fn from_parts(
        config: DdlConfig,
        clock: Arc<ManualClock>,
        catalog: Arc<MemCatalog>,
        store: Arc<MemMetaStore>,
    ) -> Self {
        let consensus = Arc::new(StoreConsensus::new(store.clone() as Arc<dyn odl_store::MetaStore>));
        let coordinator = DdlCoordinator::new(
            config.clone(),
            clock.clone(),
            catalog.clone(),
            store.clone(),
            consensus,
        );
        Self {
            config,
            clock,
            catalog,
            store,
            coordinator,
        }
    }

    pub fn add_table(&self, regions: &[i64]) {
        let descs = regions
            .iter()
            .map(|r| RegionDesc {
                region_id: RegionId(*r),
                partition: 0,
                start_key: vec![*r as u8],
                end_key: vec![*r as u8 + 1],
            })
            .collect();
        self.catalog.add_table(TABLE, descs);
    }

    pub fn heartbeat(&mut self, address: &str) -> HeartbeatResponse {
        self.heartbeat_with(address, Vec::new(), Vec::new())
    }

    pub fn report(&mut self, address: &str, works: Vec<RegionWork>) -> HeartbeatResponse {
        self.heartbeat_with(address, works, Vec::new())
    }

    pub fn ack(&mut self, address: &str, status: WorkStatus) -> HeartbeatResponse {
        self.heartbeat_with(
            address,
            Vec::new(),
            vec![BroadcastAck {
                table_id: TABLE,
                status,
            }],
        )
    }

    pub fn heartbeat_with(
        &mut self,
        address: &str,
        region_works: Vec<RegionWork>,
        broadcast_acks: Vec<BroadcastAck>,
    ) -> HeartbeatResponse {
        self.coordinator
            .on_heartbeat(HeartbeatRequest {
                address: address.to_string(),
                physical_room: "room1".to_string(),
                can_do_ddl: true,
                region_works,
                broadcast_acks,
            })
            .expect("heartbeat")
    }

    pub fn tick(&mut self) {
        self.coordinator.tick().expect("tick");
    }

    pub fn sweep(&mut self) {
        self.coordinator.sweep().expect("sweep");
    }

    /// Advance past the dwell window.
    pub fn pass_dwell(&self) {
        self.clock.advance_ms(5 * self.config.status_update_interval_ms + 1);
    }

    pub fn index_state(&self) -> Option<IndexState> {
        self.catalog.index_state(TABLE, INDEX).ok()
    }

    /// Walk an add-index job from hidden up to the write-only barrier.
    pub fn walk_to_write_only(&mut self) {
        self.coordinator
            .submit_add_index(TABLE, INDEX)
            .expect("submit add index");
        self.tick(); // record dwell at None
        self.pass_dwell();
        self.tick(); // -> DeleteOnly
        self.tick(); // record dwell at DeleteOnly
        self.pass_dwell();
        self.tick(); // -> WriteOnly
        assert_eq!(self.index_state(), Some(IndexState::WriteOnly));
    }

    /// Walk up to the backfill phase, resolving the barrier with `workers`.
    pub fn walk_to_write_local(&mut self, workers: &[&str]) {
        self.walk_to_write_only();
        self.tick(); // opens the barrier
        for worker in workers {
            let resp = self.heartbeat(worker);
            assert_eq!(resp.broadcasts.len(), 1, "worker {worker} should pull the payload");
            self.ack(worker, WorkStatus::Done);
        }
        self.tick(); // barrier resolved -> WriteLocal
        assert_eq!(self.index_state(), Some(IndexState::WriteLocal));
    }

    /// Mark the given assignments with `status` for reporting back.
    pub fn finish(
        &self,
        assignments: &[RegionWork],
        status: WorkStatus,
    ) -> Vec<RegionWork> {
        assignments
            .iter()
            .cloned()
            .map(|mut work| {
                work.status = status;
                work
            })
            .collect()
    }

    /// Queue disjointness and per-worker concurrency cap across the pool.
    pub fn assert_scheduler_invariants(&self) {
        let pool = self.coordinator.pool();
        let mut seen = HashSet::new();
        for address in pool.queued_addresses() {
            let queues = pool.queues(&address).expect("queues");
            assert!(
                queues.todo_len() + queues.doing_len() <= self.config.max_concurrent_per_worker,
                "worker {address} exceeds its concurrency cap"
            );
            for task_id in queues.task_ids() {
                assert!(seen.insert(task_id.clone()), "unit {task_id} queued on two workers");
            }
        }
    }
}
