//! Failure-path coverage: worker loss, data-fatal statuses, retry
//! exhaustion, barrier failure, stale reports, and the in-flight ratio cap.

mod common;

use common::{test_config, Harness, INDEX, TABLE};
use odl_common::{DdlConfig, RegionId};
use odl_coordinator::{IndexState, JobErrCode, WorkStatus, WorkerState};
use odl_store::keys;
use odl_store::MetaStore;

#[test]
fn crashed_worker_unit_is_requeued_and_finishes_elsewhere() {
    let mut h = Harness::new(test_config());
    h.add_table(&[1]);
    h.heartbeat("w1");
    h.heartbeat("w2");
    h.walk_to_write_local(&["w1", "w2"]);

    h.tick();
    let assigned = h.heartbeat("w1").assignments;
    assert_eq!(assigned.len(), 1);
    assert_eq!(h.coordinator.doing_count(TABLE), 1);

    // w1 goes silent past the stale window; w2 keeps beating.
    h.clock
        .advance_ms(20 * h.config.heartbeat_interval_ms + 1);
    h.heartbeat("w2");
    h.sweep();

    let works = h.coordinator.region_works(TABLE);
    assert_eq!(works[0].status, WorkStatus::Idle, "unit reset for re-admission");
    assert_eq!(h.coordinator.doing_count(TABLE), 0);
    assert_eq!(
        h.coordinator.pool().worker("w1").expect("registered").state,
        WorkerState::Faulty
    );

    // Reassignment skips the faulty worker.
    h.tick();
    let reassigned = h.heartbeat("w2").assignments;
    assert_eq!(reassigned.len(), 1);
    assert_eq!(reassigned[0].address, "w2");
    assert_eq!(reassigned[0].retry_time, 2);

    let done = h.finish(&reassigned, WorkStatus::Done);
    h.report("w2", done);
    h.tick();
    assert_eq!(h.index_state(), Some(IndexState::Public));
    assert_eq!(
        h.coordinator.job(TABLE).expect("job").errcode,
        JobErrCode::Success
    );
}

#[test]
fn uniqueness_violation_rolls_back_and_drops_the_partial_index() {
    let mut h = Harness::new(test_config());
    h.add_table(&[1, 2]);
    h.heartbeat("w1");
    h.walk_to_write_local(&["w1"]);

    h.tick();
    let assigned = h.heartbeat("w1").assignments;
    assert_eq!(assigned.len(), 2);
    let dup = h.finish(&assigned[1..], WorkStatus::DupUniq);
    h.report("w1", dup);

    h.tick();
    assert_eq!(
        h.coordinator.job(TABLE).expect("job").errcode,
        JobErrCode::ExecFail
    );
    assert_ne!(h.index_state(), Some(IndexState::Public));

    // Terminal cleanup asks the catalog to drop the partial index.
    h.tick();
    assert!(h.coordinator.job(TABLE).is_none());
    assert_eq!(h.catalog.dropped_indexes(), vec![(TABLE, INDEX)]);
    assert!(h
        .store
        .get(&keys::ddl_job_key(TABLE))
        .expect("get")
        .is_none());
    assert!(h
        .store
        .scan_prefix(&keys::region_work_prefix(TABLE))
        .expect("scan")
        .is_empty());
}

#[test]
fn retry_budget_exhaustion_rolls_back() {
    let config = DdlConfig {
        max_retry: 2,
        ..test_config()
    };
    let mut h = Harness::new(config);
    h.add_table(&[1]);
    h.heartbeat("w1");
    h.walk_to_write_local(&["w1"]);

    for attempt in 1..=2u32 {
        h.tick();
        let assigned = h.heartbeat("w1").assignments;
        assert_eq!(assigned.len(), 1, "attempt {attempt} assigned");
        assert_eq!(assigned[0].retry_time, attempt);
        let failed = h.finish(&assigned, WorkStatus::Fail);
        h.report("w1", failed);
    }

    // Budget exhausted: the next cycle rolls the job back.
    h.tick();
    assert_eq!(
        h.coordinator.job(TABLE).expect("job").errcode,
        JobErrCode::ExecFail
    );
    h.tick();
    assert_eq!(h.catalog.dropped_indexes(), vec![(TABLE, INDEX)]);
}

#[test]
fn broadcast_failure_rolls_back_before_write_local() {
    let mut h = Harness::new(test_config());
    h.add_table(&[1]);
    h.heartbeat("w1");
    h.heartbeat("w2");
    h.walk_to_write_only();

    h.tick(); // opens the barrier against both workers
    let resp = h.heartbeat("w1");
    assert_eq!(resp.broadcasts.len(), 1);
    h.ack("w1", WorkStatus::Fail);

    h.tick();
    assert_eq!(
        h.coordinator.job(TABLE).expect("job").errcode,
        JobErrCode::ExecFail
    );
    assert_eq!(
        h.index_state(),
        Some(IndexState::WriteOnly),
        "the backfill phase must never start"
    );
    assert_eq!(h.coordinator.doing_count(TABLE), 0);

    h.tick();
    assert_eq!(h.catalog.dropped_indexes(), vec![(TABLE, INDEX)]);
}

#[test]
fn silent_worker_is_dropped_from_the_barrier() {
    let mut h = Harness::new(test_config());
    h.add_table(&[1]);
    h.heartbeat("w1");
    h.heartbeat("w2");
    h.walk_to_write_only();

    h.tick(); // barrier: w1 + w2
    let resp = h.heartbeat("w1");
    assert_eq!(resp.broadcasts.len(), 1);
    h.ack("w1", WorkStatus::Done);
    h.tick();
    assert_eq!(h.index_state(), Some(IndexState::WriteOnly), "w2 still pending");

    // w2 never picks the payload up and goes silent.
    h.clock
        .advance_ms(30 * h.config.heartbeat_interval_ms + 1);
    h.sweep();
    h.tick();
    assert_eq!(
        h.index_state(),
        Some(IndexState::WriteLocal),
        "barrier drains once the silent worker is removed"
    );
}

#[test]
fn stale_report_for_unpulled_unit_is_ignored() {
    let mut h = Harness::new(test_config());
    h.add_table(&[1]);
    h.heartbeat("w1");
    h.walk_to_write_local(&["w1"]);

    h.tick(); // admitted into w1's todo, not yet pulled
    assert_eq!(h.coordinator.doing_count(TABLE), 1);

    // A report for a unit that is not in the worker's doing queue must not
    // change anything: the sweeper (or a newer assignment) owns it now.
    let mut bogus = h.coordinator.region_works(TABLE)[0].clone();
    bogus.status = WorkStatus::Done;
    h.report("w1", vec![bogus]);
    assert_eq!(
        h.coordinator.doing_count(TABLE),
        1,
        "ignored report must not release the doing slot"
    );

    // Reports merge before assignments drain, so that same heartbeat pulled
    // the unit; the worker now owns it and can finish it normally.
    let works = h.coordinator.region_works(TABLE);
    assert_eq!(works[0].status, WorkStatus::Doing);
    let done = h.finish(&works, WorkStatus::Done);
    h.report("w1", done);
    h.tick();
    assert_eq!(h.index_state(), Some(IndexState::Public));
}

#[test]
fn doing_budget_is_capped_by_region_ratio() {
    let mut h = Harness::new(test_config());
    h.add_table(&[1, 2, 3, 4, 5]);
    h.heartbeat("w1");
    h.walk_to_write_local(&["w1"]);

    // The table shrinks to one region; the budget follows the live topology.
    h.add_table(&[1]);
    h.tick();
    let cap = (h.config.max_region_ratio) as i64; // 1 region x ratio
    assert_eq!(h.coordinator.doing_count(TABLE), cap);
    let doing = h
        .coordinator
        .region_works(TABLE)
        .into_iter()
        .filter(|w| w.status == WorkStatus::Doing)
        .count() as i64;
    assert_eq!(doing, cap);
    assert!(h
        .coordinator
        .region_works(TABLE)
        .iter()
        .any(|w| w.status == WorkStatus::Idle));

    // Further ticks admit nothing while the budget is full.
    h.tick();
    assert_eq!(h.coordinator.doing_count(TABLE), cap);
}

#[test]
fn empty_region_set_completes_without_workers() {
    let mut h = Harness::new(test_config());
    h.add_table(&[]);
    h.walk_to_write_only();

    // No live workers: the barrier opens empty and resolves immediately.
    h.tick();
    h.tick();
    assert_eq!(h.index_state(), Some(IndexState::WriteLocal));

    // No region work either: the next cycle publishes the index.
    h.tick();
    assert_eq!(h.index_state(), Some(IndexState::Public));
    assert_eq!(
        h.coordinator.job(TABLE).expect("job").errcode,
        JobErrCode::Success
    );
}

#[test]
fn requeued_stale_unit_survives_round_trip_through_the_store() {
    let mut h = Harness::new(test_config());
    h.add_table(&[1]);
    h.heartbeat("w1");
    h.walk_to_write_local(&["w1"]);

    h.tick();
    h.heartbeat("w1"); // pull, durable status Doing
    let stored = odl_coordinator::RegionWork::decode(
        &h.store
            .get(&keys::region_work_key(TABLE, RegionId(1)))
            .expect("get")
            .expect("present"),
    )
    .expect("decode");
    assert_eq!(stored.status, WorkStatus::Doing);

    h.clock
        .advance_ms(20 * h.config.heartbeat_interval_ms + 1);
    h.sweep();
    let stored = odl_coordinator::RegionWork::decode(
        &h.store
            .get(&keys::region_work_key(TABLE, RegionId(1)))
            .expect("get")
            .expect("present"),
    )
    .expect("decode");
    assert_eq!(stored.status, WorkStatus::Idle, "requeue is durable");
}
