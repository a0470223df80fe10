//! End-to-end controller lifecycle: forward add-index chain, drop-index
//! walk-down, suspension, and leader failover rehydration.

mod common;

use common::{test_config, Harness, INDEX, TABLE};
use odl_common::DdlConfig;
use odl_coordinator::{DdlJob, IndexState, JobErrCode, WorkStatus};
use odl_store::keys;
use odl_store::MetaStore;

#[test]
fn add_index_runs_three_regions_on_two_workers_to_public() {
    let mut h = Harness::new(test_config());
    h.add_table(&[1, 2, 3]);
    h.heartbeat("w1");
    h.heartbeat("w2");

    h.coordinator
        .submit_add_index(TABLE, INDEX)
        .expect("submit");
    assert!(
        h.coordinator.submit_add_index(TABLE, INDEX).is_err(),
        "duplicate job must be rejected"
    );
    assert_eq!(h.index_state(), Some(IndexState::None));

    // Forward chain under the dwell gate.
    h.tick();
    assert_eq!(h.index_state(), Some(IndexState::None), "dwell not satisfied yet");
    h.pass_dwell();
    h.tick();
    assert_eq!(h.index_state(), Some(IndexState::DeleteOnly));
    h.tick();
    h.pass_dwell();
    h.tick();
    assert_eq!(h.index_state(), Some(IndexState::WriteOnly));

    // Barrier: both workers must pull and ack before write-local.
    h.tick();
    assert_eq!(h.coordinator.broadcast().pending_count(), 1);
    let resp = h.heartbeat("w1");
    assert_eq!(resp.broadcasts.len(), 1);
    assert_eq!(resp.broadcasts[0].job_state, IndexState::WriteOnly);
    h.ack("w1", WorkStatus::Done);
    h.tick();
    assert_eq!(
        h.index_state(),
        Some(IndexState::WriteOnly),
        "one ack is not enough"
    );
    let resp = h.heartbeat("w2");
    assert_eq!(resp.broadcasts.len(), 1);
    h.ack("w2", WorkStatus::Done);
    h.tick();
    assert_eq!(h.index_state(), Some(IndexState::WriteLocal));

    // Backfill admission and assignment.
    h.tick();
    assert_eq!(h.coordinator.doing_count(TABLE), 3);
    h.assert_scheduler_invariants();
    let a1 = h.heartbeat("w1").assignments;
    let a2 = h.heartbeat("w2").assignments;
    assert_eq!(a1.len() + a2.len(), 3);
    for work in a1.iter().chain(a2.iter()) {
        assert_eq!(work.status, WorkStatus::Doing);
        assert_eq!(work.retry_time, 1);
    }
    h.assert_scheduler_invariants();

    // Every durable Doing record matches memory.
    for work in h.coordinator.region_works(TABLE) {
        let stored = h
            .store
            .get(&keys::region_work_key(TABLE, work.region_id))
            .expect("get")
            .expect("persisted");
        assert_eq!(odl_coordinator::RegionWork::decode(&stored).expect("decode"), work);
    }

    // Completion.
    let done1 = h.finish(&a1, WorkStatus::Done);
    h.report("w1", done1);
    let done2 = h.finish(&a2, WorkStatus::Done);
    h.report("w2", done2);
    assert_eq!(h.coordinator.doing_count(TABLE), 0);
    h.tick();
    assert_eq!(h.index_state(), Some(IndexState::Public));
    let job = h.coordinator.job(TABLE).expect("job");
    assert_eq!(job.errcode, JobErrCode::Success);

    // Terminal cleanup removes job and region rows.
    h.tick();
    assert!(h.coordinator.job(TABLE).is_none());
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
fn drop_index_walks_the_inverse_chain_and_reclaims() {
    let mut h = Harness::new(test_config());
    h.add_table(&[1, 2]);
    h.catalog.set_index_state(TABLE, INDEX, IndexState::Public);

    h.coordinator
        .submit_drop_index(TABLE, INDEX)
        .expect("submit");
    let walkdown = [
        IndexState::WriteOnly,
        IndexState::DeleteOnly,
        IndexState::None,
    ];
    for expected in walkdown {
        h.tick();
        h.pass_dwell();
        h.tick();
        assert_eq!(h.index_state(), Some(expected));
    }

    // Final step removes the index and cleans up in one cycle.
    h.tick();
    h.pass_dwell();
    h.tick();
    assert_eq!(h.index_state(), None, "index removed from catalog");
    assert!(h.coordinator.job(TABLE).is_none());
    assert!(h
        .store
        .get(&keys::ddl_job_key(TABLE))
        .expect("get")
        .is_none());
}

#[test]
fn suspended_job_holds_state_until_resumed() {
    let mut h = Harness::new(test_config());
    h.add_table(&[1]);
    h.coordinator
        .submit_add_index(TABLE, INDEX)
        .expect("submit");

    h.tick();
    h.pass_dwell();
    h.coordinator.suspend(TABLE).expect("suspend");
    h.tick();
    assert_eq!(
        h.index_state(),
        Some(IndexState::None),
        "suspended job must not advance"
    );
    let stored = DdlJob::decode(
        &h.store
            .get(&keys::ddl_job_key(TABLE))
            .expect("get")
            .expect("present"),
    )
    .expect("decode");
    assert!(stored.suspended, "suspension is durable");

    h.coordinator.resume(TABLE).expect("resume");
    h.tick();
    assert_eq!(h.index_state(), Some(IndexState::DeleteOnly));
}

#[test]
fn leader_failover_rehydrates_in_flight_work() {
    let config = DdlConfig {
        max_concurrent_per_worker: 2,
        ..test_config()
    };
    let mut h = Harness::new(config.clone());
    h.add_table(&[1, 2, 3]);
    h.heartbeat("w1");
    h.walk_to_write_local(&["w1"]);

    // w1's cap of 2 leaves region 3 idle.
    h.tick();
    assert_eq!(h.coordinator.doing_count(TABLE), 2);
    let assigned = h.heartbeat("w1").assignments;
    assert_eq!(assigned.len(), 2);
    let done = h.finish(&assigned[..1], WorkStatus::Done);
    h.report("w1", done);
    // now: region 1 done, region 2 doing on w1, region 3 idle

    // New leader over the same store/catalog.
    let mut h2 = Harness::from_parts(
        config,
        h.clock.clone(),
        h.catalog.clone(),
        h.store.clone(),
    );
    h2.coordinator.rehydrate().expect("rehydrate");

    let works = h2.coordinator.region_works(TABLE);
    let statuses: Vec<WorkStatus> = works.iter().map(|w| w.status).collect();
    assert_eq!(
        statuses,
        vec![WorkStatus::Done, WorkStatus::Doing, WorkStatus::Idle]
    );
    assert_eq!(
        h2.coordinator.doing_count(TABLE),
        1,
        "doing counter rebuilt from durable Doing rows"
    );
    let queues = h2.coordinator.pool().queues("w1").expect("restored queue");
    assert_eq!(queues.doing_len(), 1, "in-flight unit stays with its worker");

    // The new leader drives the job to completion.
    h2.heartbeat("w1");
    h2.tick();
    let assigned = h2.heartbeat("w1").assignments;
    assert_eq!(assigned.len(), 1, "idle region re-admitted");
    let mut finish = h2.finish(&assigned, WorkStatus::Done);
    // the restored unit finishes too
    let mut doing = works[1].clone();
    doing.status = WorkStatus::Done;
    finish.push(doing);
    h2.report("w1", finish);
    h2.tick();
    assert_eq!(h2.index_state(), Some(IndexState::Public));
    assert_eq!(
        h2.coordinator.job(TABLE).expect("job").errcode,
        JobErrCode::Success
    );
}

#[test]
fn batch_limit_paces_admission_across_ticks() {
    let config = DdlConfig {
        max_batch_per_tick: 2,
        ..test_config()
    };
    let mut h = Harness::new(config);
    h.add_table(&[1, 2, 3]);
    h.heartbeat("w1");
    h.walk_to_write_local(&["w1"]);

    h.tick();
    assert_eq!(h.coordinator.doing_count(TABLE), 2, "first tick admits the batch cap");
    h.tick();
    assert_eq!(h.coordinator.doing_count(TABLE), 3, "second tick admits the rest");
}
