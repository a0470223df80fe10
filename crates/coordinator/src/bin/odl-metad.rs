use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use odl_common::DdlConfig;
use odl_coordinator::grpc::{CoordinatorServices, DdlAdminServer, DdlHeartbeatServer};
use odl_coordinator::{
    run_controller_loop, run_sweeper_loop, AlwaysLeader, DdlCoordinator, MemCatalog, Shutdown,
    StoreConsensus, SystemClock,
};
use odl_store::MemMetaStore;
use tokio::sync::Mutex;
use tonic::transport::Server;

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize_or_default(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u32_or_default(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64_or_default(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn load_store(path: Option<&str>) -> Result<MemMetaStore, Box<dyn std::error::Error>> {
    match path {
        Some(p) if Path::new(p).exists() => Ok(MemMetaStore::load_from_json(p)?),
        _ => Ok(MemMetaStore::new()),
    }
}

fn load_catalog(path: Option<&str>) -> Result<MemCatalog, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(MemCatalog::load_from_json(p)?),
        None => Ok(MemCatalog::new()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bind = env_or_default("ODL_METAD_BIND", "0.0.0.0:28280");
    let addr: SocketAddr = bind.parse()?;
    let defaults = DdlConfig::default();
    let config = DdlConfig {
        max_concurrent_per_worker: env_usize_or_default(
            "ODL_MAX_CONCURRENT_PER_WORKER",
            defaults.max_concurrent_per_worker,
        ),
        status_update_interval_ms: env_u64_or_default(
            "ODL_STATUS_UPDATE_INTERVAL_MS",
            defaults.status_update_interval_ms,
        ),
        max_region_ratio: env_usize_or_default("ODL_MAX_REGION_RATIO", defaults.max_region_ratio),
        max_retry: env_u32_or_default("ODL_MAX_DDL_RETRY", defaults.max_retry),
        heartbeat_interval_ms: env_u64_or_default(
            "ODL_HEARTBEAT_INTERVAL_MS",
            defaults.heartbeat_interval_ms,
        ),
        max_batch_per_tick: env_usize_or_default(
            "ODL_MAX_BATCH_PER_TICK",
            defaults.max_batch_per_tick,
        ),
        tick_interval_ms: env_u64_or_default("ODL_TICK_INTERVAL_MS", defaults.tick_interval_ms),
        sweep_interval_ms: env_u64_or_default("ODL_SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
        not_leader_backoff_ms: env_u64_or_default(
            "ODL_NOT_LEADER_BACKOFF_MS",
            defaults.not_leader_backoff_ms,
        ),
        backfill_scan_limit: env_u32_or_default(
            "ODL_BACKFILL_SCAN_LIMIT",
            defaults.backfill_scan_limit,
        ),
    };
    let meta_path = env::var("ODL_META_SNAPSHOT_PATH").ok();
    let catalog_path = env::var("ODL_CATALOG_PATH").ok();

    let store = Arc::new(load_store(meta_path.as_deref())?);
    let catalog = Arc::new(load_catalog(catalog_path.as_deref())?);
    let consensus = Arc::new(StoreConsensus::new(store.clone()));
    let coordinator = Arc::new(Mutex::new(DdlCoordinator::new(
        config.clone(),
        Arc::new(SystemClock),
        catalog,
        store,
        consensus,
    )));

    let shutdown = Shutdown::new();
    let leader = Arc::new(AlwaysLeader);
    let controller = tokio::spawn(run_controller_loop(
        Arc::clone(&coordinator),
        leader.clone(),
        shutdown.clone(),
    ));
    let sweeper = tokio::spawn(run_sweeper_loop(
        Arc::clone(&coordinator),
        leader,
        shutdown.clone(),
    ));

    let services = CoordinatorServices::from_shared(coordinator);
    println!(
        "odl-metad listening on {addr} (worker_limit={}, status_update_interval_ms={}, max_region_ratio={}, max_retry={}, heartbeat_interval_ms={}, tick_interval_ms={}, catalog_path={})",
        config.max_concurrent_per_worker,
        config.status_update_interval_ms,
        config.max_region_ratio,
        config.max_retry,
        config.heartbeat_interval_ms,
        config.tick_interval_ms,
        catalog_path.unwrap_or_else(|| "<none>".to_string())
    );

    Server::builder()
        .add_service(DdlHeartbeatServer::new(services.clone()))
        .add_service(DdlAdminServer::new(services))
        .serve(addr)
        .await?;

    shutdown.trigger();
    controller.abort();
    sweeper.abort();
    Ok(())
}
