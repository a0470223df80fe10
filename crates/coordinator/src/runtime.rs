//! Long-lived leader loops and cooperative shutdown.
//!
//! Only the leader runs the controller and sweeper. Both loops poll a
//! shutdown flag between sleeps and wake early when it trips, so the
//! process can stop without waiting out a full cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info};

use crate::coordinator::DdlCoordinator;

/// Cooperative shutdown signal with fast-wakeup sleeps.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

#[derive(Default)]
struct ShutdownInner {
    flag: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    /// New, untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal and wake all sleepers.
    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether the signal has tripped.
    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Sleep up to `timeout`; returns `true` when woken by shutdown.
    pub async fn sleep_fast(&self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(timeout) => self.is_triggered(),
            _ = self.inner.notify.notified() => true,
        }
    }
}

/// Leadership seam; only the leader mutates coordinator state.
pub trait LeaderStatus: Send + Sync {
    /// Whether this process currently holds leadership.
    fn is_leader(&self) -> bool;
}

/// Single-node deployments are always leader.
#[derive(Debug, Default)]
pub struct AlwaysLeader;

impl LeaderStatus for AlwaysLeader {
    fn is_leader(&self) -> bool {
        true
    }
}

/// Controller loop: rehydrate on each leadership edge, then tick every
/// cycle until shutdown.
pub async fn run_controller_loop(
    coordinator: Arc<Mutex<DdlCoordinator>>,
    leader: Arc<dyn LeaderStatus>,
    shutdown: Shutdown,
) {
    let (tick_interval, backoff) = {
        let guard = coordinator.lock().await;
        (
            Duration::from_millis(guard.config().tick_interval_ms),
            Duration::from_millis(guard.config().not_leader_backoff_ms),
        )
    };
    let mut was_leader = false;
    loop {
        if shutdown.is_triggered() {
            info!(operator = "DdlLoop", "controller loop stopping");
            return;
        }
        if !leader.is_leader() {
            was_leader = false;
            debug!(operator = "DdlLoop", "not leader; backing off");
            if shutdown.sleep_fast(backoff).await {
                return;
            }
            continue;
        }
        if !was_leader {
            was_leader = true;
            if let Err(e) = coordinator.lock().await.rehydrate() {
                error!(error = %e, operator = "DdlLoop", "rehydration failed; retrying");
                was_leader = false;
                if shutdown.sleep_fast(backoff).await {
                    return;
                }
                continue;
            }
        }
        if let Err(e) = coordinator.lock().await.tick() {
            error!(error = %e, operator = "DdlLoop", "tick failed; retrying next cycle");
        }
        if shutdown.sleep_fast(tick_interval).await {
            info!(operator = "DdlLoop", "controller loop stopping");
            return;
        }
    }
}

/// Sweeper loop: timeout detection and requeueing, leader-gated like the
/// controller.
pub async fn run_sweeper_loop(
    coordinator: Arc<Mutex<DdlCoordinator>>,
    leader: Arc<dyn LeaderStatus>,
    shutdown: Shutdown,
) {
    let (sweep_interval, backoff) = {
        let guard = coordinator.lock().await;
        (
            Duration::from_millis(guard.config().sweep_interval_ms),
            Duration::from_millis(guard.config().not_leader_backoff_ms),
        )
    };
    loop {
        if shutdown.is_triggered() {
            info!(operator = "SweepLoop", "sweeper loop stopping");
            return;
        }
        if !leader.is_leader() {
            debug!(operator = "SweepLoop", "not leader; backing off");
            if shutdown.sleep_fast(backoff).await {
                return;
            }
            continue;
        }
        if let Err(e) = coordinator.lock().await.sweep() {
            error!(error = %e, operator = "SweepLoop", "sweep failed; retrying next cycle");
        }
        if shutdown.sleep_fast(sweep_interval).await {
            info!(operator = "SweepLoop", "sweeper loop stopping");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Shutdown;
    use std::time::Duration;

    #[tokio::test]
    async fn sleep_returns_early_on_trigger() {
        let shutdown = Shutdown::new();
        let sleeper = shutdown.clone();
        let handle = tokio::spawn(async move { sleeper.sleep_fast(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger();
        let woke = handle.await.expect("join");
        assert!(woke);
    }

    #[tokio::test]
    async fn sleep_times_out_without_trigger() {
        let shutdown = Shutdown::new();
        let woke = shutdown.sleep_fast(Duration::from_millis(5)).await;
        assert!(!woke);
    }
}
