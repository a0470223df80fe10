use std::sync::{Arc, OnceLock};

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

/// Process-wide metrics registry for the DDL coordinator.
#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    region_work_assigned: CounterVec,
    region_work_retries: CounterVec,
    region_work_requeued: CounterVec,
    ddl_jobs_finished: CounterVec,
    ddl_jobs_active: Gauge,
    region_work_doing: GaugeVec,
    workers: GaugeVec,
    broadcast_tasks_pending: Gauge,
    controller_tick_seconds: Histogram,
}

impl MetricsRegistry {
    /// Create a registry with all metric families registered.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// Count one region work unit handed to a worker.
    pub fn inc_work_assigned(&self, table_id: i64) {
        self.inner
            .region_work_assigned
            .with_label_values(&[&table_id.to_string()])
            .inc();
    }

    /// Count one region work retry submission.
    pub fn inc_work_retries(&self, table_id: i64) {
        self.inner
            .region_work_retries
            .with_label_values(&[&table_id.to_string()])
            .inc();
    }

    /// Count one region work unit reset to idle by the sweeper.
    pub fn inc_work_requeued(&self, table_id: i64) {
        self.inner
            .region_work_requeued
            .with_label_values(&[&table_id.to_string()])
            .inc();
    }

    /// Count a finished DDL job by operation and outcome.
    pub fn inc_job_finished(&self, op: &str, outcome: &str) {
        self.inner
            .ddl_jobs_finished
            .with_label_values(&[op, outcome])
            .inc();
    }

    /// Set the number of in-flight DDL jobs.
    pub fn set_jobs_active(&self, n: u64) {
        self.inner.ddl_jobs_active.set(n as f64);
    }

    /// Set the number of units currently running for a table.
    pub fn set_work_doing(&self, table_id: i64, n: u64) {
        self.inner
            .region_work_doing
            .with_label_values(&[&table_id.to_string()])
            .set(n as f64);
    }

    /// Set worker counts by health state.
    pub fn set_workers(&self, state: &str, n: u64) {
        self.inner
            .workers
            .with_label_values(&[state])
            .set(n as f64);
    }

    /// Set the number of unresolved broadcast barriers.
    pub fn set_broadcast_pending(&self, n: u64) {
        self.inner.broadcast_tasks_pending.set(n as f64);
    }

    /// Observe one controller tick duration.
    pub fn observe_tick_seconds(&self, secs: f64) {
        self.inner.controller_tick_seconds.observe(secs.max(0.0));
    }

    /// Render all families in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let region_work_assigned = counter_vec(
            &registry,
            "odl_region_work_assigned_total",
            "Region backfill units handed to workers",
            &["table_id"],
        );
        let region_work_retries = counter_vec(
            &registry,
            "odl_region_work_retries_total",
            "Region backfill retry submissions",
            &["table_id"],
        );
        let region_work_requeued = counter_vec(
            &registry,
            "odl_region_work_requeued_total",
            "Region backfill units reset to idle by the sweeper",
            &["table_id"],
        );
        let ddl_jobs_finished = counter_vec(
            &registry,
            "odl_ddl_jobs_finished_total",
            "Terminal DDL jobs by operation and outcome",
            &["op", "outcome"],
        );
        let ddl_jobs_active = gauge(
            &registry,
            "odl_ddl_jobs_active",
            "DDL jobs currently in flight",
        );
        let region_work_doing = gauge_vec(
            &registry,
            "odl_region_work_doing",
            "Region backfill units currently running",
            &["table_id"],
        );
        let workers = gauge_vec(
            &registry,
            "odl_workers",
            "Known backfill workers by health state",
            &["state"],
        );
        let broadcast_tasks_pending = gauge(
            &registry,
            "odl_broadcast_tasks_pending",
            "Unresolved schema broadcast barriers",
        );
        let controller_tick_seconds = histogram(
            &registry,
            "odl_controller_tick_seconds",
            "Controller tick duration",
        );

        Self {
            registry,
            region_work_assigned,
            region_work_retries,
            region_work_requeued,
            ddl_jobs_finished,
            ddl_jobs_active,
            region_work_doing,
            workers,
            broadcast_tasks_pending,
            controller_tick_seconds,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Gauge {
    let g = Gauge::new(name, help).expect("gauge");
    registry
        .register(Box::new(g.clone()))
        .expect("register gauge");
    g
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let g = GaugeVec::new(Opts::new(name, help), labels).expect("gauge vec");
    registry
        .register(Box::new(g.clone()))
        .expect("register gauge");
    g
}

fn histogram(registry: &Registry, name: &str, help: &str) -> Histogram {
    let h = Histogram::with_opts(HistogramOpts::new(name, help)).expect("histogram");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

/// Process-global metrics registry accessor.
pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::MetricsRegistry;

    #[test]
    fn renders_prometheus_text() {
        let m = MetricsRegistry::new();
        m.inc_work_assigned(7);
        m.set_workers("healthy", 2);
        let text = m.render_prometheus();
        assert!(text.contains("odl_region_work_assigned_total"));
        assert!(text.contains("odl_workers"));
    }

    #[test]
    fn renders_all_metric_families() {
        let m = MetricsRegistry::new();
        m.inc_work_assigned(1);
        m.inc_work_retries(1);
        m.inc_work_requeued(1);
        m.inc_job_finished("add_global_index", "success");
        m.set_jobs_active(1);
        m.set_work_doing(1, 3);
        m.set_workers("faulty", 0);
        m.set_broadcast_pending(1);
        m.observe_tick_seconds(0.01);
        let text = m.render_prometheus();

        assert!(text.contains("odl_region_work_retries_total"));
        assert!(text.contains("odl_region_work_requeued_total"));
        assert!(text.contains("odl_ddl_jobs_finished_total"));
        assert!(text.contains("odl_ddl_jobs_active"));
        assert!(text.contains("odl_region_work_doing"));
        assert!(text.contains("odl_broadcast_tasks_pending"));
        assert!(text.contains("odl_controller_tick_seconds"));
    }
}
