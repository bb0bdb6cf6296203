//! Prometheus metrics for the job lifecycle.
//!
//! Metrics are optional: recording helpers are no-ops until
//! [`init_metrics`] runs, so library consumers and tests pay nothing.

use std::sync::OnceLock;

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};

/// Global Prometheus registry for all jobforge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Jobs created, labeled by job type.
pub static JOBS_CREATED: OnceLock<CounterVec> = OnceLock::new();

/// Jobs completed, labeled by job type.
pub static JOBS_COMPLETED: OnceLock<CounterVec> = OnceLock::new();

/// Jobs failed during processing, labeled by error type.
pub static JOBS_FAILED: OnceLock<CounterVec> = OnceLock::new();

/// Jobs terminally failed by the recovery sweeper, labeled by reason.
pub static JOBS_RECOVERED: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at application startup. Idempotent: a second call leaves the
/// first registration in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let jobs_created = CounterVec::new(
        Opts::new("jobforge_jobs_created_total", "Total jobs created"),
        &["job_type"],
    )?;

    let jobs_completed = CounterVec::new(
        Opts::new("jobforge_jobs_completed_total", "Total jobs completed"),
        &["job_type"],
    )?;

    let jobs_failed = CounterVec::new(
        Opts::new(
            "jobforge_jobs_failed_total",
            "Total jobs failed during processing",
        ),
        &["error_type"],
    )?;

    let jobs_recovered = CounterVec::new(
        Opts::new(
            "jobforge_jobs_recovered_total",
            "Total jobs terminally failed by the recovery sweeper",
        ),
        &["reason"],
    )?;

    registry.register(Box::new(jobs_created.clone()))?;
    registry.register(Box::new(jobs_completed.clone()))?;
    registry.register(Box::new(jobs_failed.clone()))?;
    registry.register(Box::new(jobs_recovered.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = JOBS_CREATED.set(jobs_created);
    let _ = JOBS_COMPLETED.set(jobs_completed);
    let _ = JOBS_FAILED.set(jobs_failed);
    let _ = JOBS_RECOVERED.set(jobs_recovered);

    tracing::info!("Prometheus metrics initialized");

    Ok(())
}

/// Records a job creation.
pub fn record_job_created(job_type: &str) {
    if let Some(counter) = JOBS_CREATED.get() {
        counter.with_label_values(&[job_type]).inc();
    }
}

/// Records a job completion.
pub fn record_job_completed(job_type: &str) {
    if let Some(counter) = JOBS_COMPLETED.get() {
        counter.with_label_values(&[job_type]).inc();
    }
}

/// Records a processing failure.
pub fn record_job_failed(error_type: &str) {
    if let Some(counter) = JOBS_FAILED.get() {
        counter.with_label_values(&[error_type]).inc();
    }
}

/// Records a sweeper recovery.
pub fn record_job_recovered(reason: &str) {
    if let Some(counter) = JOBS_RECOVERED.get() {
        counter.with_label_values(&[reason]).inc();
    }
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
