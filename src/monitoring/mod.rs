//! Monitoring module for the query builder
//!
//! Provides:
//! - Structured logging with tracing
//! - Prometheus metrics collection

pub mod config;
pub mod metrics;
pub mod tracing_config;

pub use config::{LogFormat, MonitoringConfig};
pub use metrics::{
    export_prometheus, observe_upstream_latency_ms, record_answer, CACHE_ERRORS_TOTAL,
    CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, REGISTRY,
};

use std::time::Instant;
use tracing_appender::non_blocking::WorkerGuard;

/// Logging state owned by `main` for the lifetime of the process
pub struct MonitoringContext {
    pub config: MonitoringConfig,
    pub startup_time: Instant,
    _guard: Option<WorkerGuard>,
}

impl MonitoringContext {
    /// Must be called before anything logs.
    pub fn new(config: MonitoringConfig) -> std::io::Result<Self> {
        let guard = tracing_config::init_tracing(&config)?;
        Ok(Self {
            config,
            startup_time: Instant::now(),
            _guard: guard,
        })
    }

    pub fn startup_complete(&self) {
        tracing::info!(
            duration_ms = self.startup_time.elapsed().as_millis() as u64,
            "Application startup complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitoring_context_creation() {
        let ctx = MonitoringContext::new(MonitoringConfig::default());
        assert!(ctx.is_ok());
    }
}
