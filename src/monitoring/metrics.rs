use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

// Global Prometheus registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn service_and_env() -> (String, String) {
    let service = std::env::var("APP_SERVICE")
        .ok()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
    let env_name = std::env::var("APP_ENV")
        .ok()
        .unwrap_or_else(|| "dev".to_string());
    (service, env_name)
}

// App info gauge (const)
pub static APP_INFO: Lazy<IntGauge> = Lazy::new(|| {
    let (service, env_name) = service_and_env();
    let g = IntGauge::with_opts(
        Opts::new("app_info", "Application info gauge")
            .const_label("service", &service)
            .const_label("env", &env_name)
            .const_label("version", env!("CARGO_PKG_VERSION")),
    )
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

// Cache metrics, partitioned by domain tag (embed, retrieval, response)
pub static CACHE_HITS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let (service, env_name) = service_and_env();
    let opts = Opts::new("cache_hits_total", "Total cache hits")
        .const_label("service", service)
        .const_label("env", env_name);
    let cv = IntCounterVec::new(opts, &["domain"]).unwrap();
    REGISTRY.register(Box::new(cv.clone())).ok();
    cv
});

pub static CACHE_MISSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let (service, env_name) = service_and_env();
    let opts = Opts::new("cache_misses_total", "Total cache misses")
        .const_label("service", service)
        .const_label("env", env_name);
    let cv = IntCounterVec::new(opts, &["domain"]).unwrap();
    REGISTRY.register(Box::new(cv.clone())).ok();
    cv
});

pub static CACHE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let (service, env_name) = service_and_env();
    let opts = Opts::new(
        "cache_errors_total",
        "Cache faults swallowed as misses or dropped writes",
    )
    .const_label("service", service)
    .const_label("env", env_name);
    let cv = IntCounterVec::new(opts, &["op"]).unwrap();
    REGISTRY.register(Box::new(cv.clone())).ok();
    cv
});

// Upstream calls (embedding, retrieval, generation)
pub static UPSTREAM_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    let (service, env_name) = service_and_env();
    let mut opts = HistogramOpts::new("upstream_latency_ms", "Upstream call latency in milliseconds")
        .buckets(vec![
            10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
        ]);
    opts.common_opts = opts
        .common_opts
        .const_label("service", service)
        .const_label("env", env_name);
    let hv = HistogramVec::new(opts, &["operation"]).unwrap();
    REGISTRY.register(Box::new(hv.clone())).ok();
    hv
});

pub static ANSWERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let (service, env_name) = service_and_env();
    let opts = Opts::new("answers_total", "Answers served, by provenance")
        .const_label("service", service)
        .const_label("env", env_name);
    let cv = IntCounterVec::new(opts, &["provenance"]).unwrap();
    REGISTRY.register(Box::new(cv.clone())).ok();
    cv
});

pub static CHUNKS_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    let (service, env_name) = service_and_env();
    let g = IntGauge::with_opts(
        Opts::new("chunks_total", "Chunks held by the vector store")
            .const_label("service", service)
            .const_label("env", env_name),
    )
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub fn observe_upstream_latency_ms(operation: &str, duration_ms: f64) {
    UPSTREAM_LATENCY_MS
        .with_label_values(&[operation])
        .observe(duration_ms);
}

pub fn record_answer(from_cache: bool) {
    let provenance = if from_cache { "cache" } else { "fresh" };
    ANSWERS_TOTAL.with_label_values(&[provenance]).inc();
}

/// (hits, misses) summed over all domains
#[cfg(test)]
fn cache_hit_miss_counts() -> (u64, u64) {
    let sum = |cv: &IntCounterVec| -> u64 {
        ["embed", "retrieval", "response"]
            .iter()
            .map(|d| cv.with_label_values(&[d]).get())
            .sum()
    };
    (sum(&CACHE_HITS_TOTAL), sum(&CACHE_MISSES_TOTAL))
}

// Exporter for Prometheus text format
pub fn export_prometheus() -> String {
    Lazy::force(&APP_INFO).set(1);
    let metric_families = REGISTRY.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        "".to_string()
    }
}
