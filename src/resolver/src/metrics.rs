//! Prometheus metrics collection for attribute resolution

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Resolver performance metrics
#[derive(Debug, Clone, Default)]
pub struct ResolverMetrics {
    /// Total number of attribute requests
    pub total_requests: u64,

    /// Requests answered from directory records
    pub directory_resolutions: u64,

    /// Requests answered from org-unit records
    pub backend_resolutions: u64,

    /// Requests for attributes no source provides
    pub unknown_attributes: u64,

    /// Requests answered with the configured null value
    pub null_results: u64,

    /// Principal lookups served from the cache
    pub principal_hits: u64,

    /// Principal lookups that fell through to the directory
    pub principal_misses: u64,

    /// Scoped backend queries issued for org-unit misses
    pub backend_queries: u64,

    /// Requests that had to wait for a running backend refresh
    pub refresh_waits: u64,

    /// Latency percentiles, resolved to histogram bucket bounds
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_p999_ms: f64,

    /// Average latency
    pub avg_latency_ms: f64,

    /// Error count
    pub error_count: u64,
}

impl ResolverMetrics {
    /// Calculate principal cache hit rate
    pub fn principal_hit_rate(&self) -> f64 {
        let total = self.principal_hits + self.principal_misses;
        if total == 0 {
            0.0
        } else {
            self.principal_hits as f64 / total as f64
        }
    }

    /// Share of requests that produced a non-null value
    pub fn resolution_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.total_requests - self.null_results) as f64 / self.total_requests as f64
        }
    }
}

/// Which path answered a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPath {
    Directory,
    Backend,
    Unknown,
    /// Request ended before routing (no correlation key or no principal)
    Unresolved,
}

/// Latency histogram buckets, including the unbounded one
const LATENCY_BUCKETS: usize = 17;

/// Upper bounds of the bounded latency buckets, in milliseconds
const LATENCY_BOUNDS_MS: [f64; LATENCY_BUCKETS - 1] = [
    0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0,
    5_000.0, 10_000.0,
];

/// Fixed-bucket latency histogram; the last bucket is unbounded
struct LatencyHistogram {
    buckets: [AtomicU64; LATENCY_BUCKETS],
    count: AtomicU64,
    sum_micros: AtomicU64,
    max_micros: AtomicU64,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            sum_micros: AtomicU64::new(0),
            max_micros: AtomicU64::new(0),
        }
    }

    fn observe(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        let ms = micros as f64 / 1000.0;
        let bucket = LATENCY_BOUNDS_MS
            .iter()
            .position(|bound| ms <= *bound)
            .unwrap_or(LATENCY_BOUNDS_MS.len());

        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    fn counts(&self) -> Vec<u64> {
        self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }

    /// Upper bound of the bucket holding the `p` quantile, capped at the largest sample
    fn percentile_ms(counts: &[u64], total: u64, max_ms: f64, p: f64) -> f64 {
        if total == 0 {
            return 0.0;
        }

        let rank = ((total as f64) * p).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (i, count) in counts.iter().enumerate() {
            seen += count;
            if seen >= rank {
                let bound = LATENCY_BOUNDS_MS.get(i).copied().unwrap_or(f64::INFINITY);
                return bound.min(max_ms);
            }
        }
        max_ms
    }

    fn reset(&self) {
        for bucket in &self.buckets {
            bucket.store(0, Ordering::Relaxed);
        }
        self.count.store(0, Ordering::Relaxed);
        self.sum_micros.store(0, Ordering::Relaxed);
        self.max_micros.store(0, Ordering::Relaxed);
    }
}

/// Lock-free metrics collector with Prometheus export.
///
/// Recording is a handful of relaxed atomic increments; percentiles are
/// derived from the histogram only when a snapshot or export is taken.
pub struct MetricsCollector {
    total_requests: AtomicU64,
    directory_resolutions: AtomicU64,
    backend_resolutions: AtomicU64,
    unknown_attributes: AtomicU64,
    null_results: AtomicU64,
    principal_hits: AtomicU64,
    principal_misses: AtomicU64,
    backend_queries: AtomicU64,
    refresh_waits: AtomicU64,
    error_count: AtomicU64,
    latency: LatencyHistogram,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            directory_resolutions: AtomicU64::new(0),
            backend_resolutions: AtomicU64::new(0),
            unknown_attributes: AtomicU64::new(0),
            null_results: AtomicU64::new(0),
            principal_hits: AtomicU64::new(0),
            principal_misses: AtomicU64::new(0),
            backend_queries: AtomicU64::new(0),
            refresh_waits: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            latency: LatencyHistogram::new(),
        }
    }

    /// Record the outcome of one attribute request
    pub fn record_resolution(&self, path: ResolutionPath, null: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let counter = match path {
            ResolutionPath::Directory => Some(&self.directory_resolutions),
            ResolutionPath::Backend => Some(&self.backend_resolutions),
            ResolutionPath::Unknown => Some(&self.unknown_attributes),
            ResolutionPath::Unresolved => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        if null {
            self.null_results.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a principal cache lookup
    pub fn record_principal_lookup(&self, hit: bool) {
        let counter = if hit {
            &self.principal_hits
        } else {
            &self.principal_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_query(&self) {
        self.backend_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_wait(&self) {
        self.refresh_waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record request latency
    pub fn record_latency(&self, latency: Duration) {
        self.latency.observe(latency);
    }

    /// Record an error
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn get_metrics(&self) -> ResolverMetrics {
        let counts = self.latency.counts();
        let samples = self.latency.count.load(Ordering::Relaxed);
        let max_ms = self.latency.max_micros.load(Ordering::Relaxed) as f64 / 1000.0;
        let sum_ms = self.latency.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0;
        let percentile = |p| LatencyHistogram::percentile_ms(&counts, samples, max_ms, p);

        ResolverMetrics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            directory_resolutions: self.directory_resolutions.load(Ordering::Relaxed),
            backend_resolutions: self.backend_resolutions.load(Ordering::Relaxed),
            unknown_attributes: self.unknown_attributes.load(Ordering::Relaxed),
            null_results: self.null_results.load(Ordering::Relaxed),
            principal_hits: self.principal_hits.load(Ordering::Relaxed),
            principal_misses: self.principal_misses.load(Ordering::Relaxed),
            backend_queries: self.backend_queries.load(Ordering::Relaxed),
            refresh_waits: self.refresh_waits.load(Ordering::Relaxed),
            latency_p50_ms: percentile(0.50),
            latency_p90_ms: percentile(0.90),
            latency_p95_ms: percentile(0.95),
            latency_p99_ms: percentile(0.99),
            latency_p999_ms: percentile(0.999),
            avg_latency_ms: if samples == 0 {
                0.0
            } else {
                sum_ms / samples as f64
            },
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.directory_resolutions,
            &self.backend_resolutions,
            &self.unknown_attributes,
            &self.null_results,
            &self.principal_hits,
            &self.principal_misses,
            &self.backend_queries,
            &self.refresh_waits,
            &self.error_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.latency.reset();
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let metrics = self.get_metrics();

        let mut out = format!(
            r#"# HELP attrbridge_requests_total Total number of attribute requests
# TYPE attrbridge_requests_total counter
attrbridge_requests_total {}

# HELP attrbridge_directory_resolutions_total Requests answered from directory records
# TYPE attrbridge_directory_resolutions_total counter
attrbridge_directory_resolutions_total {}

# HELP attrbridge_backend_resolutions_total Requests answered from org-unit records
# TYPE attrbridge_backend_resolutions_total counter
attrbridge_backend_resolutions_total {}

# HELP attrbridge_unknown_attributes_total Requests for unrouted attributes
# TYPE attrbridge_unknown_attributes_total counter
attrbridge_unknown_attributes_total {}

# HELP attrbridge_null_results_total Requests answered with the null value
# TYPE attrbridge_null_results_total counter
attrbridge_null_results_total {}

# HELP attrbridge_principal_hits_total Principal cache hits
# TYPE attrbridge_principal_hits_total counter
attrbridge_principal_hits_total {}

# HELP attrbridge_principal_misses_total Principal cache misses
# TYPE attrbridge_principal_misses_total counter
attrbridge_principal_misses_total {}

# HELP attrbridge_backend_queries_total Scoped backend queries
# TYPE attrbridge_backend_queries_total counter
attrbridge_backend_queries_total {}

# HELP attrbridge_refresh_waits_total Requests delayed by a backend refresh
# TYPE attrbridge_refresh_waits_total counter
attrbridge_refresh_waits_total {}

# HELP attrbridge_errors_total Error count
# TYPE attrbridge_errors_total counter
attrbridge_errors_total {}

# HELP attrbridge_latency_seconds Request latency
# TYPE attrbridge_latency_seconds histogram
"#,
            metrics.total_requests,
            metrics.directory_resolutions,
            metrics.backend_resolutions,
            metrics.unknown_attributes,
            metrics.null_results,
            metrics.principal_hits,
            metrics.principal_misses,
            metrics.backend_queries,
            metrics.refresh_waits,
            metrics.error_count,
        );

        let mut cumulative = 0;
        for (i, count) in self.latency.counts().iter().enumerate() {
            cumulative += count;
            let le = LATENCY_BOUNDS_MS
                .get(i)
                .map_or_else(
                    || "+Inf".to_string(),
                    |ms| ((ms * 1000.0).round() / 1_000_000.0).to_string(),
                );
            out.push_str(&format!(
                "attrbridge_latency_seconds_bucket{{le=\"{le}\"}} {cumulative}\n"
            ));
        }
        out.push_str(&format!(
            "attrbridge_latency_seconds_sum {}\nattrbridge_latency_seconds_count {}\n",
            self.latency.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            cumulative,
        ));
        out
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
