use lazy_static::lazy_static;
/// Prometheus Metrics
/// Application monitoring and observability
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // === HTTP Metrics ===

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds")
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "endpoint"]
    ).unwrap();

    // === Queue / Job Metrics ===

    pub static ref JOBS_ENQUEUED: CounterVec = CounterVec::new(
        Opts::new("jobs_enqueued_total", "Total jobs enqueued"),
        &["queue", "kind"]
    ).unwrap();

    pub static ref JOBS_COMPLETED: CounterVec = CounterVec::new(
        Opts::new("jobs_completed_total", "Total jobs completed"),
        &["queue", "kind"]
    ).unwrap();

    pub static ref JOBS_FAILED: CounterVec = CounterVec::new(
        Opts::new("jobs_failed_total", "Total jobs failed"),
        &["queue", "kind"]
    ).unwrap();

    pub static ref JOBS_ALREADY_RUNNING: CounterVec = CounterVec::new(
        Opts::new("jobs_already_running_total", "Dedupe short-circuits"),
        &["queue", "kind"]
    ).unwrap();

    pub static ref JOB_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("job_duration_seconds", "Job execution duration")
            .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0]),
        &["queue", "kind"]
    ).unwrap();

    pub static ref QUEUE_DEPTH: GaugeVec = GaugeVec::new(
        Opts::new("queue_depth", "Current waiting-job depth"),
        &["queue"]
    ).unwrap();

    // === Scheduler Metrics ===

    pub static ref SCHEDULER_SKIPPED: CounterVec = CounterVec::new(
        Opts::new("scheduler_skipped_total", "Dashboard requests skipped by the freshness gate"),
        &["scope"]
    ).unwrap();

    pub static ref SCHEDULER_FOLLOWUPS_QUEUED: CounterVec = CounterVec::new(
        Opts::new("scheduler_followups_queued_total", "Follow-up scopes enqueued on completion"),
        &["scope"]
    ).unwrap();

    // === Lock Metrics ===

    pub static ref LOCK_ACQUIRE_ATTEMPTS: CounterVec = CounterVec::new(
        Opts::new("lock_acquire_attempts_total", "Lock acquire attempts"),
        &["result"]
    ).unwrap();

    // === Fetcher Metrics ===

    pub static ref FETCHER_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("fetcher_requests_total", "Requests made to the external provider"),
        &["operation", "status"]
    ).unwrap();

    pub static ref FETCHER_CACHE_HITS: Counter = Counter::new(
        "fetcher_cache_hits_total",
        "Signatures resolved from the raw transaction cache without a provider call"
    ).unwrap();

    pub static ref FETCHER_CACHE_MISSES: Counter = Counter::new(
        "fetcher_cache_misses_total",
        "Signatures that required a provider call"
    ).unwrap();

    // === Database Metrics ===

    pub static ref DB_QUERIES: CounterVec = CounterVec::new(
        Opts::new("db_queries_total", "Total database queries"),
        &["operation"]
    ).unwrap();

    pub static ref DB_QUERY_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("db_query_duration_seconds", "Database query duration")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["operation"]
    ).unwrap();

    // === Event Bus / Gateway Metrics ===

    pub static ref EVENTS_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("events_published_total", "Events published to the broker"),
        &["event_type"]
    ).unwrap();

    pub static ref EVENTS_PUBLISH_DROPPED: Counter = Counter::new(
        "events_publish_dropped_total",
        "Events dropped after exhausting publish retries"
    ).unwrap();

    pub static ref GATEWAY_SUBSCRIBERS: Gauge = Gauge::new(
        "gateway_subscribers",
        "Currently connected WebSocket subscribers"
    ).unwrap();

    // === Circuit Breaker Metrics ===

    pub static ref CIRCUIT_BREAKER_STATE: GaugeVec = GaugeVec::new(
        Opts::new("circuit_breaker_state", "Circuit breaker state (0=closed, 1=open, 2=half-open)"),
        &["service"]
    ).unwrap();

    pub static ref CIRCUIT_BREAKER_TRIPS: CounterVec = CounterVec::new(
        Opts::new("circuit_breaker_trips_total", "Total circuit breaker trips"),
        &["service"]
    ).unwrap();
}

/// Initialize metrics registry
pub fn init_metrics() {
    REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone())).unwrap();

    REGISTRY.register(Box::new(JOBS_ENQUEUED.clone())).unwrap();
    REGISTRY.register(Box::new(JOBS_COMPLETED.clone())).unwrap();
    REGISTRY.register(Box::new(JOBS_FAILED.clone())).unwrap();
    REGISTRY.register(Box::new(JOBS_ALREADY_RUNNING.clone())).unwrap();
    REGISTRY.register(Box::new(JOB_DURATION.clone())).unwrap();
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone())).unwrap();

    REGISTRY.register(Box::new(SCHEDULER_SKIPPED.clone())).unwrap();
    REGISTRY.register(Box::new(SCHEDULER_FOLLOWUPS_QUEUED.clone())).unwrap();

    REGISTRY.register(Box::new(LOCK_ACQUIRE_ATTEMPTS.clone())).unwrap();

    REGISTRY.register(Box::new(FETCHER_REQUESTS.clone())).unwrap();
    REGISTRY.register(Box::new(FETCHER_CACHE_HITS.clone())).unwrap();
    REGISTRY.register(Box::new(FETCHER_CACHE_MISSES.clone())).unwrap();

    REGISTRY.register(Box::new(DB_QUERIES.clone())).unwrap();
    REGISTRY.register(Box::new(DB_QUERY_DURATION.clone())).unwrap();

    REGISTRY.register(Box::new(EVENTS_PUBLISHED.clone())).unwrap();
    REGISTRY.register(Box::new(EVENTS_PUBLISH_DROPPED.clone())).unwrap();
    REGISTRY.register(Box::new(GATEWAY_SUBSCRIBERS.clone())).unwrap();

    REGISTRY.register(Box::new(CIRCUIT_BREAKER_STATE.clone())).unwrap();
    REGISTRY.register(Box::new(CIRCUIT_BREAKER_TRIPS.clone())).unwrap();
}

/// Get metrics in Prometheus format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Timer helper for measuring durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn observe_and_reset(&mut self, histogram: &Histogram) -> f64 {
        let duration = self.elapsed_secs();
        histogram.observe(duration);
        self.start = Instant::now();
        duration
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_secs();
        assert!(elapsed >= 0.01);
    }
}
