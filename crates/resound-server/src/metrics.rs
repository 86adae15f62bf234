//! Prometheus metrics
//!
//! Counters for catalog and track mutations plus search counts and latency,
//! exposed in text form at `/_metrics`.

use std::sync::OnceLock;

use prometheus::{
    exponential_buckets, CounterVec, Encoder, HistogramOpts, HistogramTimer, HistogramVec,
    Opts, Registry, TextEncoder,
};

const NAMESPACE: &str = "acoustid_priv";

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static CATALOG_ACTIONS: OnceLock<CounterVec> = OnceLock::new();
static TRACK_ACTIONS: OnceLock<CounterVec> = OnceLock::new();
static SEARCHES: OnceLock<CounterVec> = OnceLock::new();
static SEARCH_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Global metrics registry, initialised on first use.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let registry = Registry::new();
        register_metrics(&registry);
        registry
    })
}

fn register_metrics(registry: &Registry) {
    let catalog_actions = CounterVec::new(
        Opts::new(
            "catalog_action_total",
            "Number of catalog actions partitioned by action type",
        )
        .namespace(NAMESPACE),
        &["action"],
    )
    .expect("failed to create catalog_action_total");
    registry
        .register(Box::new(catalog_actions.clone()))
        .expect("failed to register catalog_action_total");
    CATALOG_ACTIONS.set(catalog_actions).ok();

    let track_actions = CounterVec::new(
        Opts::new(
            "track_action_total",
            "Number of track actions partitioned by action type",
        )
        .namespace(NAMESPACE),
        &["action"],
    )
    .expect("failed to create track_action_total");
    registry
        .register(Box::new(track_actions.clone()))
        .expect("failed to register track_action_total");
    TRACK_ACTIONS.set(track_actions).ok();

    let searches = CounterVec::new(
        Opts::new("search_total", "Number of searches partitioned by type").namespace(NAMESPACE),
        &["type"],
    )
    .expect("failed to create search_total");
    registry
        .register(Box::new(searches.clone()))
        .expect("failed to register search_total");
    SEARCHES.set(searches).ok();

    let search_duration = HistogramVec::new(
        HistogramOpts::new(
            "search_duration_seconds",
            "Histogram of search durations partitioned by type",
        )
        .namespace(NAMESPACE)
        .buckets(exponential_buckets(0.025, 1.5, 10).expect("invalid histogram buckets")),
        &["type"],
    )
    .expect("failed to create search_duration_seconds");
    registry
        .register(Box::new(search_duration.clone()))
        .expect("failed to register search_duration_seconds");
    SEARCH_DURATION.set(search_duration).ok();
}

pub fn catalog_action(action: &str) {
    registry();
    if let Some(counter) = CATALOG_ACTIONS.get() {
        counter.with_label_values(&[action]).inc();
    }
}

pub fn track_action(action: &str) {
    registry();
    if let Some(counter) = TRACK_ACTIONS.get() {
        counter.with_label_values(&[action]).inc();
    }
}

/// Count a search and start its latency timer. The timer observes the
/// histogram when dropped.
pub fn search_started(search_type: &str) -> HistogramTimer {
    registry();
    if let Some(counter) = SEARCHES.get() {
        counter.with_label_values(&[search_type]).inc();
    }
    SEARCH_DURATION
        .get()
        .expect("metrics registry not initialised")
        .with_label_values(&[search_type])
        .start_timer()
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&registry().gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {err}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
