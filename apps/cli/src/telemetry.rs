//! Prometheus exporter for the HTTP API.
//!
//! Request metrics are recorded by the router middleware; search and load
//! metrics come from `paperflow_search`.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use paperflow_search::{
    INDEX_DIMENSIONS, PAPERS_LOADED, SEARCH_DURATION_SECONDS, SEARCH_QUERIES_TOTAL,
};

pub(crate) const REQUESTS_TOTAL: &str = "api_requests_total";
pub(crate) const REQUEST_DURATION_SECONDS: &str = "api_request_duration_seconds";
const APP_INFO: &str = "api_info";

const REQUEST_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
const SEARCH_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Install the global recorder. Fails if one is already installed.
pub(crate) fn install() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION_SECONDS.into()), REQUEST_BUCKETS)?
        .set_buckets_for_metric(Matcher::Full(SEARCH_DURATION_SECONDS.into()), SEARCH_BUCKETS)?
        .install_recorder()?;

    metrics::describe_counter!(REQUESTS_TOTAL, "Total request count");
    metrics::describe_histogram!(REQUEST_DURATION_SECONDS, "Request latency in seconds");
    metrics::describe_counter!(SEARCH_QUERIES_TOTAL, "Total number of search queries executed");
    metrics::describe_histogram!(SEARCH_DURATION_SECONDS, "Search query latency in seconds");
    metrics::describe_gauge!(PAPERS_LOADED, "Number of papers currently loaded in the store");
    metrics::describe_gauge!(INDEX_DIMENSIONS, "Embedding dimensions in the search index");
    metrics::gauge!(APP_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    Ok(handle)
}
