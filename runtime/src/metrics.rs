//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for all bridge components:
//! - Correlation store rendezvous, buffering and timeouts
//! - Producer round trips
//! - Consumer receives and replies
//! - Endpoint adapter outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use syncbridge_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(rendered) = server.render() {
//!     println!("{rendered}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and renders the scrape output.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address advertised for scraping (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a warning
    /// and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Correlation Store Metrics
    describe_counter!(
        "correlation_store_rendezvous_total",
        "Values handed directly to a parked waiter"
    );
    describe_counter!(
        "correlation_store_buffered_total",
        "Values buffered because no waiter was parked"
    );
    describe_counter!(
        "correlation_store_overwrites_total",
        "Buffered values replaced before being consumed"
    );
    describe_counter!(
        "correlation_store_timeouts_total",
        "Lookups that timed out"
    );
    describe_counter!(
        "correlation_store_expired_total",
        "Buffered values evicted after their TTL"
    );
    describe_histogram!(
        "correlation_store_find_duration_seconds",
        "Time spent waiting in correlation store lookups"
    );

    // Producer Metrics
    describe_counter!(
        "sync_producer_requests_total",
        "Requests sent by synchronous producers"
    );
    describe_counter!(
        "sync_producer_replies_total",
        "Replies received by synchronous producers"
    );
    describe_counter!(
        "sync_producer_reply_timeouts_total",
        "Requests whose reply did not arrive in time"
    );
    describe_counter!(
        "sync_producer_unroutable_replies_total",
        "Replies dropped because they carried no correlation key"
    );
    describe_histogram!(
        "sync_producer_round_trip_duration_seconds",
        "Time from sending a request to receiving its reply"
    );

    // Consumer Metrics
    describe_counter!(
        "sync_consumer_messages_received_total",
        "Requests received by synchronous consumers"
    );
    describe_counter!(
        "sync_consumer_replies_sent_total",
        "Replies delivered by synchronous consumers"
    );
    describe_counter!(
        "sync_consumer_reply_errors_total",
        "Replies that could not be delivered"
    );

    // Adapter Metrics
    describe_counter!(
        "endpoint_adapter_no_response_total",
        "Adapter requests that timed out and simulated no response"
    );
}

/// Producer metrics recorder.
pub struct ProducerMetrics;

impl ProducerMetrics {
    /// Record a request sent.
    pub fn record_request() {
        counter!("sync_producer_requests_total").increment(1);
    }

    /// Record a completed round trip.
    pub fn record_reply(duration: Duration) {
        counter!("sync_producer_replies_total").increment(1);
        histogram!("sync_producer_round_trip_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a reply timeout.
    pub fn record_timeout() {
        counter!("sync_producer_reply_timeouts_total").increment(1);
    }

    /// Record a reply that could not be routed.
    pub fn record_unroutable() {
        counter!("sync_producer_unroutable_replies_total").increment(1);
    }
}

/// Consumer metrics recorder.
pub struct ConsumerMetrics;

impl ConsumerMetrics {
    /// Record a received request.
    pub fn record_receive() {
        counter!("sync_consumer_messages_received_total").increment(1);
    }

    /// Record a delivered reply.
    pub fn record_reply() {
        counter!("sync_consumer_replies_sent_total").increment(1);
    }

    /// Record a failed reply.
    pub fn record_reply_error() {
        counter!("sync_consumer_reply_errors_total").increment(1);
    }
}

/// Adapter metrics recorder.
pub struct AdapterMetrics;

impl AdapterMetrics {
    /// Record a request answered with no response.
    pub fn record_no_response() {
        counter!("endpoint_adapter_no_response_total").increment(1);
    }
}
