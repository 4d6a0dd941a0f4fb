//! Prometheus metrics for observability and monitoring.
//!
//! Metric families recorded by the runtime:
//! - Store: actions reduced, reducer latency, effects executed, shutdown
//! - Session: submissions, their failures by kind, remote updates and
//!   subscription drops
//! - Record store: inserts, list latency, update notifications
//!
//! # Example
//!
//! ```rust,no_run
//! use support_copilot_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

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
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the scrape endpoint.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or a different recorder
    /// is already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                tokio::spawn(async move {
                    // The exporter error carries no Display or Debug
                    if exporter.await.is_err() {
                        tracing::error!("Metrics endpoint stopped");
                    }
                });
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Address the scrape endpoint listens on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
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
pub fn register_metrics() {
    // Store
    describe_counter!(
        "store.actions.total",
        "Total number of actions reduced by the store"
    );
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside the reducer while holding the state lock"
    );
    describe_counter!(
        "store.effects.executed",
        "Effects started by the store, labelled by effect type"
    );
    describe_counter!("store.shutdown.initiated", "Graceful shutdowns started");
    describe_counter!(
        "store.shutdown.completed",
        "Graceful shutdowns that finished before their timeout"
    );
    describe_counter!(
        "store.shutdown.timeout",
        "Graceful shutdowns that timed out with effects still running"
    );
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );

    // Session
    describe_counter!("session.submissions.total", "Ticket submissions started");
    describe_counter!(
        "session.submission.failures",
        "Submissions that failed, labelled by kind (persist or trigger)"
    );
    describe_counter!(
        "session.remote_updates.received",
        "Row updates delivered by the record store subscription"
    );
    describe_counter!(
        "session.subscription.dropped",
        "Update subscriptions that ended without being released"
    );
    describe_gauge!(
        "session.tickets.visible",
        "Tickets in the local list after the last reduction"
    );

    // Record store (Postgres adapter)
    describe_counter!("record_store.tickets.created", "Ticket rows inserted");
    describe_histogram!(
        "record_store.list.duration_seconds",
        "Time to read every ticket row, newest first"
    );
    describe_counter!(
        "record_store.notifications.received",
        "Row update notifications received on the listen channel"
    );
}
