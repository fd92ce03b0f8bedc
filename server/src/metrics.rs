use axum::{http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder");

        metrics::describe_counter!(
            "cachet_messages_created_total",
            "Total number of messages created"
        );
        metrics::describe_counter!(
            "cachet_messages_anchored_total",
            "Total number of messages fully anchored (blob + ledger)"
        );
        metrics::describe_counter!(
            "cachet_anchor_failures_total",
            "Total number of failed anchoring attempts"
        );
        metrics::describe_counter!(
            "cachet_messages_expired_total",
            "Total number of messages destroyed by the expiry sweep"
        );
        metrics::describe_counter!(
            "cachet_messages_revoked_total",
            "Total number of messages revoked by their sender"
        );
        metrics::describe_counter!(
            "cachet_unwind_failures_total",
            "Unpin/revocation failures leaving orphaned blob or ledger entries"
        );

        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn record_message_created() {
    metrics::counter!("cachet_messages_created_total", 1);
}

pub fn record_message_anchored() {
    metrics::counter!("cachet_messages_anchored_total", 1);
}

pub fn record_anchor_failure() {
    metrics::counter!("cachet_anchor_failures_total", 1);
}

pub fn record_message_expired() {
    metrics::counter!("cachet_messages_expired_total", 1);
}

pub fn record_message_revoked() {
    metrics::counter!("cachet_messages_revoked_total", 1);
}

pub fn record_unwind_failure() {
    metrics::counter!("cachet_unwind_failures_total", 1);
}

/// Handler for the Prometheus metrics endpoint
pub async fn metrics_handler(handle: axum::extract::State<PrometheusHandle>) -> impl IntoResponse {
    (StatusCode::OK, handle.render())
}
