//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): requests by match kind and status
//! - `dispatch_request_duration_seconds` (histogram): time spent in the chain
//! - `dispatch_registrations` (gauge): live registrations per table
//! - `dispatch_registration_events_total` (counter): register/unregister by kind

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::registration::RegistrationKind;
use crate::routing::MatchKind;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn match_label(kind: Option<MatchKind>) -> &'static str {
    match kind {
        None => "none",
        Some(MatchKind::Exact) => "exact",
        Some(MatchKind::Prefix) => "prefix",
        Some(MatchKind::Extension) => "extension",
        Some(MatchKind::Default) => "default",
        Some(MatchKind::ContextRoot) => "context_root",
    }
}

fn kind_label(kind: RegistrationKind) -> &'static str {
    match kind {
        RegistrationKind::Endpoint => "endpoint",
        RegistrationKind::Middleware => "middleware",
        RegistrationKind::Resource => "resource",
    }
}

pub fn record_dispatch(kind: Option<MatchKind>, status: u16, start: Instant) {
    let label = match_label(kind);
    let status = status.to_string();
    ::metrics::counter!("dispatch_requests_total", "match" => label, "status" => status.clone())
        .increment(1);
    ::metrics::histogram!("dispatch_request_duration_seconds", "match" => label, "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_registration(event: &'static str, kind: RegistrationKind, live: usize) {
    ::metrics::counter!(
        "dispatch_registration_events_total",
        "event" => event,
        "kind" => kind_label(kind)
    )
    .increment(1);
    ::metrics::gauge!("dispatch_registrations").set(live as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(match_label(None), "none");
        assert_eq!(match_label(Some(MatchKind::ContextRoot)), "context_root");
        assert_eq!(kind_label(RegistrationKind::Resource), "resource");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_dispatch(Some(MatchKind::Exact), 200, Instant::now());
        record_registration("register", RegistrationKind::Endpoint, 1);
    }
}
