//! OpenTelemetry metrics for driver traffic.
//!
//! Key metrics:
//! - amqp_driver_sent_total: Counter of messages handed to the engine
//! - amqp_driver_outcomes_total: Counter of sender-side outcomes by kind
//! - amqp_driver_received_total: Counter of completed receives
//! - amqp_driver_flight_time_seconds: Histogram of receive-side flight times

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

use crate::stats::DeliveryOutcome;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Driver metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Messages handed to the engine.
    pub sent_total: Counter<u64>,
    /// Sender-side outcomes, labelled by kind.
    pub outcomes_total: Counter<u64>,
    /// Completed receives.
    pub received_total: Counter<u64>,
    /// Receive-side flight time in seconds.
    pub flight_time: Histogram<f64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            sent_total: meter
                .u64_counter("amqp_driver_sent_total")
                .with_description("Messages handed to the engine")
                .with_unit("1")
                .init(),
            outcomes_total: meter
                .u64_counter("amqp_driver_outcomes_total")
                .with_description("Sender-side delivery outcomes")
                .with_unit("1")
                .init(),
            received_total: meter
                .u64_counter("amqp_driver_received_total")
                .with_description("Completed receives")
                .with_unit("1")
                .init(),
            flight_time: meter
                .f64_histogram("amqp_driver_flight_time_seconds")
                .with_description("Send-to-receive flight time")
                .with_unit("s")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, using no-op metrics");
                    install_manual_reader();
                }
            }
        } else {
            // Metrics are recorded but not exported
            install_manual_reader();
        }

        let meter = global::meter("amqp-driver");
        Metrics::new(&meter)
    });
}

fn install_manual_reader() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider);
}

/// Record one message handed to the engine.
pub fn record_sent(address: &str) {
    if let Some(m) = METRICS.get() {
        m.sent_total
            .add(1, &[KeyValue::new("address", address.to_string())]);
    }
}

/// Record a sender-side outcome.
pub fn record_outcome(address: &str, outcome: DeliveryOutcome) {
    if let Some(m) = METRICS.get() {
        let attrs = [
            KeyValue::new("address", address.to_string()),
            KeyValue::new("outcome", outcome.as_str()),
        ];
        m.outcomes_total.add(1, &attrs);
    }
}

/// Record a completed receive and its flight time.
pub fn record_receive(address: &str, flight_time_seconds: f64) {
    if let Some(m) = METRICS.get() {
        let attrs = [KeyValue::new("address", address.to_string())];
        m.received_total.add(1, &attrs);
        m.flight_time.record(flight_time_seconds, &attrs);
    }
}
