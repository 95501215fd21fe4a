//! Metrics and tracing helpers.
//!
//! With the `metrics` feature, [`METRICS`] records query executions, planning
//! errors and result parsing through OpenTelemetry instruments exported into a
//! Prometheus registry. With the `tracing` feature, [`tracing_helpers`] opens
//! spans around planning, execution and parsing.

#[cfg(feature = "metrics")]
pub use self::otel::{LifeguardMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry_prometheus::PrometheusExporter;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};

    pub static METRICS: Lazy<LifeguardMetrics> = Lazy::new(LifeguardMetrics::init);

    pub struct LifeguardMetrics {
        pub registry: Registry,
        pub exporter: Option<PrometheusExporter>,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub planning_errors_total: Counter<u64>,
        pub rows_parsed_total: Counter<u64>,
        pub models_materialized_total: Counter<u64>,
        _provider: SdkMeterProvider,
    }

    impl LifeguardMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let exporter = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => Some(exporter),
                Err(e) => {
                    log::warn!("prometheus exporter unavailable, metrics will not be exported: {}", e);
                    None
                }
            };

            let mut provider = SdkMeterProvider::builder();
            if let Some(exporter) = exporter.clone() {
                provider = provider.with_reader(exporter);
            }
            let provider = provider.build();
            let meter = provider.meter("lifeguard_graph");

            let queries_total = meter
                .u64_counter("lifeguard_graph_queries_total")
                .with_description("Total statements sent to the executor")
                .build();

            let query_errors_total = meter
                .u64_counter("lifeguard_graph_query_errors_total")
                .with_description("Statements the executor rejected")
                .build();

            let query_duration = meter
                .f64_histogram("lifeguard_graph_query_duration_seconds")
                .with_description("Duration of executed statements")
                .build();

            let planning_errors_total = meter
                .u64_counter("lifeguard_graph_planning_errors_total")
                .with_description("Queries rejected before execution")
                .build();

            let rows_parsed_total = meter
                .u64_counter("lifeguard_graph_rows_parsed_total")
                .with_description("Flat rows folded back into model graphs")
                .build();

            let models_materialized_total = meter
                .u64_counter("lifeguard_graph_models_materialized_total")
                .with_description("Distinct models created by the join result parser")
                .build();

            Self {
                registry,
                exporter,
                queries_total,
                query_errors_total,
                query_duration,
                planning_errors_total,
                rows_parsed_total,
                models_materialized_total,
                _provider: provider,
            }
        }

        pub fn record_query_duration(&self, elapsed: std::time::Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_planning_error(&self) {
            self.planning_errors_total.add(1, &[]);
        }

        pub fn record_parse(&self, rows: usize, models: usize) {
            self.rows_parsed_total.add(rows as u64, &[]);
            self.models_materialized_total.add(models as u64, &[]);
        }

        /// Render the registry in the Prometheus text format
        pub fn gather_text(&self) -> String {
            let families = self.registry.gather();
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&families, &mut buffer) {
                log::warn!("failed to encode metrics: {}", e);
            }
            String::from_utf8_lossy(&buffer).into_owned()
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn plan_graph_span(expression: &str, model: &str) -> Span {
        info_span!("lifeguard_graph.plan", expression = %expression, model = %model)
    }

    pub fn execute_query_span(query: &str) -> Span {
        info_span!("lifeguard_graph.execute", sql = %query)
    }

    pub fn parse_result_span(rows: usize) -> Span {
        info_span!("lifeguard_graph.parse", rows = rows)
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record_without_panicking() {
        METRICS.record_query_duration(std::time::Duration::from_millis(3));
        METRICS.record_query_error();
        METRICS.record_planning_error();
        METRICS.record_parse(4, 2);
        // The text rendering must never fail, even if nothing has been collected yet
        let _ = METRICS.gather_text();
    }
}
