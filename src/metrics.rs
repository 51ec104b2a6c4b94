//! Optional metrics (`metrics` feature) and tracing spans (`tracing` feature).

#[cfg(feature = "metrics")]
pub use prometheus_metrics::{FinderMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
    };
    use opentelemetry_prometheus::PrometheusExporter;

    pub static METRICS: Lazy<FinderMetrics> = Lazy::new(FinderMetrics::init);

    pub struct FinderMetrics {
        pub exporter: PrometheusExporter,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub records_materialized: Counter<u64>,
        pub lazy_loads_total: Counter<u64>,
    }

    impl FinderMetrics {
        pub fn init() -> Self {
            let exporter = opentelemetry_prometheus::exporter()
                .build()
                .expect("failed to build prometheus exporter");
            let meter = global::meter("active_finder");

            let queries_total = meter
                .u64_counter("finder_queries_total")
                .with_description("Total statements executed")
                .build();

            let query_errors_total = meter
                .u64_counter("finder_query_errors_total")
                .with_description("Statements that failed to execute")
                .build();

            let query_duration = meter
                .f64_histogram("finder_query_duration_seconds")
                .with_description("Duration of statements")
                .build();

            let records_materialized = meter
                .u64_counter("finder_records_materialized_total")
                .with_description("Distinct records decoded from result rows")
                .build();

            let lazy_loads_total = meter
                .u64_counter("finder_lazy_loads_total")
                .with_description("Relations resolved by lazy loading")
                .build();

            Self {
                exporter,
                queries_total,
                query_errors_total,
                query_duration,
                records_materialized,
                lazy_loads_total,
            }
        }

        pub fn record_query_duration(&self, elapsed: std::time::Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_materialized(&self) {
            self.records_materialized.add(1, &[]);
        }

        pub fn record_lazy_load(&self) {
            self.lazy_loads_total.add(1, &[]);
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn execute_query_span(sql: &str) -> Span {
        info_span!("finder.execute_query", sql = %sql)
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("finder.acquire_connection")
    }

    pub fn build_join_tree_span(entity: &str) -> Span {
        info_span!("finder.build_join_tree", entity = %entity)
    }

    pub fn lazy_load_span(entity: &str, relation: &str) -> Span {
        info_span!("finder.lazy_load", entity = %entity, relation = %relation)
    }
}
