//! Optional OpenTelemetry OTLP exporter, built only under the `otel`
//! feature so the default build stays `tracing_subscriber::fmt`-only.

#[cfg(feature = "otel")]
mod otlp {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;

    pub fn otlp_layer(
        endpoint: &str,
    ) -> Result<tracing_opentelemetry::OpenTelemetryLayer<tracing_subscriber::Registry, opentelemetry_sdk::trace::Tracer>, Box<dyn std::error::Error>>
    {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()?;

        let provider = opentelemetry_sdk::trace::TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .build();

        let tracer = provider.tracer("db-otel");
        Ok(tracing_opentelemetry::layer().with_tracer(tracer))
    }
}

#[cfg(feature = "otel")]
pub use otlp::otlp_layer;
