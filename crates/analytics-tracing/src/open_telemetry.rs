use crate::SERVICE_NAME;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, trace::TracerProvider, Resource};
use tracing_opentelemetry::OpenTelemetryLayer;

/// Spans go to the OTLP gRPC endpoint in `OPENTELEMETRY_OTLP_GRPC_ENDPOINT`
/// when it is set, or to stdout when `OPENTELEMETRY_STDOUT` is set.
/// Without either, no telemetry layer is installed, stdout stays reserved for reports.
pub(crate) fn init_otel_layer<S>() -> Option<OpenTelemetryLayer<S, sdktrace::Tracer>>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    if let Ok(endpoint) = std::env::var("OPENTELEMETRY_OTLP_GRPC_ENDPOINT") {
        let otlp_exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint);

        let otlp_config = sdktrace::config().with_resource(Resource::new(vec![
            opentelemetry::KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                SERVICE_NAME,
            ),
        ]));

        match opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(otlp_exporter)
            .with_trace_config(otlp_config)
            .install_batch(runtime::Tokio)
        {
            Ok(tracer) => return Some(tracing_opentelemetry::layer::<S>().with_tracer(tracer)),
            Err(e) => {
                eprintln!(
                    "Failed to create OpenTelemetry tracer with otlp exporter: {}",
                    e
                );
            }
        }
    }

    if std::env::var("OPENTELEMETRY_STDOUT").is_ok() {
        let provider = TracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer(SERVICE_NAME);
        return Some(tracing_opentelemetry::layer::<S>().with_tracer(tracer));
    }

    None
}
