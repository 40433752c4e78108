//! Telemetry and structured logging for exports.

use crate::job::{ExportJob, ExportPhase};
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::{global, KeyValue};
use tracing::{info, warn};

/// Exports slower than this are reported as exceeding the threshold.
const SLOW_EXPORT_MS: i64 = 5000;

/// Records telemetry for a completed or failed export.
///
/// Emits a `pdf_export` span and structured log lines with the duration,
/// outcome, page count and error classification.
pub fn record_export_telemetry(job: &ExportJob) {
    let tracer = global::tracer("page-export");
    let mut span = tracer.start("pdf_export");

    span.set_attribute(KeyValue::new("job_id", job.job_id.clone()));
    span.set_attribute(KeyValue::new("document_name", job.document_name.clone()));
    span.set_attribute(KeyValue::new("status", job.phase.to_string()));

    if let Some(page_count) = job.page_count {
        span.set_attribute(KeyValue::new("page_count", page_count as i64));
    }

    if let Some(duration_ms) = job.processing_duration_ms() {
        span.set_attribute(KeyValue::new("duration_ms", duration_ms));

        info!(
            job_id = %job.job_id,
            document = %job.document_name,
            duration_ms = duration_ms,
            status = %job.phase,
            pages = job.page_count.unwrap_or(0),
            "PDF export finished"
        );

        if duration_ms > SLOW_EXPORT_MS {
            warn!(
                job_id = %job.job_id,
                duration_ms = duration_ms,
                "PDF export exceeded performance threshold (5000ms)"
            );
        }
    }

    if job.phase == ExportPhase::Failed {
        if let Some(ref error) = job.error {
            span.set_attribute(KeyValue::new("error", error.clone()));
            if let Some(ref kind) = job.error_kind {
                span.set_attribute(KeyValue::new("error_kind", kind.clone()));
            }
            warn!(
                job_id = %job.job_id,
                error = %error,
                kind = job.error_kind.as_deref().unwrap_or("unknown"),
                "PDF export failed"
            );
        }
    }

    span.end();
}

/// Initializes OpenTelemetry with an OTLP exporter.
///
/// Call once at startup, from within the Tokio runtime. Reads:
/// - `OTEL_EXPORTER_OTLP_ENDPOINT` - Collector endpoint (default: http://localhost:4317)
/// - `OTEL_SERVICE_NAME` - Service name (default: page-export)
pub fn init_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::Config;

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "page-export".to_string());

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&endpoint),
        )
        .with_trace_config(Config::default().with_resource(
            opentelemetry_sdk::Resource::new(vec![
                KeyValue::new("service.name", service_name),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    if let Some(provider) = tracer.provider() {
        global::set_tracer_provider(provider);
    }

    info!("Telemetry initialized: endpoint={}", endpoint);
    Ok(())
}

/// Flushes pending spans before the process exits.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
