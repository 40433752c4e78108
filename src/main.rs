//! PDF export command line
//!
//! Rasterizes an SVG document and writes it as a paginated PDF.
//!
//! ```text
//! page-export <input.svg> [output-dir]
//! ```
//!
//! ## Configuration
//!
//! Environment variables (see `page_export::config`):
//! - `EXPORT_PAGE_SIZE`, `EXPORT_UNIT`, `EXPORT_MARGIN`, `EXPORT_ORIENTATION`
//! - `EXPORT_SCALE`, `EXPORT_BACKGROUND`, `EXPORT_IMAGE_ENCODING`
//! - `EXPORT_OUTPUT_DIR`, `EXPORT_DOCUMENT_NAME`
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP collector endpoint
//! - `RUST_LOG`: Log level (default: info)

use anyhow::{bail, Context, Result};
use page_export::config::ExportConfig;
use page_export::exporter::Exporter;
use page_export::raster::{SvgElement, SvgRasterizer};
use page_export::telemetry;
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = telemetry::init_telemetry() {
        warn!("Failed to initialize telemetry: {}", e);
    }

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next().map(PathBuf::from) else {
        bail!("usage: page-export <input.svg> [output-dir]");
    };

    let mut config = ExportConfig::from_env();
    if let Some(dir) = args.next() {
        config.output_dir = PathBuf::from(dir);
    }

    info!(
        "Configuration: format={:?}, scale={}, encoding={:?}, output_dir={}",
        config.format,
        config.options.scale,
        config.options.encoding,
        config.output_dir.display()
    );

    let svg = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let mut exporter = Exporter::with_options(SvgRasterizer::new().with_system_fonts(), config.options);
    if let Some(name) = &config.document_name {
        exporter = exporter.with_document_name(name.clone());
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling export...");
            on_ctrl_c.cancel();
        }
    });

    let output = exporter
        .export_document_with_cancel(&SvgElement::new(svg), &config.format, cancel)
        .await
        .context("PDF export failed")?;

    let path = output
        .save_to(&config.output_dir)
        .context("Failed to save PDF")?;

    info!("Exported {} pages to {}", output.page_count, path.display());
    telemetry::shutdown_telemetry();
    Ok(())
}
