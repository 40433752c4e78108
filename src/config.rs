//! Environment-driven configuration.
//!
//! | Variable                 | Default   |
//! |--------------------------|-----------|
//! | `EXPORT_SCALE`           | `2`       |
//! | `EXPORT_PAGE_SIZE`       | `a4`      |
//! | `EXPORT_UNIT`            | `mm`      |
//! | `EXPORT_MARGIN`          | 10 mm     |
//! | `EXPORT_ORIENTATION`     | `portrait`|
//! | `EXPORT_BACKGROUND`      | `#ffffff` |
//! | `EXPORT_IMAGE_ENCODING`  | `jpeg`    |
//! | `EXPORT_JPEG_QUALITY`    | `100`     |
//! | `EXPORT_OVERLAP_PX`      | `0`       |
//! | `EXPORT_OUTPUT_DIR`      | `.`       |
//! | `EXPORT_DOCUMENT_NAME`   | unset     |
//!
//! Unparseable values fall back to the default with a warning.

use crate::exporter::ExportOptions;
use crate::format::{Orientation, PageFormat};
use crate::raster::BackgroundColor;
use crate::renderer::ImageEncoding;
use crate::units::UnitSystem;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub format: PageFormat,
    pub options: ExportOptions,
    pub output_dir: PathBuf,
    pub document_name: Option<String>,
}

impl ExportConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ExportOptions::default();

        let unit = var(&lookup, "EXPORT_UNIT", UnitSystem::parse).unwrap_or(UnitSystem::Millimeter);
        let orientation =
            var(&lookup, "EXPORT_ORIENTATION", Orientation::parse).unwrap_or(Orientation::Portrait);

        let mut format = var(&lookup, "EXPORT_PAGE_SIZE", PageFormat::preset)
            .unwrap_or_default()
            .in_unit(unit)
            .with_orientation(orientation);
        if let Some(margin) = var(&lookup, "EXPORT_MARGIN", parse_number) {
            format = format.with_margin(margin);
        }

        let scale = var(&lookup, "EXPORT_SCALE", |v| parse_number(v).filter(|s| *s > 0.0))
            .map(|s| s as f32)
            .unwrap_or(defaults.scale);

        let background = var(&lookup, "EXPORT_BACKGROUND", BackgroundColor::parse_hex)
            .unwrap_or(defaults.background);

        let quality = var(&lookup, "EXPORT_JPEG_QUALITY", |v| v.trim().parse::<u8>().ok())
            .map(|q| q.clamp(1, 100))
            .unwrap_or(100);
        let encoding = var(&lookup, "EXPORT_IMAGE_ENCODING", |v| {
            match v.trim().to_ascii_lowercase().as_str() {
                "jpeg" | "jpg" => Some(ImageEncoding::Jpeg { quality }),
                "flate" | "lossless" => Some(ImageEncoding::Flate { level: 6 }),
                _ => None,
            }
        })
        .unwrap_or(ImageEncoding::Jpeg { quality });

        let overlap_px = var(&lookup, "EXPORT_OVERLAP_PX", |v| v.trim().parse::<u32>().ok())
            .unwrap_or(defaults.overlap_px);

        let output_dir = lookup("EXPORT_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let document_name = lookup("EXPORT_DOCUMENT_NAME").filter(|n| !n.trim().is_empty());

        Self {
            format,
            options: ExportOptions {
                scale,
                background,
                encoding,
                overlap_px,
            },
            output_dir,
            document_name,
        }
    }
}

/// Reads and parses one variable, warning when it is set but invalid.
fn var<F, T, P>(lookup: &F, key: &str, parse: P) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    P: FnOnce(&str) -> Option<T>,
{
    let raw = lookup(key)?;
    let value = parse(&raw);
    if value.is_none() {
        warn!("Ignoring invalid {}={:?}", key, raw);
    }
    value
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
