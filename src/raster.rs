//! Raster surfaces and the rasterization seam.
//!
//! The exporter never lays out content itself. A [`Rasterizer`] turns a
//! visual element into one tall [`RasterSurface`]; [`SvgRasterizer`] is the
//! built-in implementation for SVG documents rendered with resvg.

use crate::error::{ExportError, ExportResult};
use image::RgbImage;
use resvg::tiny_skia;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Opaque background painted behind the rendered content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BackgroundColor {
    pub const WHITE: BackgroundColor = BackgroundColor {
        r: 0xff,
        g: 0xff,
        b: 0xff,
    };

    /// Parses `#rrggbb` or `rrggbb`.
    pub fn parse_hex(value: &str) -> Option<Self> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        Some(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// The fully rendered document as one RGB image.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    width_px: u32,
    height_px: u32,
    scale_factor: f32,
    pixels: RgbImage,
}

impl RasterSurface {
    pub fn new(pixels: RgbImage, scale_factor: f32) -> ExportResult<Self> {
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return Err(ExportError::InvalidMeasurement(format!(
                "raster scale factor must be finite and positive, got {}",
                scale_factor
            )));
        }
        Ok(Self {
            width_px: pixels.width(),
            height_px: pixels.height(),
            scale_factor,
            pixels,
        })
    }

    /// A surface of the given size filled with one color.
    pub fn solid(
        width_px: u32,
        height_px: u32,
        scale_factor: f32,
        color: BackgroundColor,
    ) -> ExportResult<Self> {
        let pixels = RgbImage::from_pixel(width_px, height_px, image::Rgb([color.r, color.g, color.b]));
        Self::new(pixels, scale_factor)
    }

    pub fn width_px(&self) -> u32 {
        self.width_px
    }

    pub fn height_px(&self) -> u32 {
        self.height_px
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// External collaborator that renders a visual element to a raster.
///
/// Rasterization is the one long-running step of an export; the exporter
/// awaits it without blocking the runtime.
pub trait Rasterizer: Send + Sync {
    type Element: Send + Sync;

    fn rasterize(
        &self,
        element: &Self::Element,
        scale: f32,
        background: BackgroundColor,
    ) -> impl Future<Output = ExportResult<RasterSurface>> + Send;
}

/// SVG source of the document to export.
#[derive(Debug, Clone)]
pub struct SvgElement {
    svg: Arc<str>,
}

impl SvgElement {
    pub fn new(svg: impl Into<Arc<str>>) -> Self {
        Self { svg: svg.into() }
    }

    pub fn source(&self) -> &str {
        &self.svg
    }
}

/// Rasterizes SVG documents with usvg and resvg.
#[derive(Clone, Default)]
pub struct SvgRasterizer {
    load_system_fonts: bool,
}

impl SvgRasterizer {
    /// Creates a rasterizer without system fonts.
    pub fn new() -> Self {
        Self {
            load_system_fonts: false,
        }
    }

    /// Loads system fonts so SVG `<text>` renders with installed faces.
    pub fn with_system_fonts(mut self) -> Self {
        self.load_system_fonts = true;
        self
    }

    fn render_blocking(
        svg: &str,
        scale: f32,
        background: BackgroundColor,
        load_system_fonts: bool,
    ) -> ExportResult<RasterSurface> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ExportError::InvalidMeasurement(format!(
                "rasterization scale must be finite and positive, got {}",
                scale
            )));
        }

        let mut options = usvg::Options::default();
        if load_system_fonts {
            Arc::make_mut(&mut options.fontdb).load_system_fonts();
        }

        let tree = usvg::Tree::from_str(svg, &options)
            .map_err(|e| ExportError::RasterizationFailure(format!("Failed to parse SVG content: {}", e)))?;

        let size = tree.size();
        let width_px = (size.width() * scale).ceil().max(0.0) as u32;
        let height_px = (size.height() * scale).ceil().max(0.0) as u32;

        info!(
            "SVG parsed successfully: {}x{} units, raster {}x{} px at {}x",
            size.width(),
            size.height(),
            width_px,
            height_px,
            scale
        );

        if width_px == 0 || height_px == 0 {
            // Nothing to draw; the planner reports the empty document.
            return RasterSurface::new(RgbImage::new(width_px, height_px), scale);
        }

        let mut pixmap = tiny_skia::Pixmap::new(width_px, height_px).ok_or_else(|| {
            ExportError::RasterizationFailure(format!(
                "Failed to allocate {}x{} px raster",
                width_px, height_px
            ))
        })?;
        pixmap.fill(tiny_skia::Color::from_rgba8(
            background.r,
            background.g,
            background.b,
            255,
        ));
        resvg::render(
            &tree,
            tiny_skia::Transform::from_scale(scale, scale),
            &mut pixmap.as_mut(),
        );

        // The background is opaque, so premultiplied RGBA equals straight RGB.
        let rgb: Vec<u8> = pixmap
            .data()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        let pixels = RgbImage::from_raw(width_px, height_px, rgb).ok_or_else(|| {
            ExportError::RasterizationFailure("Raster buffer size mismatch".to_string())
        })?;

        debug!(width_px, height_px, "SVG rasterized");
        RasterSurface::new(pixels, scale)
    }
}

impl Rasterizer for SvgRasterizer {
    type Element = SvgElement;

    fn rasterize(
        &self,
        element: &SvgElement,
        scale: f32,
        background: BackgroundColor,
    ) -> impl Future<Output = ExportResult<RasterSurface>> + Send {
        let svg = element.svg.clone();
        let load_system_fonts = self.load_system_fonts;
        async move {
            tokio::task::spawn_blocking(move || {
                Self::render_blocking(&svg, scale, background, load_system_fonts)
            })
            .await
            .map_err(|e| ExportError::RasterizationFailure(format!("Rasterization task failed: {}", e)))?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_background() {
        assert_eq!(BackgroundColor::parse_hex("#ffffff"), Some(BackgroundColor::WHITE));
        assert_eq!(
            BackgroundColor::parse_hex("1a2B3c"),
            Some(BackgroundColor {
                r: 0x1a,
                g: 0x2b,
                b: 0x3c
            })
        );
        assert_eq!(BackgroundColor::parse_hex("#fff"), None);
        assert_eq!(BackgroundColor::parse_hex("#gggggg"), None);
        assert_eq!(BackgroundColor::WHITE.to_string(), "#ffffff");
    }

    #[test]
    fn test_surface_rejects_bad_scale() {
        assert!(RasterSurface::solid(10, 10, 0.0, BackgroundColor::WHITE).is_err());
        assert!(RasterSurface::solid(10, 10, f32::NAN, BackgroundColor::WHITE).is_err());
    }

    #[tokio::test]
    async fn test_rasterize_simple_svg_at_scale() {
        let element = SvgElement::new(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="150">
                <rect x="0" y="0" width="50" height="50" fill="blue"/>
            </svg>"#,
        );

        let surface = SvgRasterizer::new()
            .rasterize(&element, 2.0, BackgroundColor::WHITE)
            .await
            .unwrap();

        assert_eq!(surface.width_px(), 200);
        assert_eq!(surface.height_px(), 300);
        assert_eq!(surface.scale_factor(), 2.0);
        // Inside the rectangle.
        assert_eq!(surface.pixels().get_pixel(10, 10).0, [0, 0, 255]);
        // Background elsewhere.
        assert_eq!(surface.pixels().get_pixel(150, 250).0, [255, 255, 255]);
    }

    #[tokio::test]
    async fn test_invalid_svg() {
        let element = SvgElement::new("not an svg");
        let result = SvgRasterizer::new()
            .rasterize(&element, 1.0, BackgroundColor::WHITE)
            .await;
        assert!(matches!(result, Err(ExportError::RasterizationFailure(_))));
    }
}
