//! Per-page cropping, placement and image encoding.

use crate::error::{ExportError, ExportResult};
use crate::format::PageFormat;
use crate::planner::{PagePlan, PageSlice};
use crate::raster::RasterSurface;
use image::codecs::jpeg::JpegEncoder as JpegCodec;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Compression filter of an encoded page image, as named in the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    /// Baseline JPEG data.
    Dct,
    /// Zlib-compressed 8-bit RGB samples.
    Flate,
}

/// Encoded pixels of one page region.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub filter: ImageFilter,
    pub width_px: u32,
    pub height_px: u32,
}

/// Turns a cropped page region into embeddable image data.
#[cfg_attr(test, mockall::automock)]
pub trait PageEncoder: Send + Sync {
    fn encode(&self, region: &RgbImage) -> ExportResult<EncodedImage>;
}

/// Largest width or height a baseline JPEG frame can describe.
pub const JPEG_MAX_DIMENSION: u32 = u16::MAX as u32;

/// Lossy JPEG encoding. Small output, softens fine text edges.
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PageEncoder for JpegEncoder {
    fn encode(&self, region: &RgbImage) -> ExportResult<EncodedImage> {
        if region.width() > JPEG_MAX_DIMENSION || region.height() > JPEG_MAX_DIMENSION {
            return Err(ExportError::InvalidMeasurement(format!(
                "page image of {}x{} px exceeds the JPEG limit of {} px; use flate encoding or a shorter page",
                region.width(),
                region.height(),
                JPEG_MAX_DIMENSION
            )));
        }

        let mut data = Vec::new();
        JpegCodec::new_with_quality(&mut data, self.quality)
            .encode_image(region)
            .map_err(|e| ExportError::AssemblyFailure(format!("JPEG encoding failed: {}", e)))?;
        Ok(EncodedImage {
            data,
            filter: ImageFilter::Dct,
            width_px: region.width(),
            height_px: region.height(),
        })
    }
}

/// Lossless zlib encoding of the raw RGB samples.
#[derive(Debug, Clone, Copy)]
pub struct FlateEncoder {
    level: u8,
}

impl FlateEncoder {
    pub fn new(level: u8) -> Self {
        Self {
            level: level.min(10),
        }
    }
}

impl Default for FlateEncoder {
    fn default() -> Self {
        Self::new(6)
    }
}

impl PageEncoder for FlateEncoder {
    fn encode(&self, region: &RgbImage) -> ExportResult<EncodedImage> {
        let data = miniz_oxide::deflate::compress_to_vec_zlib(region.as_raw(), self.level);
        Ok(EncodedImage {
            data,
            filter: ImageFilter::Flate,
            width_px: region.width(),
            height_px: region.height(),
        })
    }
}

/// Configured image encoding for rendered pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImageEncoding {
    Jpeg { quality: u8 },
    Flate { level: u8 },
}

impl ImageEncoding {
    pub fn encoder(self) -> Arc<dyn PageEncoder> {
        match self {
            ImageEncoding::Jpeg { quality } => Arc::new(JpegEncoder::new(quality)),
            ImageEncoding::Flate { level } => Arc::new(FlateEncoder::new(level)),
        }
    }
}

impl Default for ImageEncoding {
    fn default() -> Self {
        ImageEncoding::Jpeg { quality: 100 }
    }
}

/// A page image placed on its page.
///
/// Offsets are measured from the top-left corner of the page, in the
/// format's unit system.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub index: usize,
    pub image: EncodedImage,
    pub width_unit: f64,
    pub height_unit: f64,
    pub x_offset_unit: f64,
    pub y_offset_unit: f64,
}

/// Crops planned slices out of the raster and fits them to the page.
#[derive(Clone)]
pub struct PageRenderer {
    margin: f64,
    content_width: f64,
    units_per_px: f64,
    encoder: Arc<dyn PageEncoder>,
}

impl PageRenderer {
    pub fn new(plan: &PagePlan, format: &PageFormat, encoder: Arc<dyn PageEncoder>) -> Self {
        Self {
            margin: format.margin,
            content_width: plan.content_width,
            units_per_px: plan.units_per_px,
            encoder,
        }
    }

    /// Renders one slice.
    ///
    /// The region is placed at the margin origin and scaled uniformly, so
    /// a short final slice leaves blank space below it.
    pub fn render(&self, slice: &PageSlice, raster: &RasterSurface) -> ExportResult<RenderedPage> {
        if slice.source_height_px == 0 || slice.source_end_px() > raster.height_px() {
            return Err(ExportError::AssemblyFailure(format!(
                "slice {} spans rows {}..{} outside a {} px raster",
                slice.index,
                slice.source_offset_px,
                slice.source_end_px(),
                raster.height_px()
            )));
        }

        let region = image::imageops::crop_imm(
            raster.pixels(),
            0,
            slice.source_offset_px,
            raster.width_px(),
            slice.source_height_px,
        )
        .to_image();

        let image = self.encoder.encode(&region)?;

        debug!(
            page = slice.index,
            rows = slice.source_height_px,
            bytes = image.data.len(),
            "Rendered page"
        );

        Ok(RenderedPage {
            index: slice.index,
            image,
            width_unit: self.content_width,
            height_unit: slice.source_height_px as f64 * self.units_per_px,
            x_offset_unit: self.margin,
            y_offset_unit: self.margin,
        })
    }
}
