//! Page break planning over a tall raster.
//!
//! The raster is fitted to the printable width of the page with a single
//! uniform scale, then cut into horizontal bands that each fill the
//! printable height of one page. The step height is derived once from the
//! page format and the final band always takes the remainder, so the bands
//! cover every raster row exactly once.
//!
//! Breaks are purely geometric. There is no support for keep-together
//! hints, so a band boundary may cut through a line of text or an image.

use crate::error::{ExportError, ExportResult};
use crate::format::PageFormat;
use crate::units::UnitConverter;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A horizontal band of the source raster assigned to one output page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSlice {
    pub index: usize,
    pub source_offset_px: u32,
    pub source_height_px: u32,
    pub is_final: bool,
}

impl PageSlice {
    /// One past the last raster row of this slice.
    pub fn source_end_px(&self) -> u32 {
        self.source_offset_px + self.source_height_px
    }
}

/// Planned slices plus the geometry they were derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePlan {
    pub slices: Vec<PageSlice>,
    /// Physical units per raster pixel after fitting the width.
    pub units_per_px: f64,
    pub content_width: f64,
    pub content_height: f64,
    pub total_content_height: f64,
    /// Raster rows per full page.
    pub step_px: u32,
    pub overlap_px: u32,
}

impl PagePlan {
    pub fn page_count(&self) -> usize {
        self.slices.len()
    }

    /// Physical height a slice occupies on its page.
    pub fn slice_height(&self, slice: &PageSlice) -> f64 {
        slice.source_height_px as f64 * self.units_per_px
    }
}

/// Plans pages for a `width_px` x `height_px` raster without overlap.
pub fn plan_pages(width_px: u32, height_px: u32, format: &PageFormat) -> ExportResult<PagePlan> {
    plan_pages_with_overlap(width_px, height_px, format, 0)
}

/// Plans pages where consecutive slices repeat `overlap_px` raster rows.
///
/// # Arguments
///
/// * `width_px` - Raster width, fitted to the printable width
/// * `height_px` - Raster height to cover
/// * `format` - Page format providing the printable area
/// * `overlap_px` - Rows repeated at the top of each following page
///
/// # Returns
///
/// A plan whose slices cover every raster row, with only the last slice
/// shorter than a full step.
///
/// # Errors
///
/// - `InvalidMeasurement` for an invalid format, or an overlap not smaller
///   than the page step
/// - `EmptyDocument` if either raster dimension is zero
pub fn plan_pages_with_overlap(
    width_px: u32,
    height_px: u32,
    format: &PageFormat,
    overlap_px: u32,
) -> ExportResult<PagePlan> {
    format.validate()?;

    if width_px == 0 || height_px == 0 {
        return Err(ExportError::EmptyDocument { width_px, height_px });
    }

    // Fit the raster width to the printable width
    let content_width = format.content_width();
    let content_height = format.content_height();
    let converter = UnitConverter::fit_to_width(width_px, content_width, 1.0)?;
    let units_per_px = converter.units_per_raster_pixel();
    let total_content_height = converter.px_to_unit(height_px as f64)?;

    // Computed once; every full slice uses the same step.
    let step_px = converter.unit_to_px(content_height)?.round().max(1.0);
    if step_px > u32::MAX as f64 {
        return Err(ExportError::InvalidMeasurement(format!(
            "page step of {} px exceeds the supported raster size",
            step_px
        )));
    }
    let step_px = step_px as u32;

    if overlap_px >= step_px {
        return Err(ExportError::InvalidMeasurement(format!(
            "overlap of {} px must be smaller than the page step of {} px",
            overlap_px, step_px
        )));
    }

    // Short documents fit on one page as they are
    let slices = if total_content_height <= content_height {
        vec![PageSlice {
            index: 0,
            source_offset_px: 0,
            source_height_px: height_px,
            is_final: true,
        }]
    } else {
        walk_slices(height_px, step_px, step_px - overlap_px)
    };

    debug!(
        width_px,
        height_px,
        step_px,
        overlap_px,
        pages = slices.len(),
        "Planned page slices"
    );

    Ok(PagePlan {
        slices,
        units_per_px,
        content_width,
        content_height,
        total_content_height,
        step_px,
        overlap_px,
    })
}

fn walk_slices(height_px: u32, step_px: u32, advance_px: u32) -> Vec<PageSlice> {
    let mut slices = Vec::with_capacity((height_px / advance_px) as usize + 1);
    let mut offset = 0u32;

    while height_px - offset > step_px {
        slices.push(PageSlice {
            index: slices.len(),
            source_offset_px: offset,
            source_height_px: step_px,
            is_final: false,
        });
        offset += advance_px;
    }

    slices.push(PageSlice {
        index: slices.len(),
        source_offset_px: offset,
        source_height_px: height_px - offset,
        is_final: true,
    });

    slices
}
