//! Conversion between raster pixels and physical page units.
//!
//! A raster produced at scale `k` has `k` raster pixels per source (CSS)
//! pixel, so one raster pixel measures `units_per_pixel / k` physical units.

use crate::error::{ExportError, ExportResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Millimeters per inch.
const MM_PER_INCH: f64 = 25.4;

/// PostScript points per inch.
const POINTS_PER_INCH: f64 = 72.0;

/// CSS reference pixels per inch.
const CSS_PIXELS_PER_INCH: f64 = 96.0;

/// Default tolerance for px -> unit -> px round trips, in physical units.
pub const DEFAULT_EPSILON: f64 = 0.5;

/// Physical unit system a page format is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[serde(alias = "mm")]
    Millimeter,
    #[serde(alias = "pt")]
    Point,
}

impl UnitSystem {
    /// Converts a length in this unit system to PDF points.
    pub fn to_points(self, value: f64) -> f64 {
        match self {
            UnitSystem::Millimeter => value * POINTS_PER_INCH / MM_PER_INCH,
            UnitSystem::Point => value,
        }
    }

    /// Converts a length in PDF points to this unit system.
    pub fn from_points(self, points: f64) -> f64 {
        match self {
            UnitSystem::Millimeter => points * MM_PER_INCH / POINTS_PER_INCH,
            UnitSystem::Point => points,
        }
    }

    /// Physical size of one CSS reference pixel (1/96 inch).
    pub fn units_per_css_pixel(self) -> f64 {
        self.from_points(POINTS_PER_INCH / CSS_PIXELS_PER_INCH)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mm" | "millimeter" | "millimeters" => Some(UnitSystem::Millimeter),
            "pt" | "point" | "points" => Some(UnitSystem::Point),
            _ => None,
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitSystem::Millimeter => write!(f, "mm"),
            UnitSystem::Point => write!(f, "pt"),
        }
    }
}

fn check_measurement(name: &str, value: f64) -> ExportResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ExportError::InvalidMeasurement(format!(
            "{} must be finite and non-negative, got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_ratio(name: &str, value: f64) -> ExportResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ExportError::InvalidMeasurement(format!(
            "{} must be finite and positive, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Converts a raster pixel length to physical units.
///
/// `units_per_pixel` is the physical size of one source pixel; the raster
/// was captured at `scale_factor` raster pixels per source pixel.
pub fn px_to_unit(px: f64, scale_factor: f64, units_per_pixel: f64) -> ExportResult<f64> {
    check_measurement("pixel length", px)?;
    check_ratio("scale factor", scale_factor)?;
    check_ratio("units per pixel", units_per_pixel)?;
    Ok(px * units_per_pixel / scale_factor)
}

/// Inverse of [`px_to_unit`].
pub fn unit_to_px(unit: f64, scale_factor: f64, units_per_pixel: f64) -> ExportResult<f64> {
    check_measurement("physical length", unit)?;
    check_ratio("scale factor", scale_factor)?;
    check_ratio("units per pixel", units_per_pixel)?;
    Ok(unit * scale_factor / units_per_pixel)
}

/// A validated conversion between raster pixels and physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    scale_factor: f64,
    units_per_pixel: f64,
    epsilon: f64,
}

impl UnitConverter {
    pub fn new(scale_factor: f64, units_per_pixel: f64) -> ExportResult<Self> {
        check_ratio("scale factor", scale_factor)?;
        check_ratio("units per pixel", units_per_pixel)?;
        Ok(Self {
            scale_factor,
            units_per_pixel,
            epsilon: DEFAULT_EPSILON,
        })
    }

    /// Converter that maps `width_px` raster pixels onto `content_width`
    /// units, for a raster captured at `scale_factor`.
    pub fn fit_to_width(width_px: u32, content_width: f64, scale_factor: f64) -> ExportResult<Self> {
        if width_px == 0 {
            return Err(ExportError::InvalidMeasurement(
                "cannot fit a zero-width raster".to_string(),
            ));
        }
        check_ratio("content width", content_width)?;
        Self::new(scale_factor, content_width * scale_factor / width_px as f64)
    }

    /// Converter for a raster captured from CSS pixels at `scale_factor`.
    pub fn for_css_pixels(scale_factor: f64, unit: UnitSystem) -> ExportResult<Self> {
        Self::new(scale_factor, unit.units_per_css_pixel())
    }

    /// Sets the round-trip tolerance in physical units.
    pub fn with_epsilon(mut self, epsilon: f64) -> ExportResult<Self> {
        check_measurement("epsilon", epsilon)?;
        self.epsilon = epsilon;
        Ok(self)
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Physical size of a single raster pixel.
    pub fn units_per_raster_pixel(&self) -> f64 {
        self.units_per_pixel / self.scale_factor
    }

    pub fn px_to_unit(&self, px: f64) -> ExportResult<f64> {
        px_to_unit(px, self.scale_factor, self.units_per_pixel)
    }

    pub fn unit_to_px(&self, unit: f64) -> ExportResult<f64> {
        unit_to_px(unit, self.scale_factor, self.units_per_pixel)
    }

    /// Physical drift introduced by converting `px` to units and back.
    pub fn round_trip_error(&self, px: f64) -> ExportResult<f64> {
        let unit = self.px_to_unit(px)?;
        let back = self.unit_to_px(unit)?;
        Ok((back - px).abs() * self.units_per_raster_pixel())
    }

    pub fn is_round_trip_exact(&self, px: f64) -> ExportResult<bool> {
        Ok(self.round_trip_error(px)? <= self.epsilon)
    }
}
