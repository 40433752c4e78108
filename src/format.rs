//! Page format presets and validation.

use crate::error::{ExportError, ExportResult};
use crate::units::UnitSystem;
use serde::{Deserialize, Serialize};

/// Fixed page geometry for one export.
///
/// All lengths are expressed in `unit`. The margin applies to all four
/// sides of the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageFormat {
    pub page_width: f64,
    pub page_height: f64,
    pub margin: f64,
    pub unit: UnitSystem,
}

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "portrait" => Some(Orientation::Portrait),
            "landscape" => Some(Orientation::Landscape),
            _ => None,
        }
    }
}

/// Default margin on every side, in millimeters.
pub const DEFAULT_MARGIN_MM: f64 = 10.0;

impl PageFormat {
    pub fn new(page_width: f64, page_height: f64, margin: f64, unit: UnitSystem) -> Self {
        Self {
            page_width,
            page_height,
            margin,
            unit,
        }
    }

    /// ISO A4 (210 x 297 mm) with a 10 mm margin.
    pub fn a4() -> Self {
        Self::new(210.0, 297.0, DEFAULT_MARGIN_MM, UnitSystem::Millimeter)
    }

    /// US Letter (215.9 x 279.4 mm) with a 10 mm margin.
    pub fn letter() -> Self {
        Self::new(215.9, 279.4, DEFAULT_MARGIN_MM, UnitSystem::Millimeter)
    }

    /// Looks up a named preset ("a4" or "letter").
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "a4" => Some(Self::a4()),
            "letter" => Some(Self::letter()),
            _ => None,
        }
    }

    /// Re-expresses the same physical format in another unit system.
    pub fn in_unit(self, unit: UnitSystem) -> Self {
        if unit == self.unit {
            return self;
        }
        let convert = |v: f64| unit.from_points(self.unit.to_points(v));
        Self {
            page_width: convert(self.page_width),
            page_height: convert(self.page_height),
            margin: convert(self.margin),
            unit,
        }
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_orientation(self, orientation: Orientation) -> Self {
        let (short, long) = if self.page_width <= self.page_height {
            (self.page_width, self.page_height)
        } else {
            (self.page_height, self.page_width)
        };
        let (page_width, page_height) = match orientation {
            Orientation::Portrait => (short, long),
            Orientation::Landscape => (long, short),
        };
        Self {
            page_width,
            page_height,
            ..self
        }
    }

    /// Width of the printable area between the side margins.
    pub fn content_width(&self) -> f64 {
        self.page_width - 2.0 * self.margin
    }

    /// Height of the printable area between the top and bottom margins.
    pub fn content_height(&self) -> f64 {
        self.page_height - 2.0 * self.margin
    }

    /// Checks the format before any planning happens.
    ///
    /// Every length must be finite and strictly positive, and the margin
    /// must leave a printable area in both directions.
    pub fn validate(&self) -> ExportResult<()> {
        for (name, value) in [
            ("page width", self.page_width),
            ("page height", self.page_height),
            ("margin", self.margin),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ExportError::InvalidMeasurement(format!(
                    "{} must be finite and positive, got {}{}",
                    name, value, self.unit
                )));
            }
        }

        if self.margin * 2.0 >= self.page_width || self.margin * 2.0 >= self.page_height {
            return Err(ExportError::InvalidMeasurement(format!(
                "margin {}{} leaves no printable area on a {}x{}{} page",
                self.margin, self.unit, self.page_width, self.page_height, self.unit
            )));
        }

        Ok(())
    }
}

impl Default for PageFormat {
    fn default() -> Self {
        Self::a4()
    }
}
