//! Error taxonomy for the export pipeline.

use thiserror::Error;

/// Errors surfaced by an export, classified by who has to act on them.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Bad page format or conversion input. A caller configuration bug.
    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),

    /// The rasterized document has no area to paginate.
    #[error("Document is empty: raster is {width_px}x{height_px} px")]
    EmptyDocument { width_px: u32, height_px: u32 },

    /// The rasterization collaborator failed.
    #[error("Rasterization failed: {0}")]
    RasterizationFailure(String),

    /// Internal invariant violation while rendering or assembling pages.
    #[error("Assembly failed: {0}")]
    AssemblyFailure(String),

    /// Another export is already running for this document.
    #[error("An export is already in progress")]
    ExportInProgress,

    /// The caller cancelled the export before it completed.
    #[error("Export was cancelled")]
    Cancelled,

    /// Writing the finished artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Whether re-triggering the same export may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExportError::RasterizationFailure(_)
                | ExportError::ExportInProgress
                | ExportError::Cancelled
                | ExportError::Io(_)
        )
    }

    /// Short machine-readable classification, used as a log/span attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            ExportError::InvalidMeasurement(_) => "invalid_measurement",
            ExportError::EmptyDocument { .. } => "empty_document",
            ExportError::RasterizationFailure(_) => "rasterization_failure",
            ExportError::AssemblyFailure(_) => "assembly_failure",
            ExportError::ExportInProgress => "export_in_progress",
            ExportError::Cancelled => "cancelled",
            ExportError::Io(_) => "io",
        }
    }
}

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;
