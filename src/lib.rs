//! Paginated PDF export of rendered documents.
//!
//! A document is rasterized once into a tall image, cut into page-sized
//! bands and written as a fixed-page-size PDF.
//!
//! ## Module Overview
//!
//! - `units`: pixel <-> millimeter/point conversion
//! - `format`: page sizes, margins and validation
//! - `planner`: page break planning over the raster
//! - `renderer`: per-page crop, placement and image encoding
//! - `assembler`: PDF document assembly via pdf-writer
//! - `raster`: raster surfaces and the SVG rasterizer (resvg)
//! - `exporter`, `state`, `job`: export orchestration and the per-document state machine
//! - `config`: environment configuration
//! - `telemetry`: OpenTelemetry integration and structured logging
//! - `suggest`: merging generated skill suggestions
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use page_export::{
//!     exporter::Exporter,
//!     format::PageFormat,
//!     raster::{SvgElement, SvgRasterizer},
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let exporter = Exporter::new(SvgRasterizer::new()).with_document_name("Jane Doe");
//!     let element = SvgElement::new(std::fs::read_to_string("resume.svg").unwrap());
//!
//!     let output = exporter
//!         .export_document(&element, &PageFormat::a4())
//!         .await
//!         .unwrap();
//!     output.save_to(std::path::Path::new(".")).unwrap();
//! }
//! ```

pub mod assembler;
pub mod config;
pub mod error;
pub mod exporter;
pub mod format;
pub mod job;
pub mod planner;
pub mod raster;
pub mod renderer;
pub mod state;
pub mod suggest;
pub mod telemetry;
pub mod units;

pub use error::{ExportError, ExportResult};
