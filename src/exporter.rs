//! Export orchestration: rasterize, plan, render, assemble.

use crate::assembler::DocumentAssembler;
use crate::error::{ExportError, ExportResult};
use crate::format::PageFormat;
use crate::job::{ExportJob, ExportPhase};
use crate::planner::{plan_pages_with_overlap, PageSlice};
use crate::raster::{BackgroundColor, RasterSurface, Rasterizer};
use crate::renderer::{ImageEncoding, PageEncoder, PageRenderer, RenderedPage};
use crate::state::{ExportGuard, ExportStateMachine};
use crate::telemetry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// File name used when the document has no name.
pub const DEFAULT_DOCUMENT_NAME: &str = "resume";

/// Tunables that stay fixed across exports of one document.
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    /// Raster pixels per source pixel.
    pub scale: f32,
    pub background: BackgroundColor,
    pub encoding: ImageEncoding,
    /// Raster rows repeated at the top of each following page.
    pub overlap_px: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            scale: 2.0,
            background: BackgroundColor::WHITE,
            encoding: ImageEncoding::default(),
            overlap_px: 0,
        }
    }
}

/// A finished export.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub slices: Vec<PageSlice>,
}

impl ExportOutput {
    /// Writes the artifact into `dir` and returns its path.
    ///
    /// The bytes go to a temporary file in the same directory that is
    /// renamed into place, so a failed write leaves no partial PDF behind.
    pub fn save_to(&self, dir: &Path) -> ExportResult<PathBuf> {
        use std::io::Write;

        let path = dir.join(&self.file_name);
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(&self.bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| ExportError::Io(e.error))?;

        info!("PDF written: {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// Turns a document name into a safe `.pdf` file name.
pub fn output_file_name(document_name: Option<&str>) -> String {
    let stem: String = document_name
        .unwrap_or("")
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = stem.trim_matches('.').trim();

    if stem.is_empty() {
        format!("{}.pdf", DEFAULT_DOCUMENT_NAME)
    } else {
        format!("{}.pdf", stem)
    }
}

/// Exports one document to a paginated PDF.
///
/// Each `Exporter` owns the state machine of one document, so concurrent
/// calls on the same instance are rejected with `ExportInProgress`.
pub struct Exporter<R: Rasterizer> {
    rasterizer: R,
    encoder: Arc<dyn PageEncoder>,
    options: ExportOptions,
    document_name: Option<String>,
    state: ExportStateMachine,
}

impl<R: Rasterizer> Exporter<R> {
    pub fn new(rasterizer: R) -> Self {
        Self::with_options(rasterizer, ExportOptions::default())
    }

    pub fn with_options(rasterizer: R, options: ExportOptions) -> Self {
        Self {
            rasterizer,
            encoder: options.encoding.encoder(),
            options,
            document_name: None,
            state: ExportStateMachine::new(),
        }
    }

    /// Overrides the encoder chosen by `options.encoding`.
    pub fn with_encoder(mut self, encoder: Arc<dyn PageEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_document_name(mut self, name: impl Into<String>) -> Self {
        self.document_name = Some(name.into());
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn phase(&self) -> ExportPhase {
        self.state.phase()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExportPhase> {
        self.state.subscribe()
    }

    pub async fn export_document(
        &self,
        element: &R::Element,
        format: &PageFormat,
    ) -> ExportResult<ExportOutput> {
        self.export_document_with_cancel(element, format, CancellationToken::new())
            .await
    }

    /// Phase the most recent finished export ended in (`Done` or `Failed`).
    pub fn last_outcome(&self) -> Option<ExportPhase> {
        self.state.last_outcome()
    }

    /// Runs the full pipeline, aborting with `Cancelled` once `cancel` fires.
    ///
    /// # Arguments
    ///
    /// * `element` - Document handed to the rasterizer
    /// * `format` - Page size, margin and unit system of the output
    /// * `cancel` - Token checked while rasterizing, between stages and
    ///   while awaiting page renders
    ///
    /// # Returns
    ///
    /// The PDF bytes, file name and planned slices. Nothing is written to
    /// disk; see [`ExportOutput::save_to`].
    ///
    /// # Errors
    ///
    /// - `ExportInProgress` if another export on this exporter is running
    /// - `InvalidMeasurement` for an invalid format or an unencodable page
    /// - `EmptyDocument` for a zero-sized raster
    /// - `RasterizationFailure` from the rasterizer
    /// - `Cancelled` once `cancel` fires; partial pages are discarded
    pub async fn export_document_with_cancel(
        &self,
        element: &R::Element,
        format: &PageFormat,
        cancel: CancellationToken,
    ) -> ExportResult<ExportOutput> {
        let guard = self.state.try_begin()?;

        let file_name = output_file_name(self.document_name.as_deref());
        let mut job = ExportJob::new(file_name.trim_end_matches(".pdf").to_string());
        job.enter(ExportPhase::Rasterizing);
        info!(
            "Starting export: job_id={}, document={}",
            job.job_id, job.document_name
        );

        let result = self
            .run_pipeline(&guard, &mut job, element, format, &cancel)
            .await;

        let output = match result {
            Ok((bytes, slices)) => {
                guard.complete()?;
                job.mark_complete(slices.len());
                info!(
                    "Export completed: job_id={}, pages={}, duration_ms={:?}",
                    job.job_id,
                    slices.len(),
                    job.processing_duration_ms()
                );
                Ok(ExportOutput {
                    file_name,
                    bytes,
                    page_count: slices.len(),
                    slices,
                })
            }
            Err(e) => {
                drop(guard);
                job.mark_failed(e.kind(), e.to_string());
                match &e {
                    ExportError::AssemblyFailure(_) => {
                        error!("Export defect: job_id={}, error={}", job.job_id, e)
                    }
                    _ => warn!("Export failed: job_id={}, error={}", job.job_id, e),
                }
                Err(e)
            }
        };

        telemetry::record_export_telemetry(&job);
        output
    }

    async fn run_pipeline(
        &self,
        guard: &ExportGuard<'_>,
        job: &mut ExportJob,
        element: &R::Element,
        format: &PageFormat,
        cancel: &CancellationToken,
    ) -> ExportResult<(Vec<u8>, Vec<PageSlice>)> {
        format.validate()?;

        let raster = tokio::select! {
            _ = cancel.cancelled() => return Err(ExportError::Cancelled),
            raster = self.rasterizer.rasterize(element, self.options.scale, self.options.background) => raster?,
        };
        let raster = Arc::new(raster);
        info!(
            "Rasterized: {}x{} px at {}x",
            raster.width_px(),
            raster.height_px(),
            raster.scale_factor()
        );

        self.enter(guard, job, ExportPhase::Planning, cancel)?;
        let plan = plan_pages_with_overlap(
            raster.width_px(),
            raster.height_px(),
            format,
            self.options.overlap_px,
        )?;
        info!(
            "Planned {} pages: units_per_px={:.4}, step_px={}",
            plan.page_count(),
            plan.units_per_px,
            plan.step_px
        );

        self.enter(guard, job, ExportPhase::Rendering, cancel)?;
        let renderer = PageRenderer::new(&plan, format, self.encoder.clone());
        let pages = tokio::select! {
            _ = cancel.cancelled() => return Err(ExportError::Cancelled),
            pages = render_all(&renderer, &plan.slices, &raster, cancel) => pages?,
        };
        drop(raster);

        self.enter(guard, job, ExportPhase::Assembling, cancel)?;
        let assembler = DocumentAssembler::new(*format).with_title(job.document_name.clone());
        let bytes = assembler.assemble(&pages)?;

        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        Ok((bytes, plan.slices))
    }

    fn enter(
        &self,
        guard: &ExportGuard<'_>,
        job: &mut ExportJob,
        phase: ExportPhase,
        cancel: &CancellationToken,
    ) -> ExportResult<()> {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        guard.advance(phase)?;
        job.enter(phase);
        Ok(())
    }
}

/// Renders all slices on the blocking pool and collects them in index order.
///
/// Tasks that start after `cancel` fires skip their work and release the
/// raster.
async fn render_all(
    renderer: &PageRenderer,
    slices: &[PageSlice],
    raster: &Arc<RasterSurface>,
    cancel: &CancellationToken,
) -> ExportResult<Vec<RenderedPage>> {
    let handles: Vec<_> = slices
        .iter()
        .copied()
        .map(|slice| {
            let renderer = renderer.clone();
            let raster = Arc::clone(raster);
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                if cancel.is_cancelled() {
                    return Err(ExportError::Cancelled);
                }
                renderer.render(&slice, &raster)
            })
        })
        .collect();

    let mut pages = Vec::with_capacity(handles.len());
    for handle in handles {
        let page = handle
            .await
            .map_err(|e| ExportError::AssemblyFailure(format!("render task failed: {}", e)))??;
        pages.push(page);
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{FlateEncoder, MockPageEncoder};
    use pretty_assertions::assert_eq;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Mutex};

    /// Produces a solid raster of a fixed size without any real rendering.
    struct FixedRasterizer {
        width_px: u32,
        height_px: u32,
        calls: AtomicUsize,
    }

    impl FixedRasterizer {
        fn new(width_px: u32, height_px: u32) -> Self {
            Self {
                width_px,
                height_px,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Rasterizer for FixedRasterizer {
        type Element = ();

        fn rasterize(
            &self,
            _element: &(),
            scale: f32,
            background: BackgroundColor,
        ) -> impl Future<Output = ExportResult<RasterSurface>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (w, h) = (self.width_px, self.height_px);
            async move { RasterSurface::solid(w, h, scale, background) }
        }
    }

    struct FailingRasterizer;

    impl Rasterizer for FailingRasterizer {
        type Element = ();

        fn rasterize(
            &self,
            _element: &(),
            _scale: f32,
            _background: BackgroundColor,
        ) -> impl Future<Output = ExportResult<RasterSurface>> + Send {
            async { Err(ExportError::RasterizationFailure("out of memory".to_string())) }
        }
    }

    /// Never finishes, so the export stays in Rasterizing.
    struct PendingRasterizer;

    impl Rasterizer for PendingRasterizer {
        type Element = ();

        fn rasterize(
            &self,
            _element: &(),
            _scale: f32,
            _background: BackgroundColor,
        ) -> impl Future<Output = ExportResult<RasterSurface>> + Send {
            std::future::pending()
        }
    }

    /// Holds every encode call until the sender side is dropped.
    struct GatedEncoder {
        gate: Mutex<mpsc::Receiver<()>>,
        encoded: AtomicUsize,
    }

    impl PageEncoder for GatedEncoder {
        fn encode(&self, region: &image::RgbImage) -> ExportResult<crate::renderer::EncodedImage> {
            let _ = self.gate.lock().unwrap().recv();
            self.encoded.fetch_add(1, Ordering::SeqCst);
            FlateEncoder::default().encode(region)
        }
    }

    fn flate_exporter<R: Rasterizer>(rasterizer: R) -> Exporter<R> {
        Exporter::new(rasterizer).with_encoder(Arc::new(FlateEncoder::default()))
    }

    #[tokio::test]
    async fn test_three_page_export() {
        let exporter = flate_exporter(FixedRasterizer::new(1000, 3000));
        let output = exporter.export_document(&(), &PageFormat::a4()).await.unwrap();

        assert_eq!(output.page_count, 3);
        assert_eq!(output.file_name, "resume.pdf");
        let heights: Vec<u32> = output.slices.iter().map(|s| s.source_height_px).collect();
        assert_eq!(heights, vec![1458, 1458, 84]);
        assert!(output.bytes.starts_with(b"%PDF-"));
        assert_eq!(exporter.phase(), ExportPhase::Idle);
    }

    #[tokio::test]
    async fn test_repeated_exports_are_deterministic() {
        let exporter = flate_exporter(FixedRasterizer::new(960, 5000));
        let format = PageFormat::letter();

        let first = exporter.export_document(&(), &format).await.unwrap();
        let second = exporter.export_document(&(), &format).await.unwrap();

        assert_eq!(first.page_count, second.page_count);
        assert_eq!(first.slices, second.slices);
        assert_eq!(exporter.rasterizer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_raster_fails_and_returns_to_idle() {
        let exporter = flate_exporter(FixedRasterizer::new(800, 0));
        let result = exporter.export_document(&(), &PageFormat::a4()).await;

        assert!(matches!(result, Err(ExportError::EmptyDocument { .. })));
        assert_eq!(exporter.phase(), ExportPhase::Idle);
    }

    #[tokio::test]
    async fn test_rasterization_failure_is_retryable() {
        let exporter = flate_exporter(FailingRasterizer);
        let err = exporter
            .export_document(&(), &PageFormat::a4())
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::RasterizationFailure(_)));
        assert!(err.is_retryable());
        assert_eq!(exporter.phase(), ExportPhase::Idle);
    }

    #[tokio::test]
    async fn test_invalid_format_fails_before_rasterizing() {
        let exporter = flate_exporter(FixedRasterizer::new(100, 100));
        let format = PageFormat::a4().with_margin(150.0);
        let result = exporter.export_document(&(), &format).await;

        assert!(matches!(result, Err(ExportError::InvalidMeasurement(_))));
        assert_eq!(exporter.rasterizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_encoder_failure_discards_pages() {
        let mut encoder = MockPageEncoder::new();
        encoder
            .expect_encode()
            .returning(|_| Err(ExportError::AssemblyFailure("encoder crashed".to_string())));

        let exporter = Exporter::new(FixedRasterizer::new(1000, 3000)).with_encoder(Arc::new(encoder));
        let result = exporter.export_document(&(), &PageFormat::a4()).await;

        assert!(matches!(result, Err(ExportError::AssemblyFailure(_))));
        assert_eq!(exporter.phase(), ExportPhase::Idle);
    }

    #[tokio::test]
    async fn test_page_too_tall_for_jpeg_is_invalid_measurement() {
        let exporter = Exporter::new(FixedRasterizer::new(4, 70_000));
        let format = PageFormat::new(3.0, 20_000.0, 1.0, crate::units::UnitSystem::Millimeter);

        let err = exporter.export_document(&(), &format).await.unwrap_err();

        assert!(matches!(err, ExportError::InvalidMeasurement(_)));
        assert!(!err.is_retryable());
        assert_eq!(exporter.phase(), ExportPhase::Idle);
    }

    #[tokio::test]
    async fn test_cancel_while_rasterizing() {
        let exporter = flate_exporter(PendingRasterizer);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = exporter
            .export_document_with_cancel(&(), &PageFormat::a4(), cancel)
            .await;

        assert!(matches!(result, Err(ExportError::Cancelled)));
        assert_eq!(exporter.phase(), ExportPhase::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_while_rendering_discards_pages() {
        let (release, gate) = mpsc::channel::<()>();
        let encoder = Arc::new(GatedEncoder {
            gate: Mutex::new(gate),
            encoded: AtomicUsize::new(0),
        });
        let exporter = Arc::new(
            Exporter::new(FixedRasterizer::new(1000, 3000)).with_encoder(encoder.clone()),
        );
        let mut phases = exporter.subscribe();
        let cancel = CancellationToken::new();

        let export = tokio::spawn({
            let exporter = Arc::clone(&exporter);
            let cancel = cancel.clone();
            async move {
                let a4 = PageFormat::a4();
                exporter.export_document_with_cancel(&(), &a4, cancel).await
            }
        });

        phases
            .wait_for(|phase| *phase == ExportPhase::Rendering)
            .await
            .unwrap();
        cancel.cancel();

        let result = export.await.unwrap();
        assert!(matches!(result, Err(ExportError::Cancelled)));
        assert_eq!(exporter.phase(), ExportPhase::Idle);
        assert_eq!(exporter.last_outcome(), Some(ExportPhase::Failed));
        assert_eq!(encoder.encoded.load(Ordering::SeqCst), 0);

        drop(release);
        let next = exporter.export_document(&(), &PageFormat::a4()).await.unwrap();
        assert_eq!(next.page_count, 3);
        assert_eq!(exporter.last_outcome(), Some(ExportPhase::Done));
    }

    #[tokio::test]
    async fn test_cancelled_render_tasks_skip_encoding() {
        let mut encoder = MockPageEncoder::new();
        encoder.expect_encode().times(0);

        let format = PageFormat::a4();
        let raster = Arc::new(RasterSurface::solid(1000, 3000, 2.0, BackgroundColor::WHITE).unwrap());
        let plan = crate::planner::plan_pages(1000, 3000, &format).unwrap();
        let renderer = PageRenderer::new(&plan, &format, Arc::new(encoder));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = render_all(&renderer, &plan.slices, &raster, &cancel).await;
        assert!(matches!(result, Err(ExportError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_export_future_releases_document() {
        let exporter = flate_exporter(PendingRasterizer);
        let a4 = PageFormat::a4();
        {
            let pending = exporter.export_document(&(), &a4);
            let timed_out =
                tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;
            assert!(timed_out.is_err());
        }
        assert_eq!(exporter.phase(), ExportPhase::Idle);
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name(None), "resume.pdf");
        assert_eq!(output_file_name(Some("  ")), "resume.pdf");
        assert_eq!(output_file_name(Some("Jane Doe")), "Jane Doe.pdf");
        assert_eq!(output_file_name(Some("a/b:c")), "a_b_c.pdf");
        assert_eq!(output_file_name(Some("..")), "resume.pdf");
    }

    #[test]
    fn test_save_to_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let output = ExportOutput {
            file_name: "resume.pdf".to_string(),
            bytes: b"%PDF-1.7 test".to_vec(),
            page_count: 1,
            slices: vec![],
        };

        let path = output.save_to(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("resume.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7 test");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_save_to_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = ExportOutput {
            file_name: "resume.pdf".to_string(),
            bytes: vec![1, 2, 3],
            page_count: 1,
            slices: vec![],
        };
        let missing = dir.path().join("nope");
        assert!(matches!(output.save_to(&missing), Err(ExportError::Io(_))));
        assert!(!missing.join("resume.pdf").exists());
    }
}
