//! Assembles rendered pages into a PDF document.

use crate::error::{ExportError, ExportResult};
use crate::format::PageFormat;
use crate::renderer::{ImageFilter, RenderedPage};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, TextStr};
use tracing::{error, info};

const PRODUCER: &str = concat!("page-export ", env!("CARGO_PKG_VERSION"));

/// Resource name of the page image in every page's XObject dictionary.
const IMAGE_NAME: &[u8] = b"Im0";

/// Writes one PDF page per rendered page, all at the format's page size.
pub struct DocumentAssembler {
    format: PageFormat,
    title: Option<String>,
}

impl DocumentAssembler {
    pub fn new(format: PageFormat) -> Self {
        Self {
            format,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Checks that pages arrive as 0, 1, 2, ... with nothing missing.
    fn check_order(pages: &[RenderedPage]) -> ExportResult<()> {
        if pages.is_empty() {
            error!("Assembly defect: no rendered pages");
            return Err(ExportError::AssemblyFailure(
                "no pages to assemble".to_string(),
            ));
        }
        for (expected, page) in pages.iter().enumerate() {
            if page.index != expected {
                error!(
                    expected,
                    found = page.index,
                    "Assembly defect: rendered pages out of order"
                );
                return Err(ExportError::AssemblyFailure(format!(
                    "page {} found at position {}",
                    page.index, expected
                )));
            }
        }
        Ok(())
    }

    /// Produces the PDF bytes.
    ///
    /// # Arguments
    ///
    /// * `pages` - Rendered pages in index order, starting at 0
    ///
    /// # Returns
    ///
    /// A complete PDF with one page per rendered page, each the size of the
    /// configured format.
    ///
    /// # Errors
    ///
    /// - `AssemblyFailure` if `pages` is empty or out of order
    pub fn assemble(&self, pages: &[RenderedPage]) -> ExportResult<Vec<u8>> {
        Self::check_order(pages)?;

        let unit = self.format.unit;
        let page_width_pt = unit.to_points(self.format.page_width) as f32;
        let page_height_pt = unit.to_points(self.format.page_height) as f32;

        let mut next_id = 1;
        let mut alloc = || {
            let id = Ref::new(next_id);
            next_id += 1;
            id
        };

        // Document-level objects first, then three objects per page
        let catalog_id = alloc();
        let page_tree_id = alloc();
        let info_id = alloc();

        let mut pdf = Pdf::new();
        pdf.catalog(catalog_id).pages(page_tree_id);

        let mut page_ids = Vec::with_capacity(pages.len());

        for page in pages {
            let page_id = alloc();
            let content_id = alloc();
            let image_id = alloc();
            page_ids.push(page_id);

            // Page image
            let mut xobject = pdf.image_xobject(image_id, &page.image.data);
            xobject.filter(match page.image.filter {
                ImageFilter::Dct => Filter::DctDecode,
                ImageFilter::Flate => Filter::FlateDecode,
            });
            xobject.width(page.image.width_px as i32);
            xobject.height(page.image.height_px as i32);
            xobject.color_space().device_rgb();
            xobject.bits_per_component(8);
            xobject.finish();

            // PDF space has its origin at the bottom-left corner.
            let width_pt = unit.to_points(page.width_unit) as f32;
            let height_pt = unit.to_points(page.height_unit) as f32;
            let x_pt = unit.to_points(page.x_offset_unit) as f32;
            let y_pt = page_height_pt - unit.to_points(page.y_offset_unit) as f32 - height_pt;

            let mut content = Content::new();
            content.save_state();
            content.transform([width_pt, 0.0, 0.0, height_pt, x_pt, y_pt]);
            content.x_object(Name(IMAGE_NAME));
            content.restore_state();
            let stream = miniz_oxide::deflate::compress_to_vec_zlib(&content.finish(), 6);
            pdf.stream(content_id, &stream).filter(Filter::FlateDecode);

            let mut pdf_page = pdf.page(page_id);
            pdf_page
                .media_box(Rect::new(0.0, 0.0, page_width_pt, page_height_pt))
                .parent(page_tree_id)
                .contents(content_id);
            pdf_page
                .resources()
                .x_objects()
                .pair(Name(IMAGE_NAME), image_id);
            pdf_page.finish();
        }

        // Page tree and document info
        pdf.pages(page_tree_id)
            .kids(page_ids.iter().copied())
            .count(page_ids.len() as i32);

        let mut info = pdf.document_info(info_id);
        if let Some(title) = &self.title {
            info.title(TextStr(title));
        }
        info.producer(TextStr(PRODUCER));
        info.finish();

        let bytes = pdf.finish();
        info!(
            "PDF assembled: {} pages, {} bytes",
            page_ids.len(),
            bytes.len()
        );
        Ok(bytes)
    }
}
