//! PDF page rendering via Google PDFium.
//!
//! Renders the requested page range of a plan set to per-page PNGs in the
//! job's image directory.
//!
//! `PdfiumRenderer` is stateless (`Send + Sync`). Each operation creates
//! a fresh `Pdfium` instance because the upstream type is `!Send`.
//! The OS caches `dlopen`/`LoadLibrary` calls, so repeat loads are near-free.

use std::io::Cursor;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use super::PipelineError;
use crate::storage::{FileStore, StorageRef};

/// Maximum dimension (width or height) for rendered page images.
/// Prevents OOM on extremely large plan sheets or absurd DPI settings.
const MAX_DIMENSION_PX: u32 = 4096;

/// Default rendering DPI for vision model extraction.
pub const DEFAULT_RENDER_DPI: u32 = 200;

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

/// Renders PDF pages to PNG bytes.
pub trait PageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, PipelineError>;

    /// Render a single page (0-based index) at the given DPI.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, PipelineError>;
}

/// Renders PDF pages using Google PDFium. Handles CIDFont encodings,
/// embedded fonts, form fields, transparency and layers.
///
/// Stateless: the `Pdfium` library handle is loaded per-operation because
/// the upstream `Pdfium` type is `!Send + !Sync`.
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Create a new renderer, verifying the PDFium library is loadable.
    pub fn new() -> Result<Self, PipelineError> {
        // Verify library is loadable at construction time (fail-fast).
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path)
/// 2. Alongside the running executable
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, PipelineError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| PipelineError::Render {
            page: 0,
            reason: format!("Failed to load PDFium from {path}: {e}"),
        })?;
        return Ok(Pdfium::new(bindings));
    }

    // pdfium_platform_library_name_at_path() handles platform-specific names:
    //   Windows → pdfium.dll | Linux → libpdfium.so | macOS → libpdfium.dylib
    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %exe_dir.display(), "Loaded PDFium from executable directory");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| PipelineError::Render {
        page: 0,
        reason: format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ),
    })?;
    Ok(Pdfium::new(bindings))
}

/// Map PDF load errors — detect encrypted PDFs for user-facing messaging.
fn map_load_error(e: PdfiumError) -> PipelineError {
    let msg = format!("{e}").to_lowercase();
    if msg.contains("password") || msg.contains("encrypt") {
        PipelineError::PdfEncrypted
    } else {
        PipelineError::Render {
            page: 0,
            reason: format!("Failed to load PDF: {e}"),
        }
    }
}

/// Compute pixel dimensions for rendering, applying the dimension guard.
///
/// Returns (width_px, height_px), both clamped to [1, MAX_DIMENSION_PX],
/// preserving aspect ratio when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, PipelineError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, PipelineError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let pages = document.pages();
        let index = u16::try_from(page_index).map_err(|_| PipelineError::Render {
            page: page_index,
            reason: format!("Page index {page_index} exceeds u16 maximum"),
        })?;
        let page = pages.get(index).map_err(|_| PipelineError::Render {
            page: page_index,
            reason: format!(
                "Page {page_index} out of range (document has {} pages)",
                pages.len()
            ),
        })?;

        let width_points = page.width().value;
        let height_points = page.height().value;
        let (target_w, target_h) = compute_render_dimensions(width_points, height_points, dpi);

        let uncapped_w = (width_points * dpi as f32 / POINTS_PER_INCH) as u32;
        let uncapped_h = (height_points * dpi as f32 / POINTS_PER_INCH) as u32;
        if target_w != uncapped_w || target_h != uncapped_h {
            warn!(
                page = page_index,
                raw_width = uncapped_w,
                raw_height = uncapped_h,
                capped_width = target_w,
                capped_height = target_h,
                "Page dimensions capped to {MAX_DIMENSION_PX}px",
            );
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| PipelineError::Render {
                page: page_index,
                reason: format!("Rendering failed: {e}"),
            })?;

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| PipelineError::Render {
                page: page_index,
                reason: format!("PNG encoding failed: {e}"),
            })?;

        let png_bytes = cursor.into_inner();
        debug!(
            page = page_index,
            width = target_w,
            height = target_h,
            png_size = png_bytes.len(),
            "Rendered PDF page to PNG"
        );
        Ok(png_bytes)
    }
}

/// Render the selected page range of a job's saved PDF into its image
/// directory as `page_<n>.png` (1-based page numbers), returning the
/// directory ref.
///
/// `page_range` is 1-based and inclusive; `None` means all pages.
pub fn rasterize(
    store: &FileStore,
    renderer: &dyn PageRenderer,
    owner_id: &str,
    job_id: &str,
    pdf_ref: &StorageRef,
    page_range: Option<(usize, usize)>,
    dpi: u32,
) -> Result<StorageRef, PipelineError> {
    let pdf_bytes = store.read_bytes(pdf_ref)?;
    let page_count = renderer.page_count(&pdf_bytes)?;

    let (start, end) = page_range.unwrap_or((1, page_count));
    if start < 1 || end > page_count || start > end {
        return Err(PipelineError::Range {
            start,
            end,
            page_count,
        });
    }

    for page in start..=end {
        let png = renderer.render_page(&pdf_bytes, page - 1, dpi)?;
        store.save_image(owner_id, job_id, &format!("page_{page}.png"), &png)?;
    }
    info!(job_id, start, end, "Rasterized page range");

    Ok(store.images_dir(owner_id, job_id)?)
}

// ── Mock for testing ──────────────────────────────────────

/// Mock page renderer returning a minimal PNG for each valid page.
pub struct MockPageRenderer {
    page_count: usize,
}

impl MockPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self { page_count }
    }
}

impl PageRenderer for MockPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, PipelineError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_index: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, PipelineError> {
        if page_index >= self.page_count {
            return Err(PipelineError::Render {
                page: page_index,
                reason: format!(
                    "Page {page_index} out of range (mock has {} pages)",
                    self.page_count
                ),
            });
        }
        Ok(minimal_png())
    }
}

/// Minimal valid 1x1 white pixel PNG for mock testing.
pub fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // 8-bit RGB
        0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT chunk
        0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, // compressed
        0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, // IDAT CRC
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND chunk
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ]
}
