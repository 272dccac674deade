// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rasterization: render document pages to pixels and encode them as JPEG or
// PNG. Rendering itself is delegated to a `PageRenderer` capability.

#[cfg(feature = "pdfium")]
pub mod pdfium;

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRenderer;

use falzwerk_core::{FalzwerkError, ProgressTracker, RasterConfig, RasterFormat, Result};
use image::DynamicImage;
use tracing::{debug, info, instrument};

use crate::image::ImageProcessor;

/// Turns one page of a PDF buffer into pixels.
///
/// Implementations hold no per-document state; every call receives the
/// whole buffer.
pub trait PageRenderer {
    fn page_count(&self, document: &[u8]) -> Result<usize>;

    /// Render page `page_index` (0-based) at `scale` times 72 dpi.
    fn render_page(&self, document: &[u8], page_index: usize, scale: f32) -> Result<DynamicImage>;
}

/// One encoded page image.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub page_index: usize,
    pub format: RasterFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Renders and encodes pages in order.
pub struct Rasterizer<'r, R: PageRenderer + ?Sized> {
    renderer: &'r R,
    config: RasterConfig,
}

impl<'r, R: PageRenderer + ?Sized> Rasterizer<'r, R> {
    pub fn new(renderer: &'r R, config: RasterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { renderer, config })
    }

    /// Render and encode a single page.
    pub fn render_page(&self, document: &[u8], page_index: usize) -> Result<RasterImage> {
        let pixels = self
            .renderer
            .render_page(document, page_index, self.config.scale)?;
        let processor = ImageProcessor::from_dynamic(pixels);
        let bytes = processor
            .encode(self.config.format, self.config.quality)
            .map_err(|err| FalzwerkError::PageRender {
                page_index,
                reason: err.to_string(),
            })?;

        debug!(
            page_index,
            width = processor.width(),
            height = processor.height(),
            bytes = bytes.len(),
            "Page rasterized"
        );
        Ok(RasterImage {
            page_index,
            format: self.config.format,
            width: processor.width(),
            height: processor.height(),
            bytes,
        })
    }

    /// Every page, in page order. The first failing page aborts the call.
    #[instrument(skip_all, fields(bytes_len = document.len(), format = ?self.config.format))]
    pub fn render_all(
        &self,
        document: &[u8],
        progress: &mut ProgressTracker,
    ) -> Result<Vec<RasterImage>> {
        let page_count = self.renderer.page_count(document)?;
        progress.add_units(page_count);

        let mut images = Vec::with_capacity(page_count);
        for page_index in 0..page_count {
            progress.check()?;
            images.push(self.render_page(document, page_index)?);
            progress.step()?;
        }

        info!(pages = images.len(), "Rasterization complete");
        Ok(images)
    }
}
