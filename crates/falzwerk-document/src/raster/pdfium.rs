// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pdfium-backed page renderer. The pdfium shared library is bound at runtime.

use std::path::Path;

use falzwerk_core::{FalzwerkError, Result};
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, instrument};

use super::PageRenderer;

/// Renders pages with a runtime-bound pdfium library.
pub struct PdfiumRenderer {
    pdfium: Pdfium,
}

impl PdfiumRenderer {
    /// Bind pdfium from `library_dir` when given, else from the working
    /// directory, else from the system library path.
    pub fn bind(library_dir: Option<&Path>) -> Result<Self> {
        let bindings = library_dir
            .map(|dir| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)))
            .unwrap_or_else(|| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            })
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|err| FalzwerkError::RendererUnavailable(err.to_string()))?;

        debug!("pdfium bound");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    fn load<'a>(&'a self, document: &'a [u8]) -> Result<PdfDocument<'a>> {
        self.pdfium
            .load_pdf_from_byte_slice(document, None)
            .map_err(|err| FalzwerkError::DocumentLoad(err.to_string()))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self, document: &[u8]) -> Result<usize> {
        Ok(self.load(document)?.pages().len() as usize)
    }

    #[instrument(skip(self, document), fields(bytes_len = document.len()))]
    fn render_page(&self, document: &[u8], page_index: usize, scale: f32) -> Result<DynamicImage> {
        let render_error = |reason: String| FalzwerkError::PageRender { page_index, reason };

        let document = self.load(document)?;
        let index = u16::try_from(page_index)
            .map_err(|_| render_error("page index beyond pdfium's range".to_string()))?;
        let page = document
            .pages()
            .get(index)
            .map_err(|err| render_error(err.to_string()))?;

        let config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .render_form_data(true)
            .render_annotations(true);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|err| render_error(err.to_string()))?;

        Ok(bitmap.as_image())
    }
}
