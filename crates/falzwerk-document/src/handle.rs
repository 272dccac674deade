// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Input handles: bytes plus the metadata needed to describe an input without
// decoding it again.

use falzwerk_core::integrity::fingerprint;
use falzwerk_core::{PageGeometry, Result};
use serde::Serialize;
use tracing::instrument;

use crate::image::{ImageEmbedder, ImageKind};
use crate::pdf::PageSource;

/// A validated PDF input.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentHandle {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`, hex encoded.
    pub fingerprint: String,
    pub size: usize,
    /// Displayed page sizes in points, in page order.
    pub pages: Vec<PageGeometry>,
}

impl DocumentHandle {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// A validated JPEG or PNG input.
#[derive(Debug, Clone, Serialize)]
pub struct ImageHandle {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub fingerprint: String,
    pub size: usize,
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
}

/// Load `bytes` as a PDF and record its page geometry.
#[instrument(skip_all, fields(bytes_len = bytes.len()))]
pub fn inspect_document(bytes: Vec<u8>) -> Result<DocumentHandle> {
    let pages = PageSource::from_bytes(&bytes)?.page_sizes();
    Ok(DocumentHandle {
        fingerprint: fingerprint(&bytes),
        size: bytes.len(),
        pages,
        bytes,
    })
}

/// Decode `bytes` as an embeddable image and record its format and size.
#[instrument(skip_all, fields(bytes_len = bytes.len()))]
pub fn inspect_image(bytes: Vec<u8>) -> Result<ImageHandle> {
    let (kind, width, height) = {
        let image = ImageEmbedder::decode(&bytes)?;
        (image.kind(), image.width(), image.height())
    };
    Ok(ImageHandle {
        fingerprint: fingerprint(&bytes),
        size: bytes.len(),
        kind,
        width,
        height,
        bytes,
    })
}
