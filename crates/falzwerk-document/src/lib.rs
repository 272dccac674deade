// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// falzwerk-document: In-memory PDF and image assembly for Falzwerk.
//
// Merges and splits PDFs, shrinks them through a quality ladder, turns images
// into pages and pages into images. Every operation takes byte buffers and
// returns byte buffers; nothing here touches the filesystem.

pub mod batch;
pub mod encode;
pub mod handle;
pub mod image;
pub mod ops;
pub mod pdf;
pub mod raster;
pub mod split;
pub mod tasks;

#[cfg(test)]
mod testutil;

// Re-export the primary types so callers can use `falzwerk_document::PageSource` etc.
pub use crate::image::{ImageEmbedder, ImageKind, ImageProcessor};
pub use encode::{EncodeOutcome, SizeDrivenEncoder, encode_lossless};
pub use handle::{DocumentHandle, ImageHandle, inspect_document, inspect_image};
pub use ops::{
    EncodedDocument, compress, compress_image, document_to_images, images_to_document, merge,
};
pub use pdf::{AssembledDocument, DocumentAssembler, PageSource};
pub use raster::{PageRenderer, RasterImage, Rasterizer};
pub use split::{RangeSplitter, SizeEstimator};

#[cfg(feature = "pdfium")]
pub use raster::PdfiumRenderer;
