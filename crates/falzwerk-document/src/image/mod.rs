// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module: decoding, re-encoding and PDF embedding of raster images.

pub mod embed;
pub mod processor;

pub use embed::{EmbeddableImage, ImageEmbedder, ImageKind, ImagePlacement, ImageXObject};
pub use processor::ImageProcessor;
