// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Falzwerk.

use thiserror::Error;

/// Top-level error type for all Falzwerk operations.
///
/// Every failed operation surfaces exactly one of these. Partial successes
/// (skipped images in a batch) are not errors; they travel in
/// [`crate::types::Outcome`].
#[derive(Debug, Error)]
pub enum FalzwerkError {
    // -- Document input --
    #[error("failed to load document: {0}")]
    DocumentLoad(String),

    #[error("page index {index} out of range (document has {page_count} pages)")]
    InvalidPageIndex { index: usize, page_count: usize },

    #[error("invalid page range {start}-{end} (document has {page_count} pages)")]
    InvalidRange {
        start: u32,
        end: u32,
        page_count: usize,
    },

    #[error("invalid page selection: {0}")]
    InvalidSelection(String),

    // -- Image input --
    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    // -- Output --
    #[error("failed to render page {page_index}: {reason}")]
    PageRender { page_index: usize, reason: String },

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("no pages to assemble")]
    NothingToAssemble,

    // -- Setup --
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("page renderer unavailable: {0}")]
    RendererUnavailable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("background task failed: {0}")]
    Task(String),

    // -- Edges (CLI, config files) --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FalzwerkError {
    /// Whether this error describes bad image input, which batch assembly
    /// skips instead of failing on.
    pub fn is_bad_image(&self) -> bool {
        matches!(
            self,
            FalzwerkError::UnsupportedImageFormat(_) | FalzwerkError::ImageDecode(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FalzwerkError>;
