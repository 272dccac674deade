// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Falzwerk document engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FalzwerkError, Result};

/// Points per millimetre (72 pt per inch, 25.4 mm per inch).
const PT_PER_MM: f32 = 72.0 / 25.4;

/// Unique identifier for one operation invocation, used to correlate logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Standard paper sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Tabloid,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PaperSize {
    /// Portrait dimensions in points (width, height).
    pub fn dimensions_pt(&self) -> (f32, f32) {
        match self {
            Self::A4 => (595.28, 841.89),
            Self::A3 => (841.89, 1190.55),
            Self::A5 => (419.53, 595.28),
            Self::Letter => (612.0, 792.0),
            Self::Legal => (612.0, 1008.0),
            Self::Tabloid => (792.0, 1224.0),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm as f32 * PT_PER_MM, *height_mm as f32 * PT_PER_MM),
        }
    }

    /// Parse a paper size keyword (`a4`, `letter`, ...). Case-insensitive.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "a4" => Some(Self::A4),
            "a3" => Some(Self::A3),
            "a5" => Some(Self::A5),
            "letter" => Some(Self::Letter),
            "legal" => Some(Self::Legal),
            "tabloid" => Some(Self::Tabloid),
            _ => None,
        }
    }
}

/// Canvas orientation for fixed-size output pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Portrait,
    Landscape,
    /// Follow the aspect ratio of whatever is placed on the page.
    Auto,
}

/// How output page sizes are chosen during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSizePolicy {
    /// Copied pages keep their boxes; image pages hug the image plus margin.
    KeepOriginal,
    /// Every page is drawn centered on a canvas of this size.
    Fixed {
        size: PaperSize,
        orientation: Orientation,
    },
}

impl PageSizePolicy {
    /// Canvas for content whose natural geometry is `content`, or `None` when
    /// the policy keeps original sizes.
    pub fn canvas_for(&self, content: PageGeometry) -> Option<PageGeometry> {
        match self {
            Self::KeepOriginal => None,
            Self::Fixed { size, orientation } => {
                let (w, h) = size.dimensions_pt();
                let portrait = PageGeometry::new(w.min(h), w.max(h));
                let landscape = PageGeometry::new(w.max(h), w.min(h));
                Some(match orientation {
                    Orientation::Portrait => portrait,
                    Orientation::Landscape => landscape,
                    Orientation::Auto if content.is_landscape() => landscape,
                    Orientation::Auto => portrait,
                })
            }
        }
    }
}

/// Width and height of a page in points, as displayed (after `/Rotate`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// Geometry with width and height swapped.
    pub fn swapped(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

/// Caller-specified policy describing which pages go into which output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Sorted, de-duplicated 1-based page numbers; one output per page.
    Explicit(Vec<u32>),
    /// Inclusive 1-based range; one output.
    Range { start: u32, end: u32 },
    /// Greedy consecutive groups whose estimated size stays within budget.
    SizeBudget { max_bytes: u64 },
}

impl PageSelection {
    /// Build an explicit selection, sorting and removing duplicates.
    pub fn explicit(pages: impl IntoIterator<Item = u32>) -> Self {
        let mut pages: Vec<u32> = pages.into_iter().collect();
        pages.sort_unstable();
        pages.dedup();
        Self::Explicit(pages)
    }

    /// Parse the textual form `"1-3, 5, 8-9"` into an explicit selection.
    ///
    /// Every page and range bound is checked against `page_count` before a
    /// range is expanded, so an oversized range is an error, never a large
    /// allocation.
    pub fn parse(text: &str, page_count: usize) -> Result<Self> {
        let invalid = || FalzwerkError::InvalidSelection(format!("cannot parse {text:?}"));
        let mut pages = Vec::new();

        for part in text.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some((start, end)) = part.split_once('-') {
                let start: u32 = start.trim().parse().map_err(|_| invalid())?;
                let end: u32 = end.trim().parse().map_err(|_| invalid())?;
                Self::Range { start, end }.validate(page_count)?;
                pages.extend(start..=end);
            } else {
                let page: u32 = part.parse().map_err(|_| invalid())?;
                if page == 0 || page as usize > page_count {
                    return Err(FalzwerkError::InvalidPageIndex {
                        index: (page as usize).saturating_sub(1),
                        page_count,
                    });
                }
                pages.push(page);
            }
        }

        Ok(Self::explicit(pages))
    }

    /// Check every bound against the document's page count. Never clamps.
    pub fn validate(&self, page_count: usize) -> Result<()> {
        match self {
            Self::Explicit(pages) => {
                if pages.is_empty() {
                    return Err(FalzwerkError::InvalidSelection(
                        "no pages selected".to_string(),
                    ));
                }
                match pages.iter().find(|&&p| p == 0 || p as usize > page_count) {
                    Some(&bad) => Err(FalzwerkError::InvalidPageIndex {
                        index: (bad as usize).saturating_sub(1),
                        page_count,
                    }),
                    None => Ok(()),
                }
            }
            Self::Range { start, end } => {
                if *start == 0 || *start > *end || *end as usize > page_count {
                    Err(FalzwerkError::InvalidRange {
                        start: *start,
                        end: *end,
                        page_count,
                    })
                } else {
                    Ok(())
                }
            }
            Self::SizeBudget { max_bytes } => {
                if *max_bytes == 0 {
                    Err(FalzwerkError::InvalidSelection(
                        "size budget must be greater than zero".to_string(),
                    ))
                } else if page_count == 0 {
                    Err(FalzwerkError::InvalidSelection(
                        "document has no pages".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// One rung of the quality ladder and the size it produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionAttempt {
    /// Encoder quality in `0.0..=1.0`.
    pub quality: f32,
    /// Encoded size in bytes, or `None` when the attempt itself failed.
    pub size: Option<usize>,
}

/// Raster output formats for page rendering and image compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterFormat {
    Jpeg,
    Png,
}

impl RasterFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// An input that batch processing skipped instead of failing on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedInput {
    /// Position of the input in the caller's list.
    pub index: usize,
    /// Human-readable reason (the error message).
    pub reason: String,
}

/// A successful result plus the inputs that were skipped along the way.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub output: T,
    pub skipped: Vec<SkippedInput>,
}

impl<T> Outcome<T> {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_validation_rejects_backwards_and_zero() {
        let backwards = PageSelection::Range { start: 5, end: 2 };
        let zero = PageSelection::Range { start: 0, end: 3 };
        let full = PageSelection::Range { start: 1, end: 10 };

        assert!(matches!(
            backwards.validate(10),
            Err(FalzwerkError::InvalidRange { start: 5, end: 2, .. })
        ));
        assert!(matches!(
            zero.validate(10),
            Err(FalzwerkError::InvalidRange { start: 0, end: 3, .. })
        ));
        assert!(full.validate(10).is_ok());
    }

    #[test]
    fn range_past_end_is_rejected_not_clamped() {
        let sel = PageSelection::Range { start: 8, end: 11 };
        assert!(matches!(
            sel.validate(10),
            Err(FalzwerkError::InvalidRange { end: 11, .. })
        ));
    }

    #[test]
    fn explicit_selection_is_sorted_and_unique() {
        assert_eq!(
            PageSelection::explicit([4, 1, 4, 2]),
            PageSelection::Explicit(vec![1, 2, 4])
        );
    }

    #[test]
    fn explicit_out_of_range_reports_index() {
        let sel = PageSelection::explicit([1, 12]);
        match sel.validate(10) {
            Err(FalzwerkError::InvalidPageIndex { index, page_count }) => {
                assert_eq!(index, 11);
                assert_eq!(page_count, 10);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(PageSelection::explicit(Vec::new()).validate(10).is_err());
    }

    #[test]
    fn parse_text_selection() {
        assert_eq!(
            PageSelection::parse("1-3, 5,3", 5).unwrap(),
            PageSelection::Explicit(vec![1, 2, 3, 5])
        );
        assert!(PageSelection::parse("x-2", 5).is_err());
        assert!(matches!(
            PageSelection::parse("4-2", 5),
            Err(FalzwerkError::InvalidRange { start: 4, end: 2, .. })
        ));
        assert!(matches!(
            PageSelection::parse("1, 7", 5),
            Err(FalzwerkError::InvalidPageIndex { index: 6, page_count: 5 })
        ));
    }

    #[test]
    fn huge_text_range_is_rejected_before_expansion() {
        assert!(matches!(
            PageSelection::parse("1-4294967295", 3),
            Err(FalzwerkError::InvalidRange { end: 4294967295, page_count: 3, .. })
        ));
        assert!(matches!(
            PageSelection::parse("2, 1-60000000", 3),
            Err(FalzwerkError::InvalidRange { end: 60000000, .. })
        ));
    }

    #[test]
    fn zero_budget_is_invalid() {
        assert!(PageSelection::SizeBudget { max_bytes: 0 }.validate(3).is_err());
        assert!(PageSelection::SizeBudget { max_bytes: 1 }.validate(3).is_ok());
    }

    #[test]
    fn budget_over_an_empty_document_is_invalid() {
        assert!(matches!(
            PageSelection::SizeBudget { max_bytes: 10 }.validate(0),
            Err(FalzwerkError::InvalidSelection(_))
        ));
    }

    #[test]
    fn auto_orientation_follows_content() {
        let policy = PageSizePolicy::Fixed {
            size: PaperSize::A4,
            orientation: Orientation::Auto,
        };
        let wide = policy.canvas_for(PageGeometry::new(800.0, 600.0)).unwrap();
        let tall = policy.canvas_for(PageGeometry::new(600.0, 800.0)).unwrap();
        assert!(wide.is_landscape());
        assert!(!tall.is_landscape());
        assert!(PageSizePolicy::KeepOriginal
            .canvas_for(PageGeometry::new(1.0, 1.0))
            .is_none());
    }

    #[test]
    fn forced_orientation_swaps_canvas() {
        let policy = PageSizePolicy::Fixed {
            size: PaperSize::Letter,
            orientation: Orientation::Landscape,
        };
        let canvas = policy.canvas_for(PageGeometry::new(100.0, 400.0)).unwrap();
        assert_eq!(canvas, PageGeometry::new(792.0, 612.0));
    }

    #[test]
    fn custom_paper_size_converts_to_points() {
        let (w, h) = PaperSize::Custom {
            width_mm: 254,
            height_mm: 127,
        }
        .dimensions_pt();
        assert!((w - 720.0).abs() < 0.01);
        assert!((h - 360.0).abs() < 0.01);
    }
}
