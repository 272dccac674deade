// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: loading page sources and assembling new documents from their
// pages and from images.

pub mod assemble;
pub mod source;

pub use assemble::{AssembledDocument, DocumentAssembler};
pub use source::{CopiedPage, PageBundle, PageLayout, PageSource};
