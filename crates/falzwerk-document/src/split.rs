// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Range splitter: partition a document by a page selection into independent
// output documents.

use falzwerk_core::{PageSelection, PageSizePolicy, ProgressTracker, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::encode::encode_lossless;
use crate::pdf::{AssembledDocument, DocumentAssembler, PageSource};

/// How per-page sizes are estimated for size-budget splitting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeEstimator {
    /// Input size divided evenly across pages.
    #[default]
    Uniform,
    /// Size of each page serialised on its own. Slower, but shared
    /// resources are counted once per page.
    Measured,
}

/// Splits one source into several documents.
pub struct RangeSplitter<'a> {
    source: &'a PageSource,
    /// Length of the serialised input, used by [`SizeEstimator::Uniform`].
    input_len: usize,
}

impl<'a> RangeSplitter<'a> {
    pub fn new(source: &'a PageSource, input_len: usize) -> Self {
        Self { source, input_len }
    }

    /// Page groups (0-based indices) for `selection`, validated against the
    /// page count.
    pub fn plan(
        &self,
        selection: &PageSelection,
        estimator: SizeEstimator,
    ) -> Result<Vec<Vec<usize>>> {
        let page_count = self.source.page_count();
        selection.validate(page_count)?;

        let groups = match selection {
            PageSelection::Explicit(pages) => pages.iter().map(|&p| vec![p as usize - 1]).collect(),
            PageSelection::Range { start, end } => {
                vec![(*start as usize - 1..*end as usize).collect()]
            }
            PageSelection::SizeBudget { max_bytes } => {
                let sizes = self.estimate(estimator)?;
                group_by_budget(&sizes, *max_bytes)
            }
        };
        debug!(outputs = groups.len(), "Split planned");
        Ok(groups)
    }

    /// Build one document per planned group. One progress unit per page.
    #[instrument(skip_all, fields(pages = self.source.page_count()))]
    pub fn split(
        &self,
        selection: &PageSelection,
        estimator: SizeEstimator,
        progress: &mut ProgressTracker,
    ) -> Result<Vec<AssembledDocument>> {
        let groups = self.plan(selection, estimator)?;
        progress.add_units(groups.iter().map(Vec::len).sum());

        let documents = groups
            .iter()
            .map(|group| {
                let mut assembler = DocumentAssembler::new(PageSizePolicy::KeepOriginal, 0.0);
                assembler.push_pages(self.source.copy_pages(group)?, progress)?;
                assembler.finish()
            })
            .collect::<Result<Vec<_>>>()?;

        info!(outputs = documents.len(), "Split complete");
        Ok(documents)
    }

    fn estimate(&self, estimator: SizeEstimator) -> Result<Vec<u64>> {
        let page_count = self.source.page_count();
        match estimator {
            SizeEstimator::Uniform => {
                let each = self.input_len as u64 / page_count.max(1) as u64;
                Ok(vec![each; page_count])
            }
            SizeEstimator::Measured => (0..page_count)
                .map(|index| {
                    let mut assembler = DocumentAssembler::new(PageSizePolicy::KeepOriginal, 0.0);
                    assembler.push_pages(
                        self.source.copy_pages(&[index])?,
                        &mut ProgressTracker::silent(),
                    )?;
                    let single = assembler.finish()?;
                    Ok(encode_lossless(&single.document, true)?.len() as u64)
                })
                .collect(),
        }
    }
}

/// Greedy consecutive grouping: keep adding pages while the running total
/// stays within `max_bytes`. A page over budget on its own gets its own group.
pub fn group_by_budget(sizes: &[u64], max_bytes: u64) -> Vec<Vec<usize>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut running = 0u64;

    for (index, &size) in sizes.iter().enumerate() {
        if !current.is_empty() && running.saturating_add(size) > max_bytes {
            groups.push(std::mem::take(&mut current));
            running = 0;
        }
        current.push(index);
        running = running.saturating_add(size);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
