// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch compression: independent inputs compressed in parallel on the rayon
// pool. Results keep input order; one failing input does not affect others.

use std::sync::{Mutex, PoisonError};

use falzwerk_core::{
    CancelToken, EncodingConfig, OperationContext, ProgressFn, ProgressTracker, Result,
};
use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::encode::EncodeOutcome;
use crate::ops::{self, EncodedDocument};

/// Compress every document in `inputs`. Progress counts finished inputs.
#[instrument(skip_all, fields(inputs = inputs.len()))]
pub fn compress_documents(
    inputs: &[&[u8]],
    encoding: &EncodingConfig,
    cancel: &CancelToken,
    on_progress: Option<ProgressFn>,
) -> Vec<Result<EncodedDocument>> {
    run_batch(inputs, cancel, on_progress, |data, ctx| {
        ops::compress(data, encoding, ctx)
    })
}

/// Compress every raster image in `inputs` to JPEG.
#[instrument(skip_all, fields(inputs = inputs.len()))]
pub fn compress_images(
    inputs: &[&[u8]],
    encoding: &EncodingConfig,
    cancel: &CancelToken,
    on_progress: Option<ProgressFn>,
) -> Vec<Result<EncodeOutcome>> {
    run_batch(inputs, cancel, on_progress, |data, ctx| {
        ops::compress_image(data, encoding, ctx)
    })
}

fn run_batch<T, F>(
    inputs: &[&[u8]],
    cancel: &CancelToken,
    on_progress: Option<ProgressFn>,
    job: F,
) -> Vec<Result<T>>
where
    T: Send,
    F: Fn(&[u8], &mut OperationContext) -> Result<T> + Sync,
{
    let mut tracker = ProgressTracker::new(on_progress, cancel.clone());
    tracker.add_units(inputs.len());
    let tracker = Mutex::new(tracker);

    let results: Vec<Result<T>> = inputs
        .par_iter()
        .enumerate()
        .map(|(index, data)| {
            let mut ctx = OperationContext::with(None, cancel.clone());
            let result = job(data, &mut ctx);
            if let Err(err) = &result {
                warn!(index, operation = %ctx.id, error = %err, "Batch item failed");
            }
            // Cancellation surfaces through the items themselves.
            tracker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .advance();
            result
        })
        .collect();

    let mut tracker = tracker.into_inner().unwrap_or_else(PoisonError::into_inner);
    tracker.finish();

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(total = results.len(), failed, "Batch complete");
    results
}
