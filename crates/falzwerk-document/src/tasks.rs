// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async wrappers: run the CPU-bound operations on tokio's blocking pool so
// an async caller's executor is never stalled. Inputs are moved in; results
// are the same as the synchronous entry points.

use falzwerk_core::{
    EncodingConfig, FalzwerkError, OperationContext, Outcome, PageSelection, RasterConfig,
    RenderConfig, Result,
};
use tokio::task;

use crate::encode::EncodeOutcome;
use crate::ops::{self, EncodedDocument};
use crate::raster::{PageRenderer, RasterImage};
use crate::split::SizeEstimator;

async fn blocking<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    task::spawn_blocking(job)
        .await
        .map_err(|err| FalzwerkError::Task(format!("blocking task join error: {err}")))?
}

fn slices(inputs: &[Vec<u8>]) -> Vec<&[u8]> {
    inputs.iter().map(Vec::as_slice).collect()
}

pub async fn merge(
    inputs: Vec<Vec<u8>>,
    render: RenderConfig,
    encoding: Option<EncodingConfig>,
    mut ctx: OperationContext,
) -> Result<EncodedDocument> {
    blocking(move || ops::merge(&slices(&inputs), &render, encoding.as_ref(), &mut ctx)).await
}

pub async fn split(
    input: Vec<u8>,
    selection: PageSelection,
    estimator: SizeEstimator,
    mut ctx: OperationContext,
) -> Result<Vec<Vec<u8>>> {
    blocking(move || ops::split(&input, &selection, estimator, &mut ctx)).await
}

pub async fn compress(
    input: Vec<u8>,
    encoding: EncodingConfig,
    mut ctx: OperationContext,
) -> Result<EncodedDocument> {
    blocking(move || ops::compress(&input, &encoding, &mut ctx)).await
}

pub async fn images_to_document(
    images: Vec<Vec<u8>>,
    render: RenderConfig,
    encoding: Option<EncodingConfig>,
    mut ctx: OperationContext,
) -> Result<Outcome<EncodedDocument>> {
    blocking(move || {
        ops::images_to_document(&slices(&images), &render, encoding.as_ref(), &mut ctx)
    })
    .await
}

/// `make_renderer` runs on the blocking thread, so the renderer itself
/// never has to cross threads.
pub async fn document_to_images<R, F>(
    input: Vec<u8>,
    raster: RasterConfig,
    make_renderer: F,
    mut ctx: OperationContext,
) -> Result<Vec<RasterImage>>
where
    R: PageRenderer,
    F: FnOnce() -> Result<R> + Send + 'static,
{
    blocking(move || {
        let renderer = make_renderer()?;
        ops::document_to_images(&input, &raster, &renderer, &mut ctx)
    })
    .await
}

pub async fn compress_image(
    input: Vec<u8>,
    encoding: EncodingConfig,
    mut ctx: OperationContext,
) -> Result<EncodeOutcome> {
    blocking(move || ops::compress_image(&input, &encoding, &mut ctx)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PageSource;
    use crate::raster::tests::StubRenderer;
    use crate::testutil;

    #[tokio::test]
    async fn merge_runs_off_the_executor() {
        let a = testutil::pdf_with_pages(&[(100.0, 100.0)]);
        let b = testutil::pdf_with_pages(&[(200.0, 200.0), (300.0, 300.0)]);
        let merged = merge(vec![a, b], RenderConfig::default(), None, OperationContext::new())
            .await
            .unwrap();
        assert_eq!(merged.page_count, 3);
        assert_eq!(PageSource::from_bytes(&merged.bytes).unwrap().page_count(), 3);
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let result = split(
            b"junk".to_vec(),
            PageSelection::explicit([1]),
            SizeEstimator::Uniform,
            OperationContext::new(),
        )
        .await;
        assert!(matches!(result, Err(FalzwerkError::DocumentLoad(_))));
    }

    #[tokio::test]
    async fn renderer_is_built_on_the_worker() {
        let images = document_to_images(
            b"%PDF".to_vec(),
            RasterConfig::default(),
            || Ok(StubRenderer { pages: 2, fail_on: None }),
            OperationContext::new(),
        )
        .await
        .unwrap();
        assert_eq!(images.len(), 2);

        let unavailable = document_to_images(
            b"%PDF".to_vec(),
            RasterConfig::default(),
            || -> Result<StubRenderer> {
                Err(FalzwerkError::RendererUnavailable("no library".to_string()))
            },
            OperationContext::new(),
        )
        .await;
        assert!(matches!(unavailable, Err(FalzwerkError::RendererUnavailable(_))));
    }

    #[tokio::test]
    async fn concurrent_calls_are_independent() {
        let doc = testutil::pdf_with_photo(64, 64);
        let png = testutil::png_bytes(32, 32, false);
        let (doc_result, image_result) = tokio::join!(
            compress(doc.clone(), EncodingConfig::default(), OperationContext::new()),
            compress_image(png.clone(), EncodingConfig::default(), OperationContext::new()),
        );
        assert!(doc_result.unwrap().bytes.len() <= doc.len());
        assert!(image_result.unwrap().bytes.len() <= png.len());
    }
}
