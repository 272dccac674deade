// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operations: the in-memory entry points for merge, split, compress,
// images-to-document, document-to-images and single-image compression.
//
// Every call owns its inputs' decoded state for its duration and shares
// nothing with other calls.

use falzwerk_core::integrity::short_fingerprint;
use falzwerk_core::{
    CompressionAttempt, EncodingConfig, FalzwerkError, OperationContext, Outcome, PageSelection,
    RasterConfig, RenderConfig, Result,
};
use tracing::{info, instrument, warn};

use crate::encode::{EncodeOutcome, ImageRecompressor, SizeDrivenEncoder, encode_lossless};
use crate::image::ImageProcessor;
use crate::pdf::{AssembledDocument, DocumentAssembler, PageSource};
use crate::raster::{PageRenderer, RasterImage, Rasterizer};
use crate::split::{RangeSplitter, SizeEstimator};

/// A serialised document and how it got its size.
#[derive(Debug, Clone)]
pub struct EncodedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// Ladder rungs tried; empty when no encoding config was given.
    pub attempts: Vec<CompressionAttempt>,
    /// Quality of the accepted re-encode, `None` when the lossless (or, for
    /// `compress`, the original) bytes were kept.
    pub quality: Option<f32>,
}

/// Concatenate every page of every input, in input order.
///
/// Any input that fails to load fails the whole call. With `encoding`, the
/// lossless merge is the reference the quality ladder has to beat.
#[instrument(skip_all, fields(operation = %ctx.id, inputs = inputs.len()))]
pub fn merge(
    inputs: &[&[u8]],
    render: &RenderConfig,
    encoding: Option<&EncodingConfig>,
    ctx: &mut OperationContext,
) -> Result<EncodedDocument> {
    let mut assembler = DocumentAssembler::from_config(render)?;
    let encoder = document_encoder(encoding)?;
    if inputs.is_empty() {
        return Err(FalzwerkError::NothingToAssemble);
    }

    let sources = inputs
        .iter()
        .enumerate()
        .map(|(index, data)| PageSource::from_bytes(data).map_err(|err| tag_input(index, err)))
        .collect::<Result<Vec<_>>>()?;

    let total_pages: usize = sources.iter().map(PageSource::page_count).sum();
    info!(total_pages, "Merging PDFs");
    ctx.progress
        .add_units(total_pages + encoder.as_ref().map_or(0, |e| e.ladder_len()));

    for source in &sources {
        let every_page: Vec<usize> = (0..source.page_count()).collect();
        assembler.push_pages(source.copy_pages(&every_page)?, &mut ctx.progress)?;
    }
    drop(sources);

    let assembled = assembler.finish()?;
    finish_document(assembled, encoder.as_ref(), encoding, ctx)
}

/// Partition one document by `selection`; every output is serialised
/// losslessly and can be compressed on its own afterwards.
#[instrument(
    skip_all,
    fields(operation = %ctx.id, bytes_len = input.len(), input = %short_fingerprint(input))
)]
pub fn split(
    input: &[u8],
    selection: &PageSelection,
    estimator: SizeEstimator,
    ctx: &mut OperationContext,
) -> Result<Vec<Vec<u8>>> {
    let source = PageSource::from_bytes(input)?;
    let documents =
        RangeSplitter::new(&source, input.len()).split(selection, estimator, &mut ctx.progress)?;

    let outputs = documents
        .iter()
        .map(|doc| encode_lossless(&doc.document, true))
        .collect::<Result<Vec<_>>>()?;
    ctx.progress.finish();
    Ok(outputs)
}

/// Shrink a document through the quality ladder. Never returns more bytes
/// than `input`; when nothing helps, `input` comes back unchanged.
#[instrument(
    skip_all,
    fields(operation = %ctx.id, bytes_len = input.len(), input = %short_fingerprint(input))
)]
pub fn compress(
    input: &[u8],
    encoding: &EncodingConfig,
    ctx: &mut OperationContext,
) -> Result<EncodedDocument> {
    let encoder = SizeDrivenEncoder::for_documents(encoding.clone())?;
    let source = PageSource::from_bytes(input)?;
    ctx.progress.add_units(encoder.ladder_len());

    let outcome = encoder.encode(source.document(), input.to_vec(), &mut ctx.progress)?;
    ctx.progress.finish();
    Ok(EncodedDocument {
        bytes: outcome.bytes,
        page_count: source.page_count(),
        attempts: outcome.attempts,
        quality: outcome.quality,
    })
}

/// One page per image, in input order.
///
/// With several inputs, unsupported or undecodable images are skipped and
/// reported in the outcome; a single bad input fails the call.
#[instrument(skip_all, fields(operation = %ctx.id, inputs = images.len()))]
pub fn images_to_document(
    images: &[&[u8]],
    render: &RenderConfig,
    encoding: Option<&EncodingConfig>,
    ctx: &mut OperationContext,
) -> Result<Outcome<EncodedDocument>> {
    let mut assembler = DocumentAssembler::from_config(render)?;
    let encoder = document_encoder(encoding)?;
    if images.is_empty() {
        return Err(FalzwerkError::NothingToAssemble);
    }

    info!("Converting images to PDF");
    ctx.progress
        .add_units(images.len() + encoder.as_ref().map_or(0, |e| e.ladder_len()));

    if let [single] = images {
        assembler.try_push_image(single, render.image_quality, &mut ctx.progress)?;
    } else {
        for (index, data) in images.iter().enumerate() {
            assembler.push_image(index, data, render.image_quality, &mut ctx.progress)?;
        }
    }

    let assembled = assembler.finish()?;
    let skipped = assembled.skipped.clone();
    if !skipped.is_empty() {
        warn!(skipped = skipped.len(), "Some images were left out");
    }
    let output = finish_document(assembled, encoder.as_ref(), encoding, ctx)?;
    Ok(Outcome { output, skipped })
}

/// Render every page and encode it per `raster`, in page order. The first
/// page that fails aborts the call.
#[instrument(
    skip_all,
    fields(operation = %ctx.id, bytes_len = input.len(), input = %short_fingerprint(input))
)]
pub fn document_to_images<R: PageRenderer + ?Sized>(
    input: &[u8],
    raster: &RasterConfig,
    renderer: &R,
    ctx: &mut OperationContext,
) -> Result<Vec<RasterImage>> {
    let rasterizer = Rasterizer::new(renderer, raster.clone())?;
    let images = rasterizer.render_all(input, &mut ctx.progress)?;
    ctx.progress.finish();
    Ok(images)
}

/// Re-encode a single raster image as JPEG through the quality ladder.
/// Bad input is fatal; the original bytes come back when nothing is smaller.
#[instrument(
    skip_all,
    fields(operation = %ctx.id, bytes_len = input.len(), input = %short_fingerprint(input))
)]
pub fn compress_image(
    input: &[u8],
    encoding: &EncodingConfig,
    ctx: &mut OperationContext,
) -> Result<EncodeOutcome> {
    let encoder = SizeDrivenEncoder::for_images(encoding.clone())?;
    let image = ImageProcessor::from_bytes(input)?;
    ctx.progress.add_units(encoder.ladder_len());

    let outcome = encoder.encode(&image, input.to_vec(), &mut ctx.progress)?;
    ctx.progress.finish();
    Ok(outcome)
}

// -- Helpers ------------------------------------------------------------------

fn document_encoder(
    encoding: Option<&EncodingConfig>,
) -> Result<Option<SizeDrivenEncoder<ImageRecompressor>>> {
    encoding
        .cloned()
        .map(SizeDrivenEncoder::for_documents)
        .transpose()
}

/// Serialise an assembled document, then run the ladder when configured.
fn finish_document(
    assembled: AssembledDocument,
    encoder: Option<&SizeDrivenEncoder<ImageRecompressor>>,
    encoding: Option<&EncodingConfig>,
    ctx: &mut OperationContext,
) -> Result<EncodedDocument> {
    let compress_streams = encoding.is_none_or(|config| config.compress_streams);
    let lossless = encode_lossless(&assembled.document, compress_streams)?;

    let (bytes, attempts, quality) = match encoder {
        Some(encoder) => {
            let outcome = encoder.encode(&assembled.document, lossless, &mut ctx.progress)?;
            (outcome.bytes, outcome.attempts, outcome.quality)
        }
        None => (lossless, Vec::new(), None),
    };

    ctx.progress.finish();
    info!(
        page_count = assembled.page_count,
        output_bytes = bytes.len(),
        "Document ready"
    );
    Ok(EncodedDocument {
        bytes,
        page_count: assembled.page_count,
        attempts,
        quality,
    })
}

/// Name the offending input in load errors.
fn tag_input(index: usize, err: FalzwerkError) -> FalzwerkError {
    match err {
        FalzwerkError::DocumentLoad(reason) => {
            FalzwerkError::DocumentLoad(format!("input #{}: {}", index + 1, reason))
        }
        other => other,
    }
}
