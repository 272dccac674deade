// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Size-driven encoding: walk a descending quality ladder, keep the smallest
// result, and never return something larger than the reference bytes.

pub mod recompress;

pub use recompress::{ImagePass, ImageRecompressor};

use falzwerk_core::{CompressionAttempt, EncodingConfig, FalzwerkError, ProgressTracker, Result};
use lopdf::Document;
use tracing::{debug, info, instrument, warn};

/// One quality pass: serialise `subject` at `quality` (0.0-1.0).
pub trait EncodePass {
    type Subject: ?Sized;

    fn encode(&self, subject: &Self::Subject, quality: f32) -> Result<Vec<u8>>;
}

/// Result of a ladder run.
#[derive(Debug, Clone)]
pub struct EncodeOutcome {
    pub bytes: Vec<u8>,
    /// Every rung tried, in order.
    pub attempts: Vec<CompressionAttempt>,
    /// Quality of the returned bytes, or `None` when the reference was kept.
    pub quality: Option<f32>,
}

impl EncodeOutcome {
    /// No attempt beat the reference; `bytes` are the reference unchanged.
    pub fn fell_back(&self) -> bool {
        self.quality.is_none()
    }
}

#[derive(Clone, Copy)]
enum Stage {
    Attempting(usize),
    Accepted,
    Exhausted,
}

/// Quality-ladder driver shared by every size-reducing operation.
pub struct SizeDrivenEncoder<P> {
    config: EncodingConfig,
    pass: P,
}

impl SizeDrivenEncoder<ImageRecompressor> {
    /// Encoder for PDF documents.
    pub fn for_documents(config: EncodingConfig) -> Result<Self> {
        let pass = ImageRecompressor::new(config.compress_streams);
        Self::with_pass(config, pass)
    }
}

impl SizeDrivenEncoder<ImagePass> {
    /// Encoder for single raster images (JPEG output).
    pub fn for_images(config: EncodingConfig) -> Result<Self> {
        Self::with_pass(config, ImagePass)
    }
}

impl<P: EncodePass> SizeDrivenEncoder<P> {
    /// Validates the ladder and ratio up front.
    pub fn with_pass(config: EncodingConfig, pass: P) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, pass })
    }

    /// Upper bound on progress units one [`Self::encode`] call reports.
    pub fn ladder_len(&self) -> usize {
        self.config.ladder.len()
    }

    /// Run the ladder against `reference`, the bytes to beat.
    ///
    /// Stops early once an attempt lands below `reference * good_enough_ratio`.
    /// Failed attempts are logged and count as not smaller. The only errors
    /// are cancellation between attempts.
    #[instrument(skip_all, fields(reference_len = reference.len(), rungs = self.config.ladder.len()))]
    pub fn encode(
        &self,
        subject: &P::Subject,
        reference: Vec<u8>,
        progress: &mut ProgressTracker,
    ) -> Result<EncodeOutcome> {
        let good_enough = reference.len() as f64 * f64::from(self.config.good_enough_ratio);
        let mut attempts = Vec::with_capacity(self.config.ladder.len());
        let mut best: Option<(f32, Vec<u8>)> = None;
        let mut stage = Stage::Attempting(0);

        while let Stage::Attempting(rung) = stage {
            progress.check()?;
            let quality = self.config.ladder[rung];

            let size = match self.pass.encode(subject, quality) {
                Ok(bytes) => {
                    let size = bytes.len();
                    debug!(quality, size, "Encoding attempt");
                    if best.as_ref().is_none_or(|(_, kept)| size < kept.len()) {
                        best = Some((quality, bytes));
                    }
                    Some(size)
                }
                Err(err) => {
                    warn!(quality, %err, "Encoding attempt failed");
                    None
                }
            };
            attempts.push(CompressionAttempt { quality, size });
            progress.step()?;

            stage = match size {
                Some(size) if (size as f64) < good_enough => Stage::Accepted,
                _ if rung + 1 < self.config.ladder.len() => Stage::Attempting(rung + 1),
                _ => Stage::Exhausted,
            };
        }

        let outcome = match best {
            Some((quality, bytes)) if bytes.len() < reference.len() => EncodeOutcome {
                bytes,
                attempts,
                quality: Some(quality),
            },
            _ => EncodeOutcome {
                bytes: reference,
                attempts,
                quality: None,
            },
        };

        info!(
            output_bytes = outcome.bytes.len(),
            attempts = outcome.attempts.len(),
            early_stop = matches!(stage, Stage::Accepted),
            fell_back = outcome.fell_back(),
            "Encoding finished"
        );
        Ok(outcome)
    }
}

/// Serialise without touching image data: prune unreachable objects and,
/// optionally, Flate-compress unfiltered streams.
pub fn encode_lossless(document: &Document, compress_streams: bool) -> Result<Vec<u8>> {
    let mut working = document.clone();
    serialise(&mut working, compress_streams)
}

pub(crate) fn serialise(document: &mut Document, compress_streams: bool) -> Result<Vec<u8>> {
    let pruned = document.prune_objects();
    if compress_streams {
        document.compress();
    }
    let mut output = Vec::new();
    document
        .save_to(&mut output)
        .map_err(|err| FalzwerkError::Encoding(format!("failed to serialise PDF: {}", err)))?;
    debug!(pruned = pruned.len(), output_bytes = output.len(), "PDF serialised");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PageSource;
    use crate::testutil;
    use falzwerk_core::CancelToken;

    /// Produces `size` zero bytes for a quality, or fails when `None`.
    struct Scripted(Vec<(f32, Option<usize>)>);

    impl EncodePass for Scripted {
        type Subject = ();

        fn encode(&self, _: &(), quality: f32) -> Result<Vec<u8>> {
            let size = self
                .0
                .iter()
                .find(|(q, _)| *q == quality)
                .and_then(|(_, size)| *size);
            size.map(|n| vec![0; n])
                .ok_or_else(|| FalzwerkError::Encoding("scripted failure".to_string()))
        }
    }

    fn run(script: Vec<(f32, Option<usize>)>, reference: usize) -> EncodeOutcome {
        let encoder =
            SizeDrivenEncoder::with_pass(EncodingConfig::default(), Scripted(script)).unwrap();
        encoder
            .encode(&(), vec![1; reference], &mut ProgressTracker::silent())
            .unwrap()
    }

    #[test]
    fn stops_once_good_enough() {
        let outcome = run(vec![(0.9, Some(900)), (0.7, Some(600)), (0.5, Some(100))], 1000);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.quality, Some(0.7));
        assert_eq!(outcome.bytes.len(), 600);
    }

    #[test]
    fn keeps_the_smallest_when_nothing_is_good_enough() {
        let outcome = run(
            vec![(0.9, Some(950)), (0.7, Some(800)), (0.5, Some(850)), (0.3, Some(990))],
            1000,
        );
        assert_eq!(outcome.attempts.len(), 4);
        assert_eq!(outcome.quality, Some(0.7));
        assert_eq!(outcome.bytes.len(), 800);
    }

    #[test]
    fn falls_back_to_reference_instead_of_inflating() {
        let outcome = run(
            vec![(0.9, Some(1200)), (0.7, Some(1100)), (0.5, Some(1000)), (0.3, Some(1001))],
            1000,
        );
        assert!(outcome.fell_back());
        assert_eq!(outcome.bytes, vec![1; 1000]);
    }

    #[test]
    fn failed_attempts_do_not_abort_the_ladder() {
        let outcome = run(vec![(0.9, None), (0.7, Some(500))], 1000);
        assert_eq!(outcome.attempts[0].size, None);
        assert_eq!(outcome.quality, Some(0.7));

        let outcome = run(vec![], 1000);
        assert!(outcome.fell_back());
        assert_eq!(outcome.attempts.len(), 4);
    }

    #[test]
    fn cancellation_stops_between_attempts() {
        let token = CancelToken::new();
        token.cancel();
        let encoder =
            SizeDrivenEncoder::with_pass(EncodingConfig::default(), Scripted(vec![])).unwrap();
        let mut progress = ProgressTracker::new(None, token);
        assert!(matches!(
            encoder.encode(&(), vec![0; 10], &mut progress),
            Err(FalzwerkError::Cancelled)
        ));
    }

    #[test]
    fn invalid_ladder_is_rejected_up_front() {
        let config = EncodingConfig::with_ladder(vec![0.3, 0.6]);
        assert!(matches!(
            SizeDrivenEncoder::for_documents(config),
            Err(FalzwerkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn recompressing_photos_shrinks_documents() {
        let input = testutil::pdf_with_photo(160, 160);
        let source = PageSource::from_bytes(&input).unwrap();
        let encoder = SizeDrivenEncoder::for_documents(EncodingConfig::default()).unwrap();
        let outcome = encoder
            .encode(source.document(), input.clone(), &mut ProgressTracker::silent())
            .unwrap();

        assert!(!outcome.fell_back());
        assert!(outcome.bytes.len() < input.len());
        assert_eq!(PageSource::from_bytes(&outcome.bytes).unwrap().page_count(), 1);
    }

    #[test]
    fn lossless_output_reloads() {
        let doc = testutil::document_with_pages(&[(100.0, 100.0), (200.0, 200.0)]);
        let bytes = encode_lossless(&doc, true).unwrap();
        assert_eq!(PageSource::from_bytes(&bytes).unwrap().page_count(), 2);
    }
}
