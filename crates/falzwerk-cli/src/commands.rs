// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command runners: read inputs from disk, call the async operation wrappers
// and write outputs. All document work happens in falzwerk-document.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use falzwerk_core::{
    CancelToken, EngineConfig, OperationContext, Orientation, PageSelection, PageSizePolicy,
    PaperSize, ProgressFn, RasterFormat,
};
use falzwerk_document::{SizeEstimator, handle, tasks};
use serde::Serialize;
use tracing::{info, warn};

use crate::{Cli, Command, FormatArg, LayoutArgs, OrientationArg};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Merge {
            inputs,
            output,
            layout,
        } => {
            apply_layout(&mut config, &layout)?;
            let encoding = layout.compress.then(|| config.encoding.clone());
            let merged = tasks::merge(
                read_all(&inputs).await?,
                config.render,
                encoding,
                context("merge"),
            )
            .await?;
            write(&output, &merged.bytes).await?;
            info!(pages = merged.page_count, output = %output.display(), "Merged");
        }

        Command::Split {
            input,
            output,
            pages,
            measured,
        } => {
            let source = handle::inspect_document(read(&input).await?)
                .with_context(|| format!("loading {}", input.display()))?;
            let selection = parse_selection(&pages, source.page_count())?;
            let estimator = if measured {
                SizeEstimator::Measured
            } else {
                SizeEstimator::Uniform
            };
            let parts = tasks::split(source.bytes, selection, estimator, context("split")).await?;
            for (index, part) in parts.iter().enumerate() {
                write(&numbered(&output, index + 1, "pdf"), part).await?;
            }
            info!(outputs = parts.len(), "Split");
        }

        Command::Compress {
            input,
            output,
            ladder,
        } => {
            if let Some(ladder) = ladder {
                config.encoding.ladder = ladder;
            }
            let data = read(&input).await?;
            let original = data.len();
            let (bytes, quality) = if is_pdf(&data) {
                let doc = tasks::compress(data, config.encoding, context("compress")).await?;
                (doc.bytes, doc.quality)
            } else {
                let image =
                    tasks::compress_image(data, config.encoding, context("compress")).await?;
                (image.bytes, image.quality)
            };
            write(&output, &bytes).await?;
            match quality {
                Some(quality) => info!(original, compressed = bytes.len(), quality, "Compressed"),
                None => info!(original, "Already as small as it gets; copied unchanged"),
            }
        }

        Command::ImagesToPdf {
            inputs,
            output,
            layout,
            quality,
        } => {
            apply_layout(&mut config, &layout)?;
            if quality.is_some() {
                config.render.image_quality = quality;
            }
            let encoding = layout.compress.then(|| config.encoding.clone());
            let outcome = tasks::images_to_document(
                read_all(&inputs).await?,
                config.render,
                encoding,
                context("images-to-pdf"),
            )
            .await?;
            for skipped in &outcome.skipped {
                warn!(
                    input = %inputs[skipped.index].display(),
                    reason = %skipped.reason,
                    "Skipped"
                );
            }
            write(&output, &outcome.output.bytes).await?;
            info!(pages = outcome.output.page_count, output = %output.display(), "Converted");
        }

        Command::PdfToImages {
            input,
            output,
            format,
            scale,
            quality,
            pdfium_dir,
        } => {
            if let Some(format) = format {
                config.raster.format = match format {
                    FormatArg::Jpeg => RasterFormat::Jpeg,
                    FormatArg::Png => RasterFormat::Png,
                };
            }
            if let Some(scale) = scale {
                config.raster.scale = scale;
            }
            if let Some(quality) = quality {
                config.raster.quality = quality;
            }
            let images = tasks::document_to_images(
                read(&input).await?,
                config.raster,
                move || falzwerk_document::PdfiumRenderer::bind(pdfium_dir.as_deref()),
                context("pdf-to-images"),
            )
            .await?;
            for image in &images {
                let path = numbered(&output, image.page_index + 1, image.format.extension());
                write(&path, &image.bytes).await?;
            }
            info!(pages = images.len(), "Rendered");
        }

        Command::Inspect { inputs } => {
            let mut reports = Vec::with_capacity(inputs.len());
            for path in &inputs {
                reports.push(inspect(path, read(path).await?)?);
            }
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
    }
    Ok(())
}

// -- Helpers ------------------------------------------------------------------

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Report {
    Document {
        path: PathBuf,
        #[serde(flatten)]
        handle: handle::DocumentHandle,
    },
    Image {
        path: PathBuf,
        #[serde(flatten)]
        handle: handle::ImageHandle,
    },
}

fn inspect(path: &Path, data: Vec<u8>) -> anyhow::Result<Report> {
    let path = path.to_path_buf();
    if is_pdf(&data) {
        let handle = handle::inspect_document(data)
            .with_context(|| format!("inspecting {}", path.display()))?;
        Ok(Report::Document { path, handle })
    } else {
        let handle = handle::inspect_image(data)
            .with_context(|| format!("inspecting {}", path.display()))?;
        Ok(Report::Image { path, handle })
    }
}

fn apply_layout(config: &mut EngineConfig, layout: &LayoutArgs) -> anyhow::Result<()> {
    if let Some(keyword) = &layout.paper {
        let Some(size) = PaperSize::from_keyword(keyword) else {
            bail!("unknown paper size {keyword:?}");
        };
        let orientation = match layout.orientation {
            OrientationArg::Portrait => Orientation::Portrait,
            OrientationArg::Landscape => Orientation::Landscape,
            OrientationArg::Auto => Orientation::Auto,
        };
        config.render.page_size = PageSizePolicy::Fixed { size, orientation };
    }
    if let Some(margin) = layout.margin {
        config.render.margin_pt = margin;
    }
    Ok(())
}

/// `"5MB"` / `"800KB"` / `"1200B"` is a size budget, a lone `"2-7"` one
/// output range, anything else a list of single pages.
pub(crate) fn parse_selection(text: &str, page_count: usize) -> anyhow::Result<PageSelection> {
    let trimmed = text.trim();
    let upper = trimmed.to_ascii_uppercase();
    for (suffix, unit) in [("MB", 1024 * 1024), ("KB", 1024), ("B", 1)] {
        if let Some(number) = upper.strip_suffix(suffix) {
            let amount: u64 = number
                .trim()
                .parse()
                .with_context(|| format!("bad size budget {trimmed:?}"))?;
            let Some(max_bytes) = amount.checked_mul(unit) else {
                bail!("size budget {trimmed:?} too large");
            };
            return Ok(PageSelection::SizeBudget { max_bytes });
        }
    }
    if !trimmed.contains(',')
        && let Some((start, end)) = trimmed.split_once('-')
        && let (Ok(start), Ok(end)) = (start.trim().parse(), end.trim().parse())
    {
        return Ok(PageSelection::Range { start, end });
    }
    Ok(PageSelection::parse(trimmed, page_count)?)
}

/// `out.pdf` + 3 → `out-3.pdf`, next to `base`.
pub(crate) fn numbered(base: &Path, number: usize, extension: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    base.with_file_name(format!("{stem}-{number}.{extension}"))
}

fn is_pdf(data: &[u8]) -> bool {
    data.starts_with(b"%PDF")
}

fn context(operation: &'static str) -> OperationContext {
    let progress: ProgressFn =
        Box::new(move |percent| info!(operation, percent, "Progress"));
    OperationContext::with(Some(progress), CancelToken::new())
}

async fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn read_all(paths: &[PathBuf]) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut inputs = Vec::with_capacity(paths.len());
    for path in paths {
        inputs.push(read(path).await?);
    }
    Ok(inputs)
}

async fn write(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("writing {}", path.display()))
}
