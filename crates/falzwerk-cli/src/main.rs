// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Falzwerk: merge, split, compress and convert PDFs from the command line.
//
// Entry point. Parses arguments, initialises logging, loads the engine config
// and hands off to the command runners.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "falzwerk", version)]
#[command(about = "In-memory PDF and image assembly: merge, split, compress, convert")]
struct Cli {
    /// JSON engine config; missing fields take defaults
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Page layout flags shared by the assembling commands.
#[derive(Debug, Clone, clap::Args)]
struct LayoutArgs {
    /// Fixed paper size (a3, a4, a5, letter, legal, tabloid); default keeps
    /// each page's own size
    #[arg(long)]
    paper: Option<String>,

    /// Orientation of the fixed paper size
    #[arg(long, value_enum, default_value = "auto", requires = "paper")]
    orientation: OrientationArg,

    /// Margin in points around placed content
    #[arg(long)]
    margin: Option<f32>,

    /// Run the quality ladder on the result
    #[arg(long)]
    compress: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Concatenate PDFs in the given order
    Merge {
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[command(flatten)]
        layout: LayoutArgs,
    },

    /// Split a PDF into several; outputs are numbered after --output
    Split {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Page selection: "1,3,5", "2-7" or a size budget such as "5MB"
        #[arg(long)]
        pages: String,

        /// Measure each page instead of dividing the input size evenly
        #[arg(long)]
        measured: bool,
    },

    /// Shrink a PDF or a JPEG/PNG image
    Compress {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Quality ladder, highest first (e.g. "0.8,0.6,0.4")
        #[arg(long, value_delimiter = ',')]
        ladder: Option<Vec<f32>>,
    },

    /// One page per image
    ImagesToPdf {
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[command(flatten)]
        layout: LayoutArgs,

        /// Re-encode opaque images as JPEG at this quality (0.0-1.0)
        #[arg(long)]
        quality: Option<f32>,
    },

    /// Render every page to an image; outputs are numbered after --output
    PdfToImages {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Render scale relative to 72 dpi
        #[arg(long)]
        scale: Option<f32>,

        /// JPEG quality (0.0-1.0)
        #[arg(long)]
        quality: Option<f32>,

        /// Directory holding the pdfium shared library
        #[arg(long, value_name = "DIR")]
        pdfium_dir: Option<PathBuf>,
    },

    /// Print page sizes or image dimensions as JSON
    Inspect {
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrientationArg {
    Portrait,
    Landscape,
    Auto,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Jpeg,
    Png,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    tracing::debug!(command = ?cli.command, "Falzwerk starting");
    commands::run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_takes_many_inputs_and_layout_flags() {
        let cli = Cli::try_parse_from([
            "falzwerk", "merge", "a.pdf", "b.pdf", "-o", "out.pdf", "--paper", "a4",
            "--orientation", "landscape", "--compress",
        ])
        .unwrap();
        match cli.command {
            Command::Merge { inputs, layout, .. } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(layout.paper.as_deref(), Some("a4"));
                assert!(matches!(layout.orientation, OrientationArg::Landscape));
                assert!(layout.compress);
            }
            other => panic!("parsed as {other:?}"),
        }
    }

    #[test]
    fn ladder_is_comma_separated() {
        let cli = Cli::try_parse_from([
            "falzwerk", "compress", "in.pdf", "-o", "out.pdf", "--ladder", "0.8,0.5",
        ])
        .unwrap();
        match cli.command {
            Command::Compress { ladder, .. } => assert_eq!(ladder, Some(vec![0.8, 0.5])),
            other => panic!("parsed as {other:?}"),
        }
    }

    #[test]
    fn orientation_needs_a_paper_size() {
        let result = Cli::try_parse_from([
            "falzwerk", "merge", "a.pdf", "-o", "out.pdf", "--orientation", "portrait",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn output_is_required() {
        assert!(Cli::try_parse_from(["falzwerk", "split", "in.pdf", "--pages", "1"]).is_err());
    }
}
