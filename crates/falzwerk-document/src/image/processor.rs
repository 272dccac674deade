// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: decode raster input and encode JPEG/PNG output for page
// rendering, image compression and embedding.

use falzwerk_core::config::quality_percent;
use falzwerk_core::{FalzwerkError, RasterFormat, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba};
use tracing::{debug, instrument};

/// A single in-memory image on its way to an encoded buffer.
pub struct ImageProcessor {
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Decode any raster format the `image` crate understands.
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(data)
            .map_err(|err| FalzwerkError::ImageDecode(err.to_string()))?;
        debug!(
            width = image.width(),
            height = image.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Whether the image carries colour (as opposed to luma only).
    pub fn has_color(&self) -> bool {
        self.image.color().has_color()
    }

    // -- Output ---------------------------------------------------------------

    /// Encode in `format`. `quality` (0.0-1.0) applies to JPEG only.
    pub fn encode(&self, format: RasterFormat, quality: f32) -> Result<Vec<u8>> {
        match format {
            RasterFormat::Jpeg => self.to_jpeg_bytes(quality_percent(quality)),
            RasterFormat::Png => self.to_png_bytes(),
        }
    }

    /// Encode as PNG, keeping any alpha channel.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        self.image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|err| FalzwerkError::Encoding(format!("PNG encoding failed: {}", err)))?;
        Ok(buffer.into_inner())
    }

    /// Encode as baseline JPEG at `quality` (1-100).
    ///
    /// Transparent pixels are composited onto white first. Luma-only images
    /// stay single-channel.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        let written = if self.has_color() {
            self.flattened_rgb().write_with_encoder(encoder)
        } else {
            let luma = DynamicImage::ImageRgb8(self.flattened_rgb()).to_luma8();
            luma.write_with_encoder(encoder)
        };
        written
            .map_err(|err| FalzwerkError::Encoding(format!("JPEG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    // -- Helpers --------------------------------------------------------------

    /// RGB pixels with alpha composited onto a white background.
    fn flattened_rgb(&self) -> RgbImage {
        if !self.image.color().has_alpha() {
            return self.image.to_rgb8();
        }
        let rgba = self.image.to_rgba8();
        RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
            let blend = |channel: u8| -> u8 {
                let alpha = a as u16;
                ((channel as u16 * alpha + 255 * (255 - alpha)) / 255) as u8
            };
            Rgb([blend(r), blend(g), blend(b)])
        })
    }
}
