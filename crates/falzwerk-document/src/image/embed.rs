// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image embedding: validate JPEG/PNG input, compute a centered placement on a
// page, and build the PDF image XObjects that draw it.

use std::io::Write;

use falzwerk_core::config::quality_percent;
use falzwerk_core::{FalzwerkError, PageGeometry, Result};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::{DynamicImage, ImageFormat};
use lopdf::{Dictionary, Stream, dictionary};
use serde::Serialize;
use tracing::{debug, instrument};

use super::processor::ImageProcessor;

/// JPEG quality used when a JPEG cannot be embedded as-is (CMYK and friends).
const FALLBACK_JPEG_QUALITY: f32 = 0.92;

/// Raster formats that can become a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageKind {
    Jpeg,
    Png,
}

/// Entry point for turning raster bytes into page content.
pub struct ImageEmbedder;

impl ImageEmbedder {
    /// Sniff and fully decode `data`.
    ///
    /// Recognised formats other than JPEG and PNG fail with
    /// `UnsupportedImageFormat`; anything unrecognised or corrupt fails with
    /// `ImageDecode`.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn decode(data: &[u8]) -> Result<EmbeddableImage<'_>> {
        let format = image::guess_format(data)
            .map_err(|_| FalzwerkError::ImageDecode("unrecognised image data".to_string()))?;

        let kind = match format {
            ImageFormat::Jpeg => ImageKind::Jpeg,
            ImageFormat::Png => ImageKind::Png,
            other => return Err(FalzwerkError::UnsupportedImageFormat(format!("{other:?}"))),
        };

        let pixels = image::load_from_memory_with_format(data, format)
            .map_err(|err| FalzwerkError::ImageDecode(err.to_string()))?;
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(FalzwerkError::ImageDecode("image has no pixels".to_string()));
        }

        debug!(
            ?kind,
            width = pixels.width(),
            height = pixels.height(),
            "Image decoded for embedding"
        );
        Ok(EmbeddableImage {
            kind,
            raw: data,
            pixels,
        })
    }

    /// Fit a `pixel_width` x `pixel_height` image inside `page` less `margin`
    /// on every side, preserving aspect ratio, centered.
    pub fn place(
        pixel_width: u32,
        pixel_height: u32,
        page: PageGeometry,
        margin: f32,
    ) -> ImagePlacement {
        let available_width = (page.width - 2.0 * margin).max(1.0);
        let available_height = (page.height - 2.0 * margin).max(1.0);
        let (image_width, image_height) = (pixel_width.max(1) as f32, pixel_height.max(1) as f32);

        let scale = (available_width / image_width).min(available_height / image_height);
        let scaled_width = image_width * scale;
        let scaled_height = image_height * scale;

        ImagePlacement {
            pixel_width,
            pixel_height,
            x: (page.width - scaled_width) / 2.0,
            y: (page.height - scaled_height) / 2.0,
            scaled_width,
            scaled_height,
            scale,
        }
    }
}

/// Where an image lands on its page, in points from the lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub x: f32,
    pub y: f32,
    pub scaled_width: f32,
    pub scaled_height: f32,
    /// Points per pixel.
    pub scale: f32,
}

impl ImagePlacement {
    /// `cm` operands mapping the unit-square image space onto the placement.
    pub fn matrix(&self) -> [f32; 6] {
        [
            self.scaled_width,
            0.0,
            0.0,
            self.scaled_height,
            self.x,
            self.y,
        ]
    }
}

/// A decoded JPEG or PNG, still tied to its source bytes.
pub struct EmbeddableImage<'a> {
    kind: ImageKind,
    raw: &'a [u8],
    pixels: DynamicImage,
}

/// Image stream plus optional soft mask. The caller links the mask through
/// `/SMask` once it has an object id.
pub struct ImageXObject {
    pub image: Stream,
    pub soft_mask: Option<Stream>,
}

impl EmbeddableImage<'_> {
    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn has_alpha(&self) -> bool {
        self.pixels.color().has_alpha()
    }

    /// Build the XObject streams for this image.
    ///
    /// JPEGs with one or three components are embedded byte-for-byte. With a
    /// `quality`, opaque images are re-encoded as JPEG first. Everything else
    /// is stored as Flate samples, alpha going to a separate soft mask.
    pub fn to_xobject(&self, quality: Option<f32>) -> Result<ImageXObject> {
        if let Some(quality) = quality.filter(|_| !self.has_alpha()) {
            return self.reencoded(quality);
        }

        if self.kind == ImageKind::Jpeg {
            return match jpeg_components(self.raw) {
                Some(1) => Ok(self.dct(self.raw.to_vec(), "DeviceGray")),
                Some(3) => Ok(self.dct(self.raw.to_vec(), "DeviceRGB")),
                _ => self.reencoded(FALLBACK_JPEG_QUALITY),
            };
        }

        let (color_space, samples) = if self.pixels.color().has_color() {
            ("DeviceRGB", self.pixels.to_rgb8().into_raw())
        } else {
            ("DeviceGray", self.pixels.to_luma8().into_raw())
        };
        let image = flate_stream(
            image_dictionary(self.width(), self.height(), color_space, "FlateDecode"),
            &samples,
        )?;

        let soft_mask = if self.has_alpha() {
            let alpha: Vec<u8> = self.pixels.to_rgba8().pixels().map(|p| p[3]).collect();
            if alpha.iter().all(|&a| a == u8::MAX) {
                None
            } else {
                Some(flate_stream(
                    image_dictionary(self.width(), self.height(), "DeviceGray", "FlateDecode"),
                    &alpha,
                )?)
            }
        } else {
            None
        };

        Ok(ImageXObject { image, soft_mask })
    }

    fn reencoded(&self, quality: f32) -> Result<ImageXObject> {
        let processor = ImageProcessor::from_dynamic(self.pixels.clone());
        let color_space = if processor.has_color() {
            "DeviceRGB"
        } else {
            "DeviceGray"
        };
        let jpeg = processor.to_jpeg_bytes(quality_percent(quality))?;
        Ok(self.dct(jpeg, color_space))
    }

    fn dct(&self, jpeg: Vec<u8>, color_space: &str) -> ImageXObject {
        let dict = image_dictionary(self.width(), self.height(), color_space, "DCTDecode");
        ImageXObject {
            image: Stream::new(dict, jpeg).with_compression(false),
            soft_mask: None,
        }
    }
}

/// Dictionary for an 8-bit image XObject.
pub(crate) fn image_dictionary(
    width: u32,
    height: u32,
    color_space: &str,
    filter: &str,
) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8i64,
        "Filter" => filter,
    }
}

fn flate_stream(dict: Dictionary, samples: &[u8]) -> Result<Stream> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(samples)
        .map_err(|err| FalzwerkError::Encoding(format!("flate failed: {}", err)))?;
    let compressed = encoder
        .finish()
        .map_err(|err| FalzwerkError::Encoding(format!("flate failed: {}", err)))?;
    Ok(Stream::new(dict, compressed).with_compression(false))
}

/// Component count from the first SOF segment, or `None` if there is none.
fn jpeg_components(data: &[u8]) -> Option<u8> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            // FF Cn Lh Ll P Yh Yl Xh Xl Nf
            return data.get(pos + 9).copied();
        }
        pos += 2 + length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use image::RgbImage;
    use lopdf::Object;

    fn name<'a>(dict: &'a Dictionary, key: &[u8]) -> &'a [u8] {
        dict.get(key).and_then(Object::as_name).unwrap()
    }

    #[test]
    fn placement_is_centered_inside_margins() {
        let page = PageGeometry::new(595.0, 842.0);
        let placed = ImageEmbedder::place(100, 200, page, 20.0);

        assert!((placed.x + placed.scaled_width / 2.0 - 297.5).abs() < 1e-3);
        assert!((placed.y + placed.scaled_height / 2.0 - 421.0).abs() < 1e-3);
        assert!(placed.scaled_width <= 555.0 + 1e-3);
        assert!(placed.scaled_height <= 802.0 + 1e-3);
        // Height is the binding dimension here.
        assert!((placed.scaled_height - 802.0).abs() < 1e-3);
        assert!((placed.scaled_width / placed.scaled_height - 0.5).abs() < 1e-4);
    }

    #[test]
    fn wide_images_are_bound_by_width() {
        let page = PageGeometry::new(600.0, 600.0);
        let placed = ImageEmbedder::place(400, 100, page, 50.0);
        assert!((placed.scaled_width - 500.0).abs() < 1e-3);
        assert!((placed.x - 50.0).abs() < 1e-3);
        assert_eq!(placed.matrix()[0], placed.scaled_width);
    }

    #[test]
    fn accepts_jpeg_and_png() {
        let jpeg = testutil::jpeg_bytes(20, 10);
        let decoded = ImageEmbedder::decode(&jpeg).unwrap();
        assert_eq!(decoded.kind(), ImageKind::Jpeg);
        assert_eq!((decoded.width(), decoded.height()), (20, 10));

        let png = testutil::png_bytes(7, 9, false);
        assert_eq!(ImageEmbedder::decode(&png).unwrap().kind(), ImageKind::Png);
    }

    #[test]
    fn other_known_formats_are_unsupported() {
        let pixels = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        for format in [ImageFormat::Gif, ImageFormat::Bmp, ImageFormat::WebP] {
            let data = testutil::encode(&pixels, format);
            assert!(matches!(
                ImageEmbedder::decode(&data),
                Err(FalzwerkError::UnsupportedImageFormat(_))
            ));
        }
    }

    #[test]
    fn corrupt_bytes_fail_to_decode() {
        assert!(matches!(
            ImageEmbedder::decode(b"\x00\x01 random"),
            Err(FalzwerkError::ImageDecode(_))
        ));
        let mut png = testutil::png_bytes(32, 32, false);
        png.truncate(png.len() / 2);
        assert!(matches!(
            ImageEmbedder::decode(&png),
            Err(FalzwerkError::ImageDecode(_))
        ));
    }

    #[test]
    fn jpeg_is_embedded_untouched() {
        let jpeg = testutil::jpeg_bytes(16, 16);
        let xobject = ImageEmbedder::decode(&jpeg)
            .unwrap()
            .to_xobject(None)
            .unwrap();
        assert_eq!(xobject.image.content, jpeg);
        assert_eq!(name(&xobject.image.dict, b"Filter"), b"DCTDecode");
        assert_eq!(name(&xobject.image.dict, b"ColorSpace"), b"DeviceRGB");
        assert!(xobject.soft_mask.is_none());
    }

    #[test]
    fn png_alpha_becomes_soft_mask() {
        let png = testutil::png_bytes(16, 8, true);
        let xobject = ImageEmbedder::decode(&png)
            .unwrap()
            .to_xobject(None)
            .unwrap();
        assert_eq!(name(&xobject.image.dict, b"Filter"), b"FlateDecode");
        let mask = xobject.soft_mask.expect("alpha should produce a mask");
        assert_eq!(name(&mask.dict, b"ColorSpace"), b"DeviceGray");
    }

    #[test]
    fn quality_reencodes_opaque_images_only() {
        let opaque = testutil::png_bytes(16, 16, false);
        let xobject = ImageEmbedder::decode(&opaque)
            .unwrap()
            .to_xobject(Some(0.5))
            .unwrap();
        assert_eq!(name(&xobject.image.dict, b"Filter"), b"DCTDecode");

        let transparent = testutil::png_bytes(16, 16, true);
        let xobject = ImageEmbedder::decode(&transparent)
            .unwrap()
            .to_xobject(Some(0.5))
            .unwrap();
        assert_eq!(name(&xobject.image.dict, b"Filter"), b"FlateDecode");
    }

    #[test]
    fn reads_jpeg_component_count() {
        assert_eq!(jpeg_components(&testutil::jpeg_bytes(8, 8)), Some(3));
        assert_eq!(jpeg_components(b"not a jpeg"), None);
    }
}
