// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quality passes: JPEG re-encoding of the images inside a PDF, and of a single
// raster image.

use std::collections::BTreeSet;

use falzwerk_core::config::quality_percent;
use falzwerk_core::{FalzwerkError, Result};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, instrument};

use super::{EncodePass, serialise};
use crate::image::ImageProcessor;

/// Re-encodes every eligible image XObject as JPEG, keeping the original
/// stream whenever the JPEG is not smaller.
///
/// Eligible: 8 bits per component, `DeviceRGB` or `DeviceGray`, no `/Decode`,
/// not a mask, and either unfiltered, plain `FlateDecode` or `DCTDecode`.
#[derive(Debug, Clone, Copy)]
pub struct ImageRecompressor {
    compress_streams: bool,
}

impl ImageRecompressor {
    pub fn new(compress_streams: bool) -> Self {
        Self { compress_streams }
    }
}

impl EncodePass for ImageRecompressor {
    type Subject = Document;

    #[instrument(skip_all, fields(quality))]
    fn encode(&self, document: &Document, quality: f32) -> Result<Vec<u8>> {
        let mut working = document.clone();
        let jpeg_quality = quality_percent(quality);

        let masks = mask_ids(&working);
        let candidates: Vec<ObjectId> = working
            .objects
            .iter()
            .filter(|(id, object)| !masks.contains(*id) && is_image(object))
            .map(|(id, _)| *id)
            .collect();

        let mut replaced = 0usize;
        for id in candidates {
            let Ok(Object::Stream(stream)) = working.get_object(id) else {
                continue;
            };
            match recompress(stream, jpeg_quality) {
                Ok(Some(smaller)) => {
                    working.objects.insert(id, Object::Stream(smaller));
                    replaced += 1;
                }
                Ok(None) => {}
                Err(err) => debug!(?id, %err, "Image left as is"),
            }
        }

        debug!(replaced, "Images re-encoded");
        serialise(&mut working, self.compress_streams)
    }
}

/// JPEG pass over one decoded raster image.
#[derive(Debug, Clone, Copy)]
pub struct ImagePass;

impl EncodePass for ImagePass {
    type Subject = ImageProcessor;

    fn encode(&self, image: &ImageProcessor, quality: f32) -> Result<Vec<u8>> {
        image.to_jpeg_bytes(quality_percent(quality))
    }
}

// -- Helpers ------------------------------------------------------------------

enum SampleEncoding {
    Raw,
    Flate,
    Dct,
}

/// Smaller JPEG replacement for `stream`, or `None` when the image is not
/// eligible or would not shrink.
fn recompress(stream: &Stream, quality: u8) -> Result<Option<Stream>> {
    let dict = &stream.dict;
    let int = |key: &[u8]| dict.get(key).and_then(Object::as_i64).unwrap_or(0);
    let (width, height) = (int(b"Width"), int(b"Height"));

    if width <= 0
        || height <= 0
        || int(b"BitsPerComponent") != 8
        || dict.has(b"Decode")
        || dict.has(b"SMaskInData")
        || matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)))
    {
        return Ok(None);
    }

    let channels = match dict.get(b"ColorSpace").and_then(Object::as_name) {
        Ok(name) if name == b"DeviceRGB" => 3,
        Ok(name) if name == b"DeviceGray" => 1,
        _ => return Ok(None),
    };
    let Some(encoding) = stream_encoding(dict) else {
        return Ok(None);
    };

    let (width, height) = (width as u32, height as u32);
    let pixels = match encoding {
        SampleEncoding::Dct => {
            image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(|err| FalzwerkError::ImageDecode(err.to_string()))?
        }
        SampleEncoding::Flate | SampleEncoding::Raw => {
            let mut samples = match encoding {
                SampleEncoding::Flate => stream
                    .decompressed_content()
                    .map_err(|err| FalzwerkError::ImageDecode(err.to_string()))?,
                _ => stream.content.clone(),
            };
            let expected = width as usize * height as usize * channels;
            if samples.len() < expected {
                return Ok(None);
            }
            samples.truncate(expected);
            let decoded = if channels == 3 {
                RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8)
            } else {
                GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8)
            };
            decoded.ok_or_else(|| FalzwerkError::ImageDecode("sample buffer mismatch".to_string()))?
        }
    };

    let processor = ImageProcessor::from_dynamic(pixels);
    let jpeg = processor.to_jpeg_bytes(quality)?;
    if jpeg.len() >= stream.content.len() {
        return Ok(None);
    }

    let mut dict = dict.clone();
    dict.set("Filter", "DCTDecode");
    dict.remove(b"DecodeParms");
    dict.set(
        "ColorSpace",
        if processor.has_color() {
            "DeviceRGB"
        } else {
            "DeviceGray"
        },
    );
    Ok(Some(Stream::new(dict, jpeg).with_compression(false)))
}

/// How the stream's samples are stored, or `None` for anything this pass
/// does not decode (other filters, filter chains, predictors).
fn stream_encoding(dict: &Dictionary) -> Option<SampleEncoding> {
    let filter = match dict.get(b"Filter") {
        Err(_) => return Some(SampleEncoding::Raw),
        Ok(Object::Name(name)) => name.as_slice(),
        Ok(Object::Array(items)) if items.len() == 1 => items[0].as_name().ok()?,
        Ok(_) => return None,
    };
    match filter {
        b"FlateDecode" if !dict.has(b"DecodeParms") => Some(SampleEncoding::Flate),
        b"DCTDecode" => Some(SampleEncoding::Dct),
        _ => None,
    }
}

fn is_image(object: &Object) -> bool {
    let Object::Stream(stream) = object else {
        return false;
    };
    stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|name| name == b"Image")
        .unwrap_or(false)
}

/// Ids of streams used as `/SMask` or `/Mask`; those stay lossless.
fn mask_ids(document: &Document) -> BTreeSet<ObjectId> {
    document
        .objects
        .values()
        .filter_map(|object| match object {
            Object::Stream(stream) => Some(&stream.dict),
            _ => None,
        })
        .flat_map(|dict| {
            [b"SMask".as_slice(), b"Mask".as_slice()]
                .into_iter()
                .filter_map(|key| dict.get(key).and_then(Object::as_reference).ok())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::embed::image_dictionary;
    use crate::testutil;

    fn raw_rgb_stream(width: u32, height: u32) -> Stream {
        let samples = testutil::noisy_rgb(width, height).into_raw();
        let mut dict = image_dictionary(width, height, "DeviceRGB", "FlateDecode");
        dict.remove(b"Filter");
        Stream::new(dict, samples)
    }

    #[test]
    fn raw_samples_become_jpeg() {
        let stream = raw_rgb_stream(64, 64);
        let smaller = recompress(&stream, 70).unwrap().expect("should shrink");
        assert!(smaller.content.len() < stream.content.len());
        assert_eq!(
            smaller.dict.get(b"Filter").and_then(Object::as_name).unwrap(),
            b"DCTDecode"
        );
        assert!(image::load_from_memory(&smaller.content).is_ok());
    }

    #[test]
    fn ineligible_images_are_left_alone() {
        let mut stream = raw_rgb_stream(8, 8);
        stream.dict.set("BitsPerComponent", 1i64);
        assert!(recompress(&stream, 70).unwrap().is_none());

        let mut stream = raw_rgb_stream(8, 8);
        stream.dict.set("ColorSpace", "DeviceCMYK");
        assert!(recompress(&stream, 70).unwrap().is_none());

        let mut stream = raw_rgb_stream(8, 8);
        stream.dict.set("Filter", "LZWDecode");
        assert!(recompress(&stream, 70).unwrap().is_none());
    }

    #[test]
    fn short_sample_buffers_are_skipped() {
        let mut stream = raw_rgb_stream(8, 8);
        stream.content.truncate(10);
        assert!(recompress(&stream, 70).unwrap().is_none());
    }

    #[test]
    fn image_pass_encodes_jpeg() {
        let image = ImageProcessor::from_bytes(&testutil::png_bytes(32, 32, false)).unwrap();
        let jpeg = ImagePass.encode(&image, 0.5).unwrap();
        assert_eq!(
            image::guess_format(&jpeg).unwrap(),
            image::ImageFormat::Jpeg
        );
    }
}
