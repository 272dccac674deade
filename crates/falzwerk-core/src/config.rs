// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration. Every tunable lives in one of these structs and is
// passed in by the caller; there are no ambient defaults elsewhere.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FalzwerkError, Result};
use crate::types::{PageSizePolicy, RasterFormat};

/// Quality ladder tried by the size-driven encoder, highest first.
pub const DEFAULT_LADDER: [f32; 4] = [0.9, 0.7, 0.5, 0.3];

/// Page layout settings for assembly (merge, images-to-document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Output page-size policy.
    pub page_size: PageSizePolicy,
    /// Margin in points kept clear around placed content.
    pub margin_pt: f32,
    /// When set, opaque images are re-encoded as JPEG at this quality
    /// (0.0-1.0) before embedding. `None` embeds images losslessly.
    pub image_quality: Option<f32>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            page_size: PageSizePolicy::KeepOriginal,
            margin_pt: 20.0,
            image_quality: None,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.margin_pt.is_finite() || self.margin_pt < 0.0 {
            return Err(FalzwerkError::InvalidConfig(format!(
                "margin must be a non-negative number, got {}",
                self.margin_pt
            )));
        }
        if let Some(q) = self.image_quality {
            check_quality("image quality", q)?;
        }
        Ok(())
    }
}

/// Settings for the size-driven encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Strictly decreasing qualities in `(0, 1]`.
    pub ladder: Vec<f32>,
    /// Stop early once `encoded < reference * good_enough_ratio`.
    pub good_enough_ratio: f32,
    /// Flate-compress uncompressed streams and prune unreachable objects.
    pub compress_streams: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            ladder: DEFAULT_LADDER.to_vec(),
            good_enough_ratio: 0.7,
            compress_streams: true,
        }
    }
}

impl EncodingConfig {
    /// Same settings with a caller-supplied ladder.
    pub fn with_ladder(ladder: Vec<f32>) -> Self {
        Self {
            ladder,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ladder.is_empty() {
            return Err(FalzwerkError::InvalidConfig(
                "quality ladder is empty".to_string(),
            ));
        }
        for q in &self.ladder {
            check_quality("ladder quality", *q)?;
            if *q == 0.0 {
                return Err(FalzwerkError::InvalidConfig(
                    "ladder quality must be above zero".to_string(),
                ));
            }
        }
        if self.ladder.windows(2).any(|pair| pair[1] >= pair[0]) {
            return Err(FalzwerkError::InvalidConfig(format!(
                "quality ladder must be strictly decreasing: {:?}",
                self.ladder
            )));
        }
        if !(self.good_enough_ratio > 0.0 && self.good_enough_ratio <= 1.0) {
            return Err(FalzwerkError::InvalidConfig(format!(
                "good-enough ratio must be in (0, 1], got {}",
                self.good_enough_ratio
            )));
        }
        Ok(())
    }
}

/// Settings for page rasterization (document-to-images).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    pub format: RasterFormat,
    /// JPEG quality in `0.0..=1.0`; ignored for PNG.
    pub quality: f32,
    /// Render scale relative to 72 dpi; at least 1.0.
    pub scale: f32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            format: RasterFormat::Jpeg,
            quality: 0.92,
            scale: 2.0,
        }
    }
}

impl RasterConfig {
    pub fn validate(&self) -> Result<()> {
        check_quality("raster quality", self.quality)?;
        if !self.scale.is_finite() || self.scale < 1.0 {
            return Err(FalzwerkError::InvalidConfig(format!(
                "render scale must be at least 1.0, got {}",
                self.scale
            )));
        }
        Ok(())
    }
}

/// All engine settings, as persisted in a JSON config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub render: RenderConfig,
    pub encoding: EncodingConfig,
    pub raster: RasterConfig,
}

impl EngineConfig {
    /// Load and validate a JSON config file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        debug!(path = %path.as_ref().display(), "engine config loaded");
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        self.encoding.validate()?;
        self.raster.validate()
    }
}

/// Convert a `0.0..=1.0` quality to the 1-100 scale image encoders expect.
pub fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

fn check_quality(what: &str, quality: f32) -> Result<()> {
    if (0.0..=1.0).contains(&quality) {
        Ok(())
    } else {
        Err(FalzwerkError::InvalidConfig(format!(
            "{what} must be within 0.0-1.0, got {quality}"
        )))
    }
}
