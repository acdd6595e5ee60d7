// src/ops.rs
//
// Adjustment settings and output formats.
// These are plain snapshots - cheap to clone, never mutated in place.
// The expensive work happens in engine::pipeline and engine::encoder.

use crate::engine::MAX_DIMENSION;
use bitflags::bitflags;
use image::ImageFormat;
use serde::{Deserialize, Serialize};

/// Resampling filter used by the resize stage.
///
/// `None` means nearest-pixel mapping with no smoothing; it is kept distinct
/// from `NearestNeighbor` only because the UI sends both names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResampleFilter {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "nearest", alias = "nearestneighbor", alias = "nearestNeighbor")]
    NearestNeighbor,
    #[serde(rename = "linear")]
    Linear,
    #[default]
    #[serde(rename = "catmullrom", alias = "catmullRom")]
    CatmullRom,
    #[serde(rename = "lanczos")]
    Lanczos,
}

bitflags! {
    /// Pipeline stages a settings snapshot actually activates.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ActiveStages: u16 {
        const RESIZE = 1 << 0;
        const BLUR = 1 << 1;
        const SHARPEN = 1 << 2;
        const GAMMA = 1 << 3;
        const CONTRAST = 1 << 4;
        const BRIGHTNESS = 1 << 5;
        const SATURATION = 1 << 6;
        const HUE = 1 << 7;
        const INVERT = 1 << 8;

        /// Stages folded into a single per-channel lookup table
        const TONE = Self::GAMMA.bits() | Self::CONTRAST.bits() | Self::BRIGHTNESS.bits();
        /// Stages handled in HSL space
        const COLOR = Self::SATURATION.bits() | Self::HUE.bits();
    }
}

pub const MAX_BLUR: f64 = 50.0;
pub const MAX_SHARPEN: f64 = 50.0;
pub const MIN_GAMMA: f64 = 0.01;
pub const MAX_GAMMA: f64 = 10.0;
/// Bound for contrast, brightness and saturation (percent)
pub const MAX_PERCENT: f64 = 100.0;

/// Snapshot of every adjustment the UI can request.
///
/// Field names follow the wire format of the desktop frontend; the longer
/// names are accepted as aliases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdjustmentSettings {
    /// Target width; 0 derives it from height keeping aspect ratio
    #[serde(alias = "targetWidth")]
    pub width: u32,
    /// Target height; 0 derives it from width keeping aspect ratio
    #[serde(alias = "targetHeight")]
    pub height: u32,
    #[serde(alias = "resampleFilter")]
    pub filter: ResampleFilter,
    /// Gaussian sigma in pixels
    #[serde(alias = "blurRadius")]
    pub blur: f64,
    #[serde(alias = "sharpenAmount")]
    pub sharpening: f64,
    pub gamma: f64,
    pub contrast: f64,
    pub brightness: f64,
    pub saturation: f64,
    /// Degrees; any value is accepted and wrapped onto the hue circle
    pub hue: f64,
    pub invert: bool,
}

impl Default for AdjustmentSettings {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            filter: ResampleFilter::default(),
            blur: 0.0,
            sharpening: 0.0,
            gamma: 1.0,
            contrast: 0.0,
            brightness: 0.0,
            saturation: 0.0,
            hue: 0.0,
            invert: false,
        }
    }
}

fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// Wrap degrees into [-180, 180).
pub fn wrap_hue(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can return 360.0 for tiny negative inputs due to rounding
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

impl AdjustmentSettings {
    /// Clamp every field into its declared range.
    ///
    /// The pipeline only ever sees normalized settings, so out-of-range input
    /// degrades to the nearest valid value instead of failing.
    pub fn normalized(&self) -> Self {
        Self {
            width: self.width.min(MAX_DIMENSION),
            height: self.height.min(MAX_DIMENSION),
            filter: self.filter,
            blur: clamp_or(self.blur, 0.0, MAX_BLUR, 0.0),
            sharpening: clamp_or(self.sharpening, 0.0, MAX_SHARPEN, 0.0),
            gamma: clamp_or(self.gamma, MIN_GAMMA, MAX_GAMMA, 1.0),
            contrast: clamp_or(self.contrast, -MAX_PERCENT, MAX_PERCENT, 0.0),
            brightness: clamp_or(self.brightness, -MAX_PERCENT, MAX_PERCENT, 0.0),
            saturation: clamp_or(self.saturation, -MAX_PERCENT, MAX_PERCENT, 0.0),
            hue: wrap_hue(self.hue),
            invert: self.invert,
        }
    }

    /// Stages that would change pixels for an image of the given size.
    /// Expects normalized settings.
    pub fn active_stages(&self, src_width: u32, src_height: u32) -> ActiveStages {
        let mut stages = ActiveStages::empty();
        let (w, h) = self.target_dimensions(src_width, src_height);
        if (w, h) != (src_width, src_height) {
            stages |= ActiveStages::RESIZE;
        }
        if self.blur > 0.0 {
            stages |= ActiveStages::BLUR;
        }
        if self.sharpening > 0.0 {
            stages |= ActiveStages::SHARPEN;
        }
        if self.gamma != 1.0 {
            stages |= ActiveStages::GAMMA;
        }
        if self.contrast != 0.0 {
            stages |= ActiveStages::CONTRAST;
        }
        if self.brightness != 0.0 {
            stages |= ActiveStages::BRIGHTNESS;
        }
        if self.saturation != 0.0 {
            stages |= ActiveStages::SATURATION;
        }
        if self.hue != 0.0 {
            stages |= ActiveStages::HUE;
        }
        if self.invert {
            stages |= ActiveStages::INVERT;
        }
        stages
    }

    /// True when no stage changes pixels regardless of the source size
    /// (width and height both 0).
    pub fn is_identity(&self) -> bool {
        let n = self.normalized();
        n.width == 0 && n.height == 0 && n.active_stages(1, 1).is_empty()
    }

    /// Resolve the output size. A zero side is derived from the other one
    /// keeping the aspect ratio; both zero keeps the source size.
    pub fn target_dimensions(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        let target_w = (self.width > 0).then_some(self.width);
        let target_h = (self.height > 0).then_some(self.height);
        match (target_w, target_h) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => {
                let ratio = w as f64 / src_width.max(1) as f64;
                (w, ((src_height as f64 * ratio).round() as u32).max(1))
            }
            (None, Some(h)) => {
                let ratio = h as f64 / src_height.max(1) as f64;
                (((src_width as f64 * ratio).round() as u32).max(1), h)
            }
            (None, None) => (src_width, src_height),
        }
    }
}

/// Output format for encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
    WebP { quality: u8 },
    Gif,
    Bmp,
    Tiff,
}

impl OutputFormat {
    /// Output format that re-encodes a decoded source in its own container.
    /// Formats without an encoder here (ICO and friends) fall back to PNG.
    pub fn for_source(format: ImageFormat, quality: u8) -> Self {
        match format {
            ImageFormat::Jpeg => Self::Jpeg { quality },
            ImageFormat::WebP => Self::WebP { quality },
            ImageFormat::Gif => Self::Gif,
            ImageFormat::Bmp => Self::Bmp,
            ImageFormat::Tiff => Self::Tiff,
            _ => Self::Png,
        }
    }

    /// Same container with a different quality. No-op for lossless formats.
    pub fn with_quality(self, quality: u8) -> Self {
        match self {
            Self::Jpeg { .. } => Self::Jpeg { quality },
            Self::WebP { .. } => Self::WebP { quality },
            other => other,
        }
    }

    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::Jpeg { .. } | Self::WebP { .. })
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            Self::Jpeg { .. } => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::WebP { .. } => ImageFormat::WebP,
            Self::Gif => ImageFormat::Gif,
            Self::Bmp => ImageFormat::Bmp,
            Self::Tiff => ImageFormat::Tiff,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpeg",
            Self::Png => "png",
            Self::WebP { .. } => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }

    /// File extension (without dot) for derived output names
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpg",
            Self::Png => "png",
            Self::WebP { .. } => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }
}
