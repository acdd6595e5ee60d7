// src/engine/encoder.rs
//
// Output encoders. JPEG goes through mozjpeg, PNG through image + oxipng,
// WebP through libwebp; GIF/BMP/TIFF use the image crate directly.
//
// Two effort levels exist. `Effort::Preview` trades a few percent of size
// for latency while the user drags a slider; `Effort::Final` is used for
// saved files and every capacity probe. Tuning varies smoothly with quality
// so encoded size stays close to monotonic in it.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::MAX_DIMENSION;
use crate::error::EngineError;
use crate::ops::OutputFormat;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use mozjpeg::{ColorSpace, Compress};
use std::borrow::Cow;
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effort {
    Preview,
    #[default]
    Final,
}

/// Encoder knobs derived from a 0-100 quality and an effort level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderTuning {
    quality: u8,
    effort: Effort,
}

impl EncoderTuning {
    pub fn new(quality: u8, effort: Effort) -> Self {
        Self {
            quality: quality.min(100),
            effort,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Input smoothing for mozjpeg, 0 at q>=90 rising linearly to 20 at q=0.
    pub fn jpeg_smoothing(&self) -> u8 {
        let deficit = 90u8.saturating_sub(self.quality) as u32;
        (deficit * 20 / 90) as u8
    }

    fn jpeg_progressive(&self) -> bool {
        self.effort == Effort::Final
    }

    pub fn png_preset(&self) -> u8 {
        match self.effort {
            Effort::Preview => 1,
            Effort::Final => 4,
        }
    }

    fn webp_config(&self) -> EngineResult<webp::WebPConfig> {
        let mut config = webp::WebPConfig::new()
            .map_err(|_| EngineError::encode_failed("webp", "libwebp rejected default config"))?;
        let q = self.quality as i32;
        config.quality = self.quality as f32;
        config.method = match self.effort {
            Effort::Preview => 2,
            Effort::Final => 4,
        };
        config.pass = 1;
        // Stronger spatial noise shaping and deblocking as quality drops
        config.sns_strength = 50 + (100 - q) * 30 / 100;
        config.filter_strength = 20 + (100 - q) / 4;
        config.filter_sharpness = if q >= 85 { 2 } else { 0 };
        config.autofilter = i32::from(self.effort == Effort::Final);
        Ok(config)
    }
}

fn reject_quality(codec: &'static str, quality: u8) -> EngineResult<()> {
    match quality {
        0..=100 => Ok(()),
        q => Err(EngineError::encode_failed(
            codec,
            format!("quality {q} is outside [0, 100]"),
        )),
    }
}

fn reject_dimensions(codec: &'static str, img: &DynamicImage) -> EngineResult<()> {
    match (img.width(), img.height()) {
        (0, _) | (_, 0) => Err(EngineError::encode_failed(
            codec,
            format!("cannot encode an empty {}x{} image", img.width(), img.height()),
        )),
        (w, h) if w.max(h) > MAX_DIMENSION => {
            Err(EngineError::dimension_exceeds_limit(w.max(h), MAX_DIMENSION))
        }
        _ => Ok(()),
    }
}

fn as_rgb(img: &DynamicImage) -> Cow<'_, RgbImage> {
    match img {
        DynamicImage::ImageRgb8(buf) => Cow::Borrowed(buf),
        other => Cow::Owned(other.to_rgb8()),
    }
}

fn as_rgba(img: &DynamicImage) -> Cow<'_, RgbaImage> {
    match img {
        DynamicImage::ImageRgba8(buf) => Cow::Borrowed(buf),
        other => Cow::Owned(other.to_rgba8()),
    }
}

/// Encode at final effort.
pub fn encode(img: &DynamicImage, format: OutputFormat) -> EngineResult<Vec<u8>> {
    encode_with(img, format, Effort::Final)
}

pub fn encode_with(
    img: &DynamicImage,
    format: OutputFormat,
    effort: Effort,
) -> EngineResult<Vec<u8>> {
    match format {
        OutputFormat::Jpeg { quality } => {
            encode_jpeg_with(img, EncoderTuning::new(quality, effort), quality)
        }
        OutputFormat::WebP { quality } => {
            encode_webp_with(img, EncoderTuning::new(quality, effort), quality)
        }
        OutputFormat::Png => encode_png_with(img, EncoderTuning::new(100, effort)),
        OutputFormat::Gif | OutputFormat::Bmp | OutputFormat::Tiff => {
            encode_with_image_crate(img, format)
        }
    }
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> EngineResult<Vec<u8>> {
    encode_jpeg_with(img, EncoderTuning::new(quality, Effort::Final), quality)
}

pub fn encode_png(img: &DynamicImage) -> EngineResult<Vec<u8>> {
    encode_png_with(img, EncoderTuning::new(100, Effort::Final))
}

pub fn encode_webp(img: &DynamicImage, quality: u8) -> EngineResult<Vec<u8>> {
    encode_webp_with(img, EncoderTuning::new(quality, Effort::Final), quality)
}

// `requested` is the caller's raw quality; the tuning has it clamped already.
fn encode_jpeg_with(
    img: &DynamicImage,
    tuning: EncoderTuning,
    requested: u8,
) -> EngineResult<Vec<u8>> {
    reject_quality("jpeg", requested)?;
    reject_dimensions("jpeg", img)?;
    run_with_panic_policy("encode:jpeg", || {
        let rgb = as_rgb(img);
        let (width, height) = (rgb.width() as usize, rgb.height() as usize);
        let stride = width * 3;

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(width, height);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(f32::from(tuning.quality().max(1)));
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_optimize_coding(true);
        comp.set_smoothing_factor(tuning.jpeg_smoothing());
        // No set_optimize_scans: with it mozjpeg output size stops
        // following the quality factor
        if tuning.jpeg_progressive() {
            comp.set_progressive_mode();
        }

        let fail = |stage: &str, e: std::io::Error| {
            EngineError::encode_failed("jpeg", format!("mozjpeg {stage}: {e}"))
        };
        let mut out = Vec::with_capacity((width * height / 4).max(4096));
        let mut started = comp.start_compress(&mut out).map_err(|e| fail("start", e))?;
        for scanline in rgb.as_raw().chunks_exact(stride) {
            started
                .write_scanlines(scanline)
                .map_err(|e| fail("scanline", e))?;
        }
        started.finish().map_err(|e| fail("finish", e))?;
        Ok(out)
    })
}

fn encode_png_with(img: &DynamicImage, tuning: EncoderTuning) -> EngineResult<Vec<u8>> {
    reject_dimensions("png", img)?;
    run_with_panic_policy("encode:png", || {
        let mut raw = Vec::new();
        img.write_to(&mut Cursor::new(&mut raw), ImageFormat::Png)
            .map_err(|e| EngineError::encode_failed("png", e.to_string()))?;

        let mut options = oxipng::Options::from_preset(tuning.png_preset());
        options.strip = oxipng::StripChunks::Safe;
        oxipng::optimize_from_memory(&raw, &options)
            .map_err(|e| EngineError::encode_failed("png", format!("oxipng: {e}")))
    })
}

fn encode_webp_with(
    img: &DynamicImage,
    tuning: EncoderTuning,
    requested: u8,
) -> EngineResult<Vec<u8>> {
    reject_quality("webp", requested)?;
    reject_dimensions("webp", img)?;
    run_with_panic_policy("encode:webp", || {
        let config = tuning.webp_config()?;
        let (w, h) = (img.width(), img.height());
        // Alpha only when the source carries it; RGB input encodes smaller
        let encoded = if img.color().has_alpha() {
            let rgba = as_rgba(img);
            webp::Encoder::from_rgba(&rgba, w, h).encode_advanced(&config)
        } else {
            let rgb = as_rgb(img);
            webp::Encoder::from_rgb(&rgb, w, h).encode_advanced(&config)
        };
        encoded
            .map(|mem| mem.to_vec())
            .map_err(|e| EngineError::encode_failed("webp", format!("libwebp: {e:?}")))
    })
}

/// GIF, BMP and TIFF have no quality knob; the image crate handles them.
pub fn encode_with_image_crate(img: &DynamicImage, format: OutputFormat) -> EngineResult<Vec<u8>> {
    let name = format.name();
    reject_dimensions(name, img)?;
    run_with_panic_policy("encode:image", || {
        // GIF frames are RGBA; BMP and TIFF take 8-bit RGB(A) as-is
        let normalized: Cow<'_, DynamicImage> = match (format, img) {
            (OutputFormat::Gif, DynamicImage::ImageRgba8(_)) => Cow::Borrowed(img),
            (OutputFormat::Gif, other) => Cow::Owned(DynamicImage::ImageRgba8(other.to_rgba8())),
            (_, DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_)) => Cow::Borrowed(img),
            (_, other) if other.color().has_alpha() => {
                Cow::Owned(DynamicImage::ImageRgba8(other.to_rgba8()))
            }
            (_, other) => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
        };

        let mut buf = Vec::new();
        normalized
            .write_to(&mut Cursor::new(&mut buf), format.image_format())
            .map_err(|e| EngineError::encode_failed(name, e.to_string()))?;
        Ok(buf)
    })
}
