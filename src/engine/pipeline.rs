// src/engine/pipeline.rs
//
// Adjustment pipeline: resize → blur → sharpen → tone → color → invert.

use crate::engine::filters;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::EngineError;
use crate::ops::{ActiveStages, AdjustmentSettings, ResampleFilter};
use fast_image_resize::{self as fir, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, ImageBuffer, Pixel, RgbImage, RgbaImage};
use tracing::debug;

// Pipeline errors stay in the EngineError taxonomy so callers can tell a
// resize failure from a decode or encode failure.
type PipelineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }

    pub fn into_engine_error(self) -> EngineError {
        EngineError::resize_failed(self.source_dims, self.target_dims, self.reason)
    }
}

/// fast_image_resize algorithm for a filter. `None` samples the nearest pixel.
pub fn resize_alg(filter: ResampleFilter) -> fir::ResizeAlg {
    match filter {
        ResampleFilter::None | ResampleFilter::NearestNeighbor => fir::ResizeAlg::Nearest,
        ResampleFilter::Linear => fir::ResizeAlg::Convolution(fir::FilterType::Bilinear),
        ResampleFilter::CatmullRom => fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom),
        ResampleFilter::Lanczos => fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3),
    }
}

fn fallback_filter(filter: ResampleFilter) -> FilterType {
    match filter {
        ResampleFilter::None | ResampleFilter::NearestNeighbor => FilterType::Nearest,
        ResampleFilter::Linear => FilterType::Triangle,
        ResampleFilter::CatmullRom => FilterType::CatmullRom,
        ResampleFilter::Lanczos => FilterType::Lanczos3,
    }
}

/// Apply every active adjustment in the fixed stage order.
///
/// Settings are normalized first. When nothing is active the source is cloned
/// untouched, so identity settings are pixel-identical.
pub fn apply(img: &DynamicImage, settings: &AdjustmentSettings) -> PipelineResult<DynamicImage> {
    let settings = settings.normalized();
    let (src_w, src_h) = (img.width(), img.height());
    let stages = settings.active_stages(src_w, src_h);
    if stages.is_empty() {
        return Ok(img.clone());
    }
    debug!(
        target: "decolgen::pipeline",
        stages = ?stages,
        width = src_w,
        height = src_h,
        "applying adjustments"
    );

    let mut current = if stages.contains(ActiveStages::RESIZE) {
        let (w, h) = settings.target_dimensions(src_w, src_h);
        check_output_size(w, h)?;
        fast_resize(img, w, h, settings.filter).map_err(ResizeError::into_engine_error)?
    } else {
        img.clone()
    };

    if stages.intersects(ActiveStages::RESIZE.complement()) {
        current = apply_pixel_stages(current, &settings, stages)?;
    }
    Ok(current)
}

fn check_output_size(width: u32, height: u32) -> PipelineResult<()> {
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(EngineError::processing_failure(
            "resize",
            format!("target size {width}x{height} is outside 1..={MAX_DIMENSION}"),
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(EngineError::processing_failure(
            "resize",
            format!("target size {width}x{height} exceeds {MAX_PIXELS} pixels"),
        ));
    }
    Ok(())
}

/// Spatial stages on an 8-bit RGB(A) buffer, returning its raw samples.
fn spatial_stages<P>(
    mut img: ImageBuffer<P, Vec<u8>>,
    settings: &AdjustmentSettings,
    stages: ActiveStages,
) -> Vec<u8>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if stages.contains(ActiveStages::BLUR) {
        img = filters::gaussian_blur(&img, settings.blur);
    }
    if stages.contains(ActiveStages::SHARPEN) {
        img = filters::sharpen(&img, settings.sharpening);
    }
    img.into_raw()
}

/// Blur and sharpen on the image buffer, then per-pixel stages on the
/// interleaved samples.
fn apply_pixel_stages(
    img: DynamicImage,
    settings: &AdjustmentSettings,
    stages: ActiveStages,
) -> PipelineResult<DynamicImage> {
    let (w, h) = (img.width(), img.height());
    let has_alpha = img.color().has_alpha();
    let channels = if has_alpha { 4 } else { 3 };
    let mut buf = if has_alpha {
        spatial_stages(img.into_rgba8(), settings, stages)
    } else {
        spatial_stages(img.into_rgb8(), settings, stages)
    };

    let expected = (w as usize)
        .checked_mul(h as usize)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| EngineError::processing_failure("pixels", "image buffer size overflow"))?;
    if buf.len() != expected {
        return Err(EngineError::processing_failure(
            "pixels",
            format!("buffer holds {} bytes, expected {expected}", buf.len()),
        ));
    }

    if stages.intersects(ActiveStages::TONE) {
        let lut = filters::tone_lut(settings.gamma, settings.contrast, settings.brightness);
        filters::apply_lut(&mut buf, channels, &lut);
    }
    if stages.intersects(ActiveStages::COLOR) {
        filters::adjust_saturation_hue(&mut buf, channels, settings.saturation, settings.hue);
    }
    if stages.contains(ActiveStages::INVERT) {
        filters::invert(&mut buf, channels);
    }

    let rebuilt = if has_alpha {
        RgbaImage::from_raw(w, h, buf).map(DynamicImage::ImageRgba8)
    } else {
        RgbImage::from_raw(w, h, buf).map(DynamicImage::ImageRgb8)
    };
    rebuilt.ok_or_else(|| EngineError::processing_failure("pixels", "failed to rebuild image"))
}

/// Layouts fast_image_resize is fed with. Anything else is widened first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Rgb,
    Rgba,
}

impl Layout {
    fn pixel_type(self) -> PixelType {
        match self {
            Layout::Rgb => PixelType::U8x3,
            Layout::Rgba => PixelType::U8x4,
        }
    }

    fn wrap(self, width: u32, height: u32, raw: Vec<u8>) -> Option<DynamicImage> {
        match self {
            Layout::Rgb => RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
            Layout::Rgba => RgbaImage::from_raw(width, height, raw).map(DynamicImage::ImageRgba8),
        }
    }
}

// RGB8/RGBA8 hand their buffer over without a copy
fn into_layout(img: DynamicImage) -> (Layout, Vec<u8>) {
    match img {
        DynamicImage::ImageRgb8(buf) => (Layout::Rgb, buf.into_raw()),
        DynamicImage::ImageRgba8(buf) => (Layout::Rgba, buf.into_raw()),
        other if other.color().has_alpha() => (Layout::Rgba, other.to_rgba8().into_raw()),
        other => (Layout::Rgb, other.to_rgb8().into_raw()),
    }
}

/// Resize a borrowed image. The source is cloned first.
pub fn fast_resize(
    img: &DynamicImage,
    dst_width: u32,
    dst_height: u32,
    filter: ResampleFilter,
) -> Result<DynamicImage, ResizeError> {
    fast_resize_owned(img.clone(), dst_width, dst_height, filter)
}

/// Resize with fast_image_resize, falling back to `image::imageops` if it
/// refuses the buffer.
pub fn fast_resize_owned(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
    filter: ResampleFilter,
) -> Result<DynamicImage, ResizeError> {
    let src = (img.width(), img.height());
    let dst = (dst_width, dst_height);
    if [src.0, src.1, dst.0, dst.1].contains(&0) {
        return Err(ResizeError::new(src, dst, "zero-sized source or target"));
    }

    let (layout, raw) = into_layout(img);
    resize_fir(&raw, layout, src, dst, filter).or_else(|fir_err| {
        debug!(
            target: "decolgen::pipeline",
            error = %fir_err,
            "fast_image_resize failed; using image crate"
        );
        resize_image_crate(raw, layout, src, dst, filter)
            .map_err(|e| ResizeError::new(src, dst, format!("{fir_err}; fallback: {e}")))
    })
}

fn resize_fir(
    raw: &[u8],
    layout: Layout,
    (src_w, src_h): (u32, u32),
    (dst_w, dst_h): (u32, u32),
    filter: ResampleFilter,
) -> Result<DynamicImage, String> {
    let source = fir::images::ImageRef::new(src_w, src_h, raw, layout.pixel_type())
        .map_err(|e| format!("source buffer: {e:?}"))?;
    let mut target = fir::images::Image::new(dst_w, dst_h, layout.pixel_type());
    // Premultiplying an opaque image only costs time
    let translucent = layout == Layout::Rgba && raw.chunks_exact(4).any(|px| px[3] != u8::MAX);
    let options = ResizeOptions::new()
        .resize_alg(resize_alg(filter))
        .use_alpha(translucent);
    fir::Resizer::new()
        .resize(&source, &mut target, &options)
        .map_err(|e| format!("resize: {e:?}"))?;
    layout
        .wrap(dst_w, dst_h, target.into_vec())
        .ok_or_else(|| "resized buffer has the wrong length".to_string())
}

fn resize_image_crate(
    raw: Vec<u8>,
    layout: Layout,
    (src_w, src_h): (u32, u32),
    (dst_w, dst_h): (u32, u32),
    filter: ResampleFilter,
) -> Result<DynamicImage, String> {
    let img = layout
        .wrap(src_w, src_h, raw)
        .ok_or_else(|| format!("source buffer too short for {src_w}x{src_h}"))?;
    Ok(img.resize_exact(dst_w, dst_h, fallback_filter(filter)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, LumaA};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 5 % 256) as u8, (y * 11 % 256) as u8, 64])
        }))
    }

    fn create_test_image_rgba(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 5 % 256) as u8, (y * 11 % 256) as u8, 64, 200])
        }))
    }

    mod apply_tests {
        use super::*;

        #[test]
        fn identity_settings_return_identical_pixels() {
            let img = create_test_image(37, 23);
            let out = apply(&img, &AdjustmentSettings::default()).unwrap();
            assert_eq!(out, img);
        }

        #[test]
        fn identity_keeps_non_rgb_layout() {
            let img =
                DynamicImage::ImageLumaA8(image::ImageBuffer::from_pixel(4, 4, LumaA([9, 200])));
            let out = apply(&img, &AdjustmentSettings::default()).unwrap();
            assert_eq!(out, img);
        }

        #[test]
        fn width_only_keeps_aspect_ratio() {
            let img = create_test_image(100, 50);
            let settings = AdjustmentSettings {
                width: 50,
                ..Default::default()
            };
            let out = apply(&img, &settings).unwrap();
            assert_eq!(out.dimensions(), (50, 25));
        }

        #[test]
        fn both_sides_given_are_used_as_is() {
            let img = create_test_image(100, 50);
            let settings = AdjustmentSettings {
                width: 30,
                height: 60,
                filter: ResampleFilter::Lanczos,
                ..Default::default()
            };
            let out = apply(&img, &settings).unwrap();
            assert_eq!(out.dimensions(), (30, 60));
        }

        #[test]
        fn every_filter_resizes() {
            let img = create_test_image(64, 64);
            for filter in [
                ResampleFilter::None,
                ResampleFilter::NearestNeighbor,
                ResampleFilter::Linear,
                ResampleFilter::CatmullRom,
                ResampleFilter::Lanczos,
            ] {
                let settings = AdjustmentSettings {
                    width: 16,
                    filter,
                    ..Default::default()
                };
                assert_eq!(apply(&img, &settings).unwrap().dimensions(), (16, 16));
            }
        }

        #[test]
        fn oversized_target_is_processing_failure() {
            let img = create_test_image(4, 4);
            let settings = AdjustmentSettings {
                width: MAX_DIMENSION,
                height: MAX_DIMENSION,
                ..Default::default()
            };
            let err = apply(&img, &settings).unwrap_err();
            assert!(matches!(err, EngineError::ProcessingFailure { .. }));
        }

        #[test]
        fn invert_twice_is_identity() {
            let img = create_test_image_rgba(9, 7);
            let settings = AdjustmentSettings {
                invert: true,
                ..Default::default()
            };
            let once = apply(&img, &settings).unwrap();
            assert_ne!(once, img);
            let twice = apply(&once, &settings).unwrap();
            assert_eq!(twice, img);
        }

        #[test]
        fn alpha_survives_color_stages() {
            let img = create_test_image_rgba(5, 5);
            let settings = AdjustmentSettings {
                brightness: 40.0,
                saturation: -50.0,
                hue: 90.0,
                ..Default::default()
            };
            let out = apply(&img, &settings).unwrap().to_rgba8();
            assert!(out.pixels().all(|p| p.0[3] == 200));
        }

        #[test]
        fn brightness_max_keeps_white_white() {
            let img =
                DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 3, image::Rgb([255, 255, 255])));
            let settings = AdjustmentSettings {
                brightness: 100.0,
                ..Default::default()
            };
            let out = apply(&img, &settings).unwrap();
            assert_eq!(out, img);
        }

        #[test]
        fn hue_wraps_around_the_circle() {
            let img = create_test_image(16, 16);
            let wrapped = AdjustmentSettings {
                hue: 370.0,
                ..Default::default()
            };
            let plain = AdjustmentSettings {
                hue: 10.0,
                ..Default::default()
            };
            assert_eq!(apply(&img, &wrapped).unwrap(), apply(&img, &plain).unwrap());
        }

        #[test]
        fn luma_input_is_promoted_when_adjusted() {
            let img =
                DynamicImage::ImageLuma8(image::GrayImage::from_pixel(4, 4, image::Luma([100])));
            let settings = AdjustmentSettings {
                contrast: 50.0,
                ..Default::default()
            };
            let out = apply(&img, &settings).unwrap();
            assert!(matches!(out, DynamicImage::ImageRgb8(_)));
        }

        #[test]
        fn resize_then_filters_keep_target_size() {
            let img = create_test_image(80, 40);
            let settings = AdjustmentSettings {
                width: 40,
                blur: 1.5,
                sharpening: 0.5,
                ..Default::default()
            };
            assert_eq!(apply(&img, &settings).unwrap().dimensions(), (40, 20));
        }
    }

    mod resize_tests {
        use super::*;

        fn ramp(len: usize) -> Vec<u8> {
            (0..len).map(|i| (i * 7 % 253) as u8).collect()
        }

        #[test]
        fn image_crate_path_handles_both_layouts() {
            let rgb = ramp(8 * 4 * 3);
            let rgb = resize_image_crate(rgb, Layout::Rgb, (8, 4), (4, 2), ResampleFilter::CatmullRom)
                .unwrap();
            assert_eq!(rgb.dimensions(), (4, 2));
            assert!(matches!(rgb, DynamicImage::ImageRgb8(_)));

            let rgba = ramp(6 * 3 * 4);
            let rgba = resize_image_crate(rgba, Layout::Rgba, (6, 3), (3, 2), ResampleFilter::None)
                .unwrap();
            assert_eq!(rgba.dimensions(), (3, 2));
            assert!(matches!(rgba, DynamicImage::ImageRgba8(_)));
        }

        #[test]
        fn image_crate_path_rejects_short_buffer() {
            let err = resize_image_crate(vec![0; 5], Layout::Rgb, (4, 4), (2, 2), ResampleFilter::Linear)
                .unwrap_err();
            assert!(err.contains("4x4"));
        }

        #[test]
        fn transparent_pixels_do_not_bleed_colour() {
            // Left half opaque white, right half fully transparent black
            let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(8, 8, |x, _| {
                if x < 4 {
                    image::Rgba([255, 255, 255, 255])
                } else {
                    image::Rgba([0, 0, 0, 0])
                }
            }));
            let out = fast_resize(&img, 4, 4, ResampleFilter::Linear).unwrap().to_rgba8();
            for px in out.pixels().filter(|p| p.0[3] > 16) {
                assert!(px.0[..3].iter().all(|&c| c >= 245), "{px:?}");
            }
        }

        #[test]
        fn luma_alpha_is_widened_to_rgba() {
            let img = DynamicImage::ImageLumaA8(image::ImageBuffer::from_pixel(6, 6, LumaA([90, 128])));
            let out = fast_resize(&img, 3, 3, ResampleFilter::Lanczos).unwrap();
            assert!(matches!(out, DynamicImage::ImageRgba8(_)));
        }

        #[test]
        fn zero_target_is_resize_error() {
            let err =
                fast_resize(&create_test_image(4, 4), 0, 3, ResampleFilter::Linear).unwrap_err();
            assert_eq!(err.target_dims, (0, 3));
            assert!(matches!(
                err.into_engine_error(),
                EngineError::ResizeFailed { .. }
            ));
        }
    }
}
