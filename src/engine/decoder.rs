// src/engine/decoder.rs
//
// Input decoding. The container is sniffed from magic bytes, then routed:
// JPEG to mozjpeg, PNG to zune-png, still WebP to libwebp, everything else
// (GIF, BMP, TIFF, ICO, animated WebP) to the image crate.
//
// Every path checks the header dimensions before the pixel buffer exists.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::EngineError;
use image::{DynamicImage, ImageBuffer, ImageFormat, Pixel};
use mozjpeg::Decompress;
use tracing::debug;
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_core::result::DecodingResult;
use zune_png::PngDecoder;

pub const SUPPORTED_INPUT_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
    ImageFormat::Ico,
];

/// Rejects images past `MAX_DIMENSION` on either side or `MAX_PIXELS` total.
pub fn check_dimensions(width: u32, height: u32) -> EngineResult<()> {
    let longest = width.max(height);
    if longest > MAX_DIMENSION {
        return Err(EngineError::dimension_exceeds_limit(longest, MAX_DIMENSION));
    }
    let area = u64::from(width) * u64::from(height);
    if area > MAX_PIXELS {
        return Err(EngineError::pixel_count_exceeds_limit(area, MAX_PIXELS));
    }
    Ok(())
}

/// Same as [`check_dimensions`] for decoders that report `usize`.
fn check_dimensions_usize(width: usize, height: usize) -> EngineResult<(u32, u32)> {
    let clamp = |v: usize| u32::try_from(v).unwrap_or(u32::MAX);
    let (w, h) = (clamp(width), clamp(height));
    check_dimensions(w, h)?;
    Ok((w, h))
}

pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Format a file extension claims to be. Case-insensitive.
pub fn format_from_extension(ext: &str) -> Option<ImageFormat> {
    ImageFormat::from_extension(ext)
}

/// Decode whatever the magic bytes say this is.
pub fn decode_image(bytes: &[u8]) -> EngineResult<(DynamicImage, ImageFormat)> {
    let format = detect_format(bytes)
        .ok_or_else(|| EngineError::unsupported_format("unrecognized file signature"))?;
    if !SUPPORTED_INPUT_FORMATS.contains(&format) {
        return Err(EngineError::unsupported_format(format!("{format:?} input")));
    }
    let img = match format {
        ImageFormat::Jpeg => run_with_panic_policy("decode:jpeg", || jpeg(bytes))?,
        ImageFormat::Png => run_with_panic_policy("decode:png", || png(bytes))?,
        ImageFormat::WebP => webp_still_or_animated(bytes)?,
        other => decode_with_image_crate(bytes, other)?,
    };
    Ok((img, format))
}

/// Decode with the format the caller believes the file is in.
///
/// Content wins over the claim. Renamed files are common on desktops, so a
/// mismatch is only logged.
pub fn decode_declared(
    bytes: &[u8],
    declared: Option<ImageFormat>,
) -> EngineResult<(DynamicImage, ImageFormat)> {
    let (img, detected) = decode_image(bytes)?;
    match declared {
        Some(claimed) if claimed != detected => debug!(
            target: "decolgen::decoder",
            ?claimed,
            ?detected,
            "extension does not match content"
        ),
        _ => {}
    }
    Ok((img, detected))
}

pub fn decode_with_image_crate(bytes: &[u8], format: ImageFormat) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        let img = image::load_from_memory_with_format(bytes, format).map_err(|e| match e {
            image::ImageError::Unsupported(why) => {
                EngineError::unsupported_format(format!("{format:?}: {why}"))
            }
            other => EngineError::corrupt_data(format!("{format:?}: {other}")),
        })?;
        check_dimensions(img.width(), img.height())?;
        Ok(img)
    })
}

fn jpeg(bytes: &[u8]) -> EngineResult<DynamicImage> {
    // libjpeg happily pads a truncated stream with grey; refuse it instead
    let has_eoi = bytes.windows(2).any(|w| w == [0xFF, 0xD9]);
    if !has_eoi {
        return Err(EngineError::corrupt_data("jpeg: stream ends before EOI"));
    }
    let corrupt = |stage: &str, e: std::io::Error| {
        EngineError::corrupt_data(format!("jpeg: {stage}: {e}"))
    };

    let mut reader = Decompress::new_mem(bytes)
        .map_err(|e| corrupt("header", e))?
        .rgb()
        .map_err(|e| corrupt("rgb output", e))?;
    let (w, h) = check_dimensions_usize(reader.width(), reader.height())?;

    let rows: Vec<[u8; 3]> = reader.read_scanlines().map_err(|e| corrupt("scanlines", e))?;
    let flat = rows.into_iter().flatten().collect();
    let buf = from_raw::<image::Rgb<u8>>(w, h, flat, "jpeg")?;
    Ok(DynamicImage::ImageRgb8(buf))
}

fn png(bytes: &[u8]) -> EngineResult<DynamicImage> {
    let options = DecoderOptions::default().png_set_strip_to_8bit(true);
    let mut reader = PngDecoder::new_with_options(ZCursor::new(bytes), options);
    reader
        .decode_headers()
        .map_err(|e| EngineError::corrupt_data(format!("png: header: {e}")))?;
    let (w, h) = reader
        .dimensions()
        .ok_or_else(|| EngineError::corrupt_data("png: no IHDR"))?;
    let (w, h) = check_dimensions_usize(w, h)?;
    let colorspace = reader
        .colorspace()
        .ok_or_else(|| EngineError::corrupt_data("png: no colorspace"))?;

    let DecodingResult::U8(raw) = reader
        .decode()
        .map_err(|e| EngineError::corrupt_data(format!("png: {e}")))?
    else {
        return Err(EngineError::corrupt_data("png: samples wider than 8 bits"));
    };

    Ok(match colorspace {
        ColorSpace::Luma => DynamicImage::ImageLuma8(from_raw(w, h, raw, "png")?),
        ColorSpace::LumaA => DynamicImage::ImageLumaA8(from_raw(w, h, raw, "png")?),
        ColorSpace::RGB => DynamicImage::ImageRgb8(from_raw(w, h, raw, "png")?),
        ColorSpace::RGBA => DynamicImage::ImageRgba8(from_raw(w, h, raw, "png")?),
        other => {
            return Err(EngineError::unsupported_format(format!(
                "png: {other:?} pixels"
            )))
        }
    })
}

fn webp_still_or_animated(bytes: &[u8]) -> EngineResult<DynamicImage> {
    let features = webp::BitstreamFeatures::new(bytes)
        .ok_or_else(|| EngineError::corrupt_data("webp: unreadable VP8 header"))?;
    check_dimensions(features.width(), features.height())?;
    if features.has_animation() {
        // First frame only; libwebp's simple decoder rejects animations
        return decode_with_image_crate(bytes, ImageFormat::WebP);
    }
    run_with_panic_policy("decode:webp", || {
        webp::Decoder::new(bytes)
            .decode()
            .map(|frame| frame.to_image())
            .ok_or_else(|| EngineError::corrupt_data("webp: libwebp could not decode"))
    })
}

fn from_raw<P>(w: u32, h: u32, raw: Vec<u8>, codec: &str) -> EngineResult<ImageBuffer<P, Vec<u8>>>
where
    P: Pixel<Subpixel = u8>,
{
    ImageBuffer::from_raw(w, h, raw).ok_or_else(|| {
        EngineError::corrupt_data(format!("{codec}: pixel data shorter than {w}x{h}"))
    })
}
