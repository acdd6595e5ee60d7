// src/engine/filters.rs
//
// Pixel filters. Blur and sharpen are spatial and go through
// `image::imageops`; tone, color and invert are per-pixel over interleaved
// 8-bit buffers (3 or 4 channels), parallel on the current rayon pool.
// The tone curve follows the desktop app's gamma/contrast/brightness
// percentages, which `DynamicImage::adjust_contrast`/`brighten` do not.

use image::{imageops, ImageBuffer, Pixel};
use rayon::prelude::*;

#[inline]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Gaussian blur via `imageops::blur`. Non-positive sigma is a copy.
pub fn gaussian_blur<P>(img: &ImageBuffer<P, Vec<u8>>, sigma: f64) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if sigma <= 0.0 || img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    imageops::blur(img, sigma as f32)
}

/// Unsharp mask with unit amount and no threshold: `2 * src - blur(src)`.
pub fn sharpen<P>(img: &ImageBuffer<P, Vec<u8>>, sigma: f64) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if sigma <= 0.0 || img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    imageops::unsharpen(img, sigma as f32, 0)
}

/// Per-channel lookup table for gamma, then contrast, then brightness.
///
/// Gamma: `255 * (v/255)^(1/gamma)`
/// Contrast: `((v/255 - 0.5) * (1 + c/100) + 0.5) * 255`
/// Brightness: `v + 255 * b/100`
/// Each step is clamped to the channel range before the next one.
pub fn tone_lut(gamma: f64, contrast: f64, brightness: f64) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let inv_gamma = 1.0 / gamma;
    let contrast_factor = 1.0 + contrast / 100.0;
    let brightness_shift = 255.0 * brightness / 100.0;
    for (i, slot) in lut.iter_mut().enumerate() {
        let mut v = i as f64;
        if gamma != 1.0 {
            v = (255.0 * (v / 255.0).powf(inv_gamma)).clamp(0.0, 255.0);
        }
        if contrast != 0.0 {
            v = (((v / 255.0 - 0.5) * contrast_factor + 0.5) * 255.0).clamp(0.0, 255.0);
        }
        if brightness != 0.0 {
            v = (v + brightness_shift).clamp(0.0, 255.0);
        }
        *slot = v.round() as u8;
    }
    lut
}

/// Apply a LUT to color channels; alpha is left alone.
pub fn apply_lut(buf: &mut [u8], channels: usize, lut: &[u8; 256]) {
    buf.par_chunks_mut(channels).for_each(|px| {
        for v in px.iter_mut().take(3) {
            *v = lut[*v as usize];
        }
    });
}

/// Saturation (percent) and hue (degrees) adjusted in HSL space.
/// Saturation clamps to [0, 1]; hue wraps around the circle.
pub fn adjust_saturation_hue(buf: &mut [u8], channels: usize, saturation: f64, hue: f64) {
    let sat_factor = (1.0 + saturation / 100.0) as f32;
    let hue_shift = (hue / 360.0) as f32;
    buf.par_chunks_mut(channels).for_each(|px| {
        let (h, s, l) = rgb_to_hsl(
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
        );
        let nh = (h + hue_shift).rem_euclid(1.0);
        let ns = (s * sat_factor).clamp(0.0, 1.0);
        let (r, g, b) = hsl_to_rgb(nh, ns, l);
        px[0] = to_u8(r * 255.0);
        px[1] = to_u8(g * 255.0);
        px[2] = to_u8(b * 255.0);
    });
}

/// Complement color channels; alpha is preserved.
pub fn invert(buf: &mut [u8], channels: usize) {
    buf.par_chunks_mut(channels).for_each(|px| {
        for v in px.iter_mut().take(3) {
            *v = 255 - *v;
        }
    });
}

/// RGB (0..1) → HSL (H: 0..1, S: 0..1, L: 0..1)
pub fn rgb_to_hsl(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if (max - min).abs() < 1e-6 {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };

    let h = if (max - r).abs() < 1e-6 {
        let mut h = (g - b) / d;
        if h < 0.0 {
            h += 6.0;
        }
        h / 6.0
    } else if (max - g).abs() < 1e-6 {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };

    (h, s, l)
}

/// HSL (H: 0..1, S: 0..1, L: 0..1) → RGB (0..1)
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s.abs() < 1e-6 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}
