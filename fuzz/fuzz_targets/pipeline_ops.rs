#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use decolgen_engine::engine::apply;
use decolgen_engine::ops::{AdjustmentSettings, ResampleFilter};
use image::{DynamicImage, RgbaImage};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct SettingsSeed {
    width: u16,
    height: u16,
    filter: u8,
    blur: f32,
    sharpening: f32,
    gamma: f32,
    contrast: f32,
    brightness: f32,
    saturation: f32,
    hue: f32,
    invert: bool,
}

// Tail bytes become the pixels; the first two pick a size up to 64x64
fn canvas_from(tail: &[u8]) -> DynamicImage {
    let side = |i: usize| u32::from(tail.get(i).copied().unwrap_or(1) % 64) + 1;
    let (w, h) = (side(0), side(1));
    let fill: Vec<u8> = tail.iter().copied().cycle().take((w * h * 4) as usize).collect();
    match RgbaImage::from_raw(w, h, fill) {
        Some(buf) => DynamicImage::ImageRgba8(buf),
        None => DynamicImage::ImageRgba8(RgbaImage::new(1, 1)),
    }
}

fn seed_to_settings(seed: SettingsSeed) -> AdjustmentSettings {
    let filter = match seed.filter % 5 {
        0 => ResampleFilter::None,
        1 => ResampleFilter::NearestNeighbor,
        2 => ResampleFilter::Linear,
        3 => ResampleFilter::CatmullRom,
        _ => ResampleFilter::Lanczos,
    };
    AdjustmentSettings {
        // Keep outputs small enough for the fuzzer to stay fast
        width: u32::from(seed.width % 256),
        height: u32::from(seed.height % 256),
        filter,
        blur: f64::from(seed.blur),
        sharpening: f64::from(seed.sharpening),
        gamma: f64::from(seed.gamma),
        contrast: f64::from(seed.contrast),
        brightness: f64::from(seed.brightness),
        saturation: f64::from(seed.saturation),
        hue: f64::from(seed.hue),
        invert: seed.invert,
    }
}

fuzz_target!(|data: &[u8]| {
    let mut input = Unstructured::new(data);
    let Ok(seed) = SettingsSeed::arbitrary(&mut input) else {
        return;
    };
    let tail = input.take_rest();
    if tail.is_empty() {
        return;
    }

    let img = image::load_from_memory(tail).unwrap_or_else(|_| canvas_from(tail));
    let settings = seed_to_settings(seed);
    // Errors are fine; only panics and memory issues are interesting
    if let Ok(out) = apply(&img, &settings) {
        let (w, h) = settings.normalized().target_dimensions(img.width(), img.height());
        assert_eq!((out.width(), out.height()), (w, h));
    }
});
