#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use decolgen_engine::config::CapacityConfig;
use decolgen_engine::engine::{
    capacity, encode, CapacityRequest, CapacityStatus, ImageProbe,
};
use decolgen_engine::ops::OutputFormat;
use image::{DynamicImage, RgbImage};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    width: u8,
    height: u8,
    format: u8,
    target: u32,
    pixels: Vec<u8>,
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let Ok(input) = Input::arbitrary(&mut unstructured) else {
        return;
    };
    if input.pixels.is_empty() || input.target == 0 {
        return;
    }

    let (w, h) = (u32::from(input.width) + 1, u32::from(input.height) + 1);
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
        let i = ((y * w + x) * 3) as usize;
        let px = |k: usize| input.pixels[(i + k) % input.pixels.len()];
        image::Rgb([px(0), px(1), px(2)])
    }));
    let format = match input.format % 3 {
        0 => OutputFormat::Jpeg { quality: 90 },
        1 => OutputFormat::WebP { quality: 90 },
        _ => OutputFormat::Png,
    };
    let Ok(original) = encode(&img, format) else {
        return;
    };

    let config = CapacityConfig {
        max_attempts: 8,
        ..CapacityConfig::default()
    };
    let target = u64::from(input.target % 200_000) + 1;
    let request = CapacityRequest::new("fuzz", target, &config);
    let mut probe = ImageProbe::new(&img, format);
    if let Ok(outcome) = capacity::search(&original, &request, &mut probe, &config) {
        let size = outcome.bytes.len() as u64;
        match outcome.status {
            CapacityStatus::Reached | CapacityStatus::AlreadySatisfied => {
                assert!(request.range().contains(&size))
            }
            CapacityStatus::Padded => assert!(size >= target),
            CapacityStatus::UnreachableUpward => assert!(size < target),
        }
        assert!(outcome.attempts.len() <= config.max_attempts as usize);
    }
});
