#![no_main]

use decolgen_engine::engine::pad_to_size;
use image::ImageFormat;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let format = match data[0] % 6 {
        0 => ImageFormat::Jpeg,
        1 => ImageFormat::Png,
        2 => ImageFormat::WebP,
        3 => ImageFormat::Gif,
        4 => ImageFormat::Bmp,
        _ => ImageFormat::Tiff,
    };
    let extra = u64::from(data[1]) * 300;
    let bytes = &data[2..];
    let target = bytes.len() as u64 + extra;
    if let Some(padded) = pad_to_size(bytes, format, target) {
        assert!(padded.len() as u64 >= target);
    }
});
