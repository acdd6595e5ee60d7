#![no_main]

use decolgen_engine::engine::decode_declared;
use image::ImageFormat;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // A lying extension must never change the outcome class
    let declared = match data[0] % 4 {
        0 => None,
        1 => Some(ImageFormat::Jpeg),
        2 => Some(ImageFormat::Png),
        _ => Some(ImageFormat::WebP),
    };
    let _ = decode_declared(data, declared);
});
