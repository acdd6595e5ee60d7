// src/engine/padding.rs
//
// Grow an encoded file to an exact byte size without touching its pixels.
//
// - JPEG: COM segments inserted right after SOI
// - PNG: private ancillary `fiLl` chunk before IEND
// - WebP: trailing RIFF chunk, RIFF size updated
// - GIF/BMP/TIFF: filler bytes after the end of the image data
//
// Every filler is ignored by decoders. The result is never smaller than the
// target and overshoots only when the deficit is below the container's
// minimum filler size.

use image::ImageFormat;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_COM: u8 = 0xFE;
/// Marker (2) + length field (2)
const JPEG_SEGMENT_OVERHEAD: usize = 4;
/// The length field counts itself, so payload tops out at 65535 - 2
const JPEG_MAX_PAYLOAD: usize = 65533;

const PNG_IEND_LEN: usize = 12;
/// Length (4) + type (4) + CRC (4)
const PNG_CHUNK_OVERHEAD: usize = 12;
const PNG_FILL_TYPE: &[u8; 4] = b"fiLl";

const RIFF_HEADER_LEN: usize = 12;
const RIFF_CHUNK_OVERHEAD: usize = 8;
const WEBP_FILL_TYPE: &[u8; 4] = b"fiLl";

const FILL_BYTE: u8 = b'a';

/// Smallest number of bytes a filler can add for `format`.
pub fn min_padding(format: ImageFormat) -> Option<usize> {
    match format {
        ImageFormat::Jpeg => Some(JPEG_SEGMENT_OVERHEAD),
        ImageFormat::Png => Some(PNG_CHUNK_OVERHEAD),
        ImageFormat::WebP => Some(RIFF_CHUNK_OVERHEAD),
        ImageFormat::Gif | ImageFormat::Bmp | ImageFormat::Tiff => Some(1),
        _ => None,
    }
}

/// Pad `bytes` so the result is at least `target` bytes long.
///
/// Returns `None` when the container cannot carry filler or the bytes do not
/// look like a well-formed file of that format. Input already at or above the
/// target is returned unchanged.
pub fn pad_to_size(bytes: &[u8], format: ImageFormat, target: u64) -> Option<Vec<u8>> {
    let target = usize::try_from(target).ok()?;
    if bytes.len() >= target {
        return Some(bytes.to_vec());
    }
    let deficit = target - bytes.len();
    match format {
        ImageFormat::Jpeg => pad_jpeg(bytes, deficit),
        ImageFormat::Png => pad_png(bytes, deficit),
        ImageFormat::WebP => pad_webp(bytes, deficit),
        ImageFormat::Gif | ImageFormat::Bmp | ImageFormat::Tiff => {
            let mut out = Vec::with_capacity(target);
            out.extend_from_slice(bytes);
            out.resize(target, FILL_BYTE);
            Some(out)
        }
        _ => None,
    }
}

fn pad_jpeg(bytes: &[u8], deficit: usize) -> Option<Vec<u8>> {
    if !bytes.starts_with(&JPEG_SOI) {
        return None;
    }
    let deficit = deficit.max(JPEG_SEGMENT_OVERHEAD);
    let max_segment = JPEG_MAX_PAYLOAD + JPEG_SEGMENT_OVERHEAD;
    let segments = deficit.div_ceil(max_segment);
    // Spread evenly so no segment falls under the 4-byte minimum
    let base = deficit / segments;
    let extra = deficit % segments;

    let mut out = Vec::with_capacity(bytes.len() + deficit);
    out.extend_from_slice(&JPEG_SOI);
    for i in 0..segments {
        let total = base + usize::from(i < extra);
        let payload = total - JPEG_SEGMENT_OVERHEAD;
        let length = (payload + 2) as u16;
        out.extend_from_slice(&[0xFF, JPEG_COM]);
        out.extend_from_slice(&length.to_be_bytes());
        out.resize(out.len() + payload, FILL_BYTE);
    }
    out.extend_from_slice(&bytes[JPEG_SOI.len()..]);
    Some(out)
}

fn png_crc(chunk_type: &[u8], data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(chunk_type);
    crc.update(data);
    crc.sum()
}

fn pad_png(bytes: &[u8], deficit: usize) -> Option<Vec<u8>> {
    if bytes.len() < 8 + PNG_IEND_LEN {
        return None;
    }
    let iend_at = bytes.len() - PNG_IEND_LEN;
    if &bytes[iend_at + 4..iend_at + 8] != b"IEND" {
        return None;
    }
    let payload_len = deficit.max(PNG_CHUNK_OVERHEAD) - PNG_CHUNK_OVERHEAD;
    let length = u32::try_from(payload_len).ok()?;
    let payload = vec![FILL_BYTE; payload_len];

    let mut out = Vec::with_capacity(bytes.len() + payload_len + PNG_CHUNK_OVERHEAD);
    out.extend_from_slice(&bytes[..iend_at]);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(PNG_FILL_TYPE);
    out.extend_from_slice(&payload);
    out.extend_from_slice(&png_crc(PNG_FILL_TYPE, &payload).to_be_bytes());
    out.extend_from_slice(&bytes[iend_at..]);
    Some(out)
}

fn pad_webp(bytes: &[u8], deficit: usize) -> Option<Vec<u8>> {
    if bytes.len() < RIFF_HEADER_LEN || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
        return None;
    }
    // RIFF chunks are word aligned; an odd deficit rounds up by one byte
    let total = deficit.max(RIFF_CHUNK_OVERHEAD).next_multiple_of(2);
    let payload_len = total - RIFF_CHUNK_OVERHEAD;
    let riff_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let new_riff_size = riff_size.checked_add(u32::try_from(total).ok()?)?;

    let mut out = Vec::with_capacity(bytes.len() + total);
    out.extend_from_slice(&bytes[0..4]);
    out.extend_from_slice(&new_riff_size.to_le_bytes());
    out.extend_from_slice(&bytes[8..]);
    out.extend_from_slice(WEBP_FILL_TYPE);
    out.extend_from_slice(&u32::try_from(payload_len).ok()?.to_le_bytes());
    out.resize(out.len() + payload_len, FILL_BYTE);
    Some(out)
}
