// src/engine/capacity.rs
//
// Capacity search: re-encode an image until its byte size lands in
// [target, target + tolerance].
//
// The encoder sits behind `EncodeProbe` so the search itself is pure control
// flow over observed sizes. Every parameter choice depends only on earlier
// attempts, which makes a search reproducible for the same input.

use crate::config::CapacityConfig;
use crate::engine::common::EngineResult;
use crate::engine::padding;
use crate::engine::pipeline::{fast_resize, ResizeError};
use crate::error::EngineError;
use crate::ops::{OutputFormat, ResampleFilter};
use image::DynamicImage;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;
/// Bracket width at which binary search hands over to a linear sweep
pub const LINEAR_PROBE_WINDOW: u8 = 4;

/// One encode produced by a probe.
#[derive(Debug, Clone)]
pub struct Probe {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Encoder seen by the search.
pub trait EncodeProbe {
    /// Lossy probes expose a quality knob; lossless ones ignore `quality`.
    fn is_lossy(&self) -> bool;

    fn source_dimensions(&self) -> (u32, u32);

    fn encode(&mut self, scale: f64, quality: u8) -> EngineResult<Probe>;

    /// Grow `bytes` to `target` with container filler, if the format allows it.
    fn pad(&self, bytes: &[u8], target: u64) -> Option<Vec<u8>>;
}

/// Probe backed by the real encoders. The resized image for the last scale
/// is kept so quality sweeps at one scale resize only once.
pub struct ImageProbe<'a> {
    image: &'a DynamicImage,
    format: OutputFormat,
    filter: ResampleFilter,
    scaled: Option<((u32, u32), DynamicImage)>,
}

impl<'a> ImageProbe<'a> {
    pub fn new(image: &'a DynamicImage, format: OutputFormat) -> Self {
        Self {
            image,
            format,
            filter: ResampleFilter::Lanczos,
            scaled: None,
        }
    }

    fn dimensions_at(&self, scale: f64) -> (u32, u32) {
        let (w, h) = (self.image.width(), self.image.height());
        if scale >= 1.0 {
            return (w, h);
        }
        (
            ((w as f64 * scale).round() as u32).max(1),
            ((h as f64 * scale).round() as u32).max(1),
        )
    }

    fn image_at(&mut self, scale: f64) -> EngineResult<&DynamicImage> {
        let dims = self.dimensions_at(scale);
        if dims == (self.image.width(), self.image.height()) {
            return Ok(self.image);
        }
        let cached = matches!(&self.scaled, Some((d, _)) if *d == dims);
        if !cached {
            let resized = fast_resize(self.image, dims.0, dims.1, self.filter)
                .map_err(ResizeError::into_engine_error)?;
            self.scaled = Some((dims, resized));
        }
        match &self.scaled {
            Some((_, img)) => Ok(img),
            None => Err(EngineError::processing_failure("capacity", "scaled image missing")),
        }
    }
}

impl EncodeProbe for ImageProbe<'_> {
    fn is_lossy(&self) -> bool {
        self.format.is_lossy()
    }

    fn source_dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    fn encode(&mut self, scale: f64, quality: u8) -> EngineResult<Probe> {
        let format = self.format.with_quality(quality);
        let img = self.image_at(scale)?;
        let (width, height) = (img.width(), img.height());
        let bytes = crate::engine::encoder::encode(img, format)?;
        Ok(Probe {
            bytes,
            width,
            height,
        })
    }

    fn pad(&self, bytes: &[u8], target: u64) -> Option<Vec<u8>> {
        padding::pad_to_size(bytes, self.format.image_format(), target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityRequest {
    pub path: PathBuf,
    pub target_bytes: u64,
    pub tolerance_bytes: u64,
}

impl CapacityRequest {
    pub fn new(path: impl Into<PathBuf>, target_bytes: u64, config: &CapacityConfig) -> Self {
        Self {
            path: path.into(),
            target_bytes,
            tolerance_bytes: config.tolerance_for(target_bytes),
        }
    }

    pub fn range(&self) -> RangeInclusive<u64> {
        self.target_bytes..=self.target_bytes.saturating_add(self.tolerance_bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeAttempt {
    pub quality: u8,
    pub scale: f64,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityStatus {
    /// An encode landed in range
    Reached,
    /// An encode below the target was grown with container filler
    Padded,
    /// The original bytes were already in range
    AlreadySatisfied,
    /// Smaller than the target and the container cannot be padded
    UnreachableUpward,
}

#[derive(Debug, Clone)]
pub struct CapacityOutcome {
    pub bytes: Vec<u8>,
    pub status: CapacityStatus,
    pub attempts: Vec<EncodeAttempt>,
    pub width: u32,
    pub height: u32,
}

enum Verdict {
    Hit(Probe),
    Above,
    Below,
}

struct Search<'a, P: EncodeProbe> {
    probe: &'a mut P,
    config: &'a CapacityConfig,
    range: RangeInclusive<u64>,
    attempts: Vec<EncodeAttempt>,
    /// Largest encode under the target
    best_below: Option<Probe>,
}

impl<P: EncodeProbe> Search<'_, P> {
    fn budget_left(&self) -> bool {
        (self.attempts.len() as u32) < self.config.max_attempts
    }

    /// `None` once the attempt budget is spent.
    fn attempt(&mut self, scale: f64, quality: u8) -> EngineResult<Option<Verdict>> {
        if !self.budget_left() {
            return Ok(None);
        }
        let started = Instant::now();
        let probe = self.probe.encode(scale, quality)?;
        let size = probe.bytes.len() as u64;
        self.attempts.push(EncodeAttempt {
            quality,
            scale,
            width: probe.width,
            height: probe.height,
            size,
            elapsed: started.elapsed(),
        });
        debug!(
            target: "decolgen::capacity",
            attempt = self.attempts.len(),
            quality,
            scale,
            width = probe.width,
            height = probe.height,
            size,
            target = *self.range.start(),
            "encode attempt"
        );

        let verdict = if self.range.contains(&size) {
            Verdict::Hit(probe)
        } else if size > *self.range.end() {
            Verdict::Above
        } else {
            let larger = self
                .best_below
                .as_ref()
                .is_none_or(|best| best.bytes.len() < probe.bytes.len());
            if larger {
                self.best_below = Some(probe);
            }
            Verdict::Below
        };
        Ok(Some(verdict))
    }

    fn closest(&self) -> Option<u64> {
        let (lo, hi) = (*self.range.start(), *self.range.end());
        self.attempts
            .iter()
            .map(|a| a.size)
            .min_by_key(|&size| if size < lo { lo - size } else { size.saturating_sub(hi) })
    }

    /// Quality search at one scale. `Some(probe)` on a hit; `None` when this
    /// scale has no hit (or the budget ran out).
    fn search_quality(&mut self, scale: f64) -> EngineResult<ScaleResult> {
        // Even the lowest quality is too big: only a smaller scale can help
        match self.attempt(scale, MIN_QUALITY)? {
            None => return Ok(ScaleResult::Exhausted),
            Some(Verdict::Hit(p)) => return Ok(ScaleResult::Hit(p)),
            Some(Verdict::Above) => return Ok(ScaleResult::TooLarge),
            Some(Verdict::Below) => {}
        }

        // lo is known below, hi is known above (MAX_QUALITY + 1 is virtual)
        let mut lo = MIN_QUALITY;
        let mut hi = MAX_QUALITY + 1;
        while hi - lo > LINEAR_PROBE_WINDOW {
            let mid = lo + (hi - lo) / 2;
            match self.attempt(scale, mid)? {
                None => return Ok(ScaleResult::Exhausted),
                Some(Verdict::Hit(p)) => return Ok(ScaleResult::Hit(p)),
                Some(Verdict::Below) => lo = mid,
                Some(Verdict::Above) => hi = mid,
            }
        }

        // Encoders are not strictly monotonic in quality; sweep the window
        for quality in (lo + 1..hi).rev() {
            match self.attempt(scale, quality)? {
                None => return Ok(ScaleResult::Exhausted),
                Some(Verdict::Hit(p)) => return Ok(ScaleResult::Hit(p)),
                Some(Verdict::Below) | Some(Verdict::Above) => {}
            }
        }
        Ok(ScaleResult::Gap)
    }

    fn run_lossy(&mut self) -> EngineResult<Option<Probe>> {
        let mut scale = 1.0;
        loop {
            match self.search_quality(scale)? {
                ScaleResult::Hit(p) => return Ok(Some(p)),
                ScaleResult::Exhausted => return Ok(None),
                ScaleResult::Gap if self.config.pad_to_target && self.best_below.is_some() => {
                    return Ok(None);
                }
                ScaleResult::Gap | ScaleResult::TooLarge => {}
            }
            if self.at_smallest_size() {
                return Ok(None);
            }
            scale = next_scale(scale, self.config);
        }
    }

    fn run_lossless(&mut self) -> EngineResult<Option<Probe>> {
        // Shrink until an encode falls below the range, then bisect the scale
        let mut above = None;
        let mut scale = 1.0;
        let below = loop {
            match self.attempt(scale, MAX_QUALITY)? {
                None => return Ok(None),
                Some(Verdict::Hit(p)) => return Ok(Some(p)),
                Some(Verdict::Below) => break scale,
                Some(Verdict::Above) => above = Some(scale),
            }
            if self.at_smallest_size() {
                return Ok(None);
            }
            scale = next_scale(scale, self.config);
        };
        let Some(mut above) = above else {
            return Ok(None);
        };

        let mut below = below;
        let (src_w, src_h) = self.probe.source_dimensions();
        while distinct_sizes(src_w, src_h, below, above) {
            let mid = (below + above) / 2.0;
            match self.attempt(mid, MAX_QUALITY)? {
                None => return Ok(None),
                Some(Verdict::Hit(p)) => return Ok(Some(p)),
                Some(Verdict::Below) => below = mid,
                Some(Verdict::Above) => above = mid,
            }
        }
        Ok(None)
    }

    fn at_smallest_size(&self) -> bool {
        self.attempts
            .last()
            .is_some_and(|a| (a.width <= 1 && a.height <= 1) || a.scale <= self.config.min_scale)
    }
}

enum ScaleResult {
    Hit(Probe),
    /// Lowest quality is still above the range
    TooLarge,
    /// The range falls between two adjacent qualities
    Gap,
    Exhausted,
}

fn next_scale(scale: f64, config: &CapacityConfig) -> f64 {
    (scale * config.scale_decay).max(config.min_scale)
}

/// Whether two scales still map to different pixel sizes.
fn distinct_sizes(src_w: u32, src_h: u32, a: f64, b: f64) -> bool {
    let px = |s: f64, n: u32| ((n as f64 * s).round() as u32).max(1);
    px(a, src_w) != px(b, src_w) || px(a, src_h) != px(b, src_h)
}

/// Search for an encode whose size lands in the request's range.
///
/// `original` is the file as it is on disk; it decides the upward cases and
/// is returned untouched when already in range.
pub fn search<P: EncodeProbe>(
    original: &[u8],
    request: &CapacityRequest,
    probe: &mut P,
    config: &CapacityConfig,
) -> EngineResult<CapacityOutcome> {
    let range = request.range();
    let original_size = original.len() as u64;
    let (src_w, src_h) = probe.source_dimensions();

    if range.contains(&original_size) {
        info!(
            target: "decolgen::capacity",
            path = %request.path.display(),
            size = original_size,
            "original already within capacity"
        );
        return Ok(CapacityOutcome {
            bytes: original.to_vec(),
            status: CapacityStatus::AlreadySatisfied,
            attempts: Vec::new(),
            width: src_w,
            height: src_h,
        });
    }

    if original_size < request.target_bytes {
        let padded = config
            .pad_to_target
            .then(|| probe.pad(original, request.target_bytes))
            .flatten()
            .filter(|p| range.contains(&(p.len() as u64)));
        let (bytes, status) = match padded {
            Some(bytes) => (bytes, CapacityStatus::Padded),
            None => (original.to_vec(), CapacityStatus::UnreachableUpward),
        };
        info!(
            target: "decolgen::capacity",
            path = %request.path.display(),
            size = bytes.len(),
            status = ?status,
            "grew original toward capacity"
        );
        return Ok(CapacityOutcome {
            bytes,
            status,
            attempts: Vec::new(),
            width: src_w,
            height: src_h,
        });
    }

    let lossy = probe.is_lossy();
    let mut search = Search {
        probe,
        config,
        range: range.clone(),
        attempts: Vec::new(),
        best_below: None,
    };
    let hit = if lossy {
        search.run_lossy()?
    } else {
        search.run_lossless()?
    };

    if let Some(p) = hit {
        info!(
            target: "decolgen::capacity",
            path = %request.path.display(),
            size = p.bytes.len(),
            attempts = search.attempts.len(),
            width = p.width,
            height = p.height,
            "capacity reached"
        );
        return Ok(CapacityOutcome {
            bytes: p.bytes,
            status: CapacityStatus::Reached,
            attempts: search.attempts,
            width: p.width,
            height: p.height,
        });
    }

    if config.pad_to_target {
        if let Some(best) = search.best_below.take() {
            let padded = search
                .probe
                .pad(&best.bytes, request.target_bytes)
                .filter(|p| range.contains(&(p.len() as u64)));
            if let Some(bytes) = padded {
                info!(
                    target: "decolgen::capacity",
                    path = %request.path.display(),
                    encoded = best.bytes.len(),
                    size = bytes.len(),
                    attempts = search.attempts.len(),
                    "capacity reached with padding"
                );
                return Ok(CapacityOutcome {
                    bytes,
                    status: CapacityStatus::Padded,
                    attempts: search.attempts,
                    width: best.width,
                    height: best.height,
                });
            }
        }
    }

    let closest = search.closest();
    let attempts = search.attempts.len() as u32;
    info!(
        target: "decolgen::capacity",
        path = %request.path.display(),
        target = request.target_bytes,
        closest = ?closest,
        attempts,
        "capacity unreachable"
    );
    Err(EngineError::capacity_unreachable(
        request.target_bytes,
        request.tolerance_bytes,
        closest,
        attempts,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic probe: size is any function of (scale, quality).
    struct CurveProbe<F: Fn(f64, u8) -> u64> {
        lossy: bool,
        paddable: bool,
        dims: (u32, u32),
        curve: F,
    }

    impl<F: Fn(f64, u8) -> u64> EncodeProbe for CurveProbe<F> {
        fn is_lossy(&self) -> bool {
            self.lossy
        }

        fn source_dimensions(&self) -> (u32, u32) {
            self.dims
        }

        fn encode(&mut self, scale: f64, quality: u8) -> EngineResult<Probe> {
            let size = (self.curve)(scale, quality) as usize;
            let px = |n: u32| ((n as f64 * scale).round() as u32).max(1);
            Ok(Probe {
                bytes: vec![0; size],
                width: px(self.dims.0),
                height: px(self.dims.1),
            })
        }

        fn pad(&self, bytes: &[u8], target: u64) -> Option<Vec<u8>> {
            if !self.paddable {
                return None;
            }
            let mut out = bytes.to_vec();
            out.resize(target as usize, 0);
            Some(out)
        }
    }

    fn lossy<F: Fn(f64, u8) -> u64>(curve: F) -> CurveProbe<F> {
        CurveProbe {
            lossy: true,
            paddable: true,
            dims: (1000, 800),
            curve,
        }
    }

    fn request(target: u64, tolerance: u64) -> CapacityRequest {
        CapacityRequest {
            path: PathBuf::from("photo.jpg"),
            target_bytes: target,
            tolerance_bytes: tolerance,
        }
    }

    fn linear_curve(scale: f64, quality: u8) -> u64 {
        (2_000.0 * quality as f64 * scale * scale) as u64 + 500
    }

    mod range_tests {
        use super::*;

        #[test]
        fn range_is_inclusive() {
            let req = request(1000, 20);
            assert!(req.range().contains(&1000));
            assert!(req.range().contains(&1020));
            assert!(!req.range().contains(&1021));
        }

        #[test]
        fn tolerance_comes_from_config() {
            let config = CapacityConfig::default();
            let req = CapacityRequest::new("a.png", 1_000_000, &config);
            assert_eq!(req.tolerance_bytes, 20_000);
            let req = CapacityRequest::new("a.png", 1_000, &config);
            assert_eq!(req.tolerance_bytes, 256);
        }
    }

    mod upward_tests {
        use super::*;

        #[test]
        fn original_in_range_is_returned_unchanged() {
            let original = vec![7u8; 1010];
            let mut probe = lossy(linear_curve);
            let out = search(&original, &request(1000, 20), &mut probe, &CapacityConfig::default())
                .unwrap();
            assert_eq!(out.status, CapacityStatus::AlreadySatisfied);
            assert_eq!(out.bytes, original);
            assert!(out.attempts.is_empty());
        }

        #[test]
        fn small_original_is_padded_to_target() {
            let original = vec![7u8; 300];
            let mut probe = lossy(linear_curve);
            let out = search(&original, &request(1000, 20), &mut probe, &CapacityConfig::default())
                .unwrap();
            assert_eq!(out.status, CapacityStatus::Padded);
            assert_eq!(out.bytes.len(), 1000);
            assert_eq!(&out.bytes[..300], &original[..]);
        }

        #[test]
        fn small_original_without_padding_is_unreachable_upward() {
            let original = vec![7u8; 300];
            let mut probe = lossy(linear_curve);
            probe.paddable = false;
            let out = search(&original, &request(1000, 20), &mut probe, &CapacityConfig::default())
                .unwrap();
            assert_eq!(out.status, CapacityStatus::UnreachableUpward);
            assert_eq!(out.bytes, original);
        }

        #[test]
        fn padding_disabled_in_config() {
            let config = CapacityConfig {
                pad_to_target: false,
                ..Default::default()
            };
            let mut probe = lossy(linear_curve);
            let out = search(&[1u8; 10], &request(1000, 20), &mut probe, &config).unwrap();
            assert_eq!(out.status, CapacityStatus::UnreachableUpward);
        }
    }

    mod downward_tests {
        use super::*;

        #[test]
        fn quality_search_hits_at_full_scale() {
            let original = vec![0u8; 1_000_000];
            let mut probe = lossy(linear_curve);
            let req = request(100_000, 2_000);
            let out = search(&original, &req, &mut probe, &CapacityConfig::default()).unwrap();
            assert_eq!(out.status, CapacityStatus::Reached);
            assert!(req.range().contains(&(out.bytes.len() as u64)));
            assert_eq!((out.width, out.height), (1000, 800));
            assert!(out.attempts.len() <= 16);
            assert!(out.attempts.iter().all(|a| a.scale == 1.0));
        }

        #[test]
        fn lowest_quality_too_big_moves_to_smaller_scale() {
            // q=1 at full scale is 50_500 bytes; target needs a smaller image
            let curve = |scale: f64, q: u8| (50_000.0 * scale * scale) as u64 + 100 * q as u64 + 500;
            let mut probe = lossy(curve);
            let req = request(20_000, 400);
            let out = search(&[0u8; 500_000], &req, &mut probe, &CapacityConfig::default()).unwrap();
            assert!(req.range().contains(&(out.bytes.len() as u64)));
            assert!(out.width < 1000);
        }

        #[test]
        fn non_monotonic_curve_is_handled() {
            // Sizes wobble by quality parity; the linear sweep must still find a hit
            let curve = |_scale: f64, q: u8| {
                let base = 1_000 * q as u64;
                if q % 2 == 0 { base + 1_500 } else { base }
            };
            let mut probe = lossy(curve);
            let req = request(61_200, 300);
            let out = search(&[0u8; 200_000], &req, &mut probe, &CapacityConfig::default()).unwrap();
            assert!(req.range().contains(&(out.bytes.len() as u64)));
            assert_eq!(out.status, CapacityStatus::Reached);
        }

        #[test]
        fn gap_between_qualities_pads_best_below() {
            // Steps of 10_000 per quality point; tolerance far smaller
            let curve = |_scale: f64, q: u8| 10_000 * q as u64;
            let mut probe = lossy(curve);
            let req = request(455_000, 1_000);
            let out = search(&[0u8; 2_000_000], &req, &mut probe, &CapacityConfig::default()).unwrap();
            assert_eq!(out.status, CapacityStatus::Padded);
            assert_eq!(out.bytes.len(), 455_000);
            let largest_below = out
                .attempts
                .iter()
                .filter(|a| a.size < 455_000)
                .map(|a| a.size)
                .max()
                .unwrap();
            assert_eq!(largest_below, 450_000);
        }

        #[test]
        fn budget_exhaustion_reports_closest() {
            let curve = |_scale: f64, q: u8| 10_000 * q as u64;
            let mut probe = lossy(curve);
            probe.paddable = false;
            let config = CapacityConfig {
                max_attempts: 3,
                ..Default::default()
            };
            let err = search(&[0u8; 2_000_000], &request(455_000, 1_000), &mut probe, &config)
                .unwrap_err();
            match err {
                EngineError::CapacityUnreachable {
                    target,
                    attempts,
                    closest,
                    ..
                } => {
                    assert_eq!(target, 455_000);
                    assert_eq!(attempts, 3);
                    assert!(closest.is_some());
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn search_is_deterministic() {
            let run = || {
                let mut probe = lossy(linear_curve);
                let out = search(
                    &[0u8; 1_000_000],
                    &request(77_777, 500),
                    &mut probe,
                    &CapacityConfig::default(),
                )
                .unwrap();
                out.attempts
                    .iter()
                    .map(|a| (a.quality, a.scale.to_bits(), a.size))
                    .collect::<Vec<_>>()
            };
            assert_eq!(run(), run());
        }

        #[test]
        fn lossless_bisects_scale() {
            let curve = |scale: f64, _q: u8| (400_000.0 * scale * scale) as u64;
            let mut probe = CurveProbe {
                lossy: false,
                paddable: true,
                dims: (2000, 1500),
                curve,
            };
            let req = request(150_000, 3_000);
            let out = search(&[0u8; 500_000], &req, &mut probe, &CapacityConfig::default()).unwrap();
            assert!(req.range().contains(&(out.bytes.len() as u64)));
            assert!(out.width < 2000);
            assert!(out.attempts.iter().all(|a| a.quality == MAX_QUALITY));
        }
    }

    mod image_probe_tests {
        use super::*;
        use image::RgbImage;

        fn noise(w: u32, h: u32) -> DynamicImage {
            let mut state = 0x2545_f491_u32;
            DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let base = ((x + y) * 2 % 256) as u8;
                image::Rgb([base.wrapping_add(state as u8 % 48), base, (state >> 8) as u8])
            }))
        }

        fn scaled_ptr(probe: &ImageProbe<'_>) -> Option<*const u8> {
            probe.scaled.as_ref().map(|(_, img)| img.as_bytes().as_ptr())
        }

        #[test]
        fn probe_reuses_scaled_image_and_reports_dims() {
            let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 32, |x, y| {
                image::Rgb([(x * 4) as u8, (y * 8) as u8, 90])
            }));
            let mut probe = ImageProbe::new(&img, OutputFormat::Jpeg { quality: 80 });
            assert!(probe.is_lossy());
            let full = probe.encode(1.0, 80).unwrap();
            assert_eq!((full.width, full.height), (64, 32));
            assert!(scaled_ptr(&probe).is_none());

            let half = probe.encode(0.5, 80).unwrap();
            assert_eq!((half.width, half.height), (32, 16));
            let resized = scaled_ptr(&probe);
            assert!(resized.is_some());

            let half_low = probe.encode(0.5, 10).unwrap();
            assert_eq!((half_low.width, half_low.height), (32, 16));
            assert_eq!(scaled_ptr(&probe), resized);

            let quarter = probe.encode(0.25, 10).unwrap();
            assert_eq!((quarter.width, quarter.height), (16, 8));
            assert_ne!(scaled_ptr(&probe), resized);
        }

        #[test]
        fn probe_size_follows_quality_on_large_image() {
            let img = noise(256, 256);
            let mut probe = ImageProbe::new(&img, OutputFormat::Jpeg { quality: 80 });
            let low = probe.encode(1.0, 10).unwrap().bytes.len();
            let high = probe.encode(1.0, 90).unwrap().bytes.len();
            assert!(low < high, "{low} vs {high}");
        }

        #[test]
        fn search_over_real_encoder_curve_lands_in_range() {
            // Small images make mozjpeg sizes wobble with quality
            let img = noise(64, 48);
            let mut probe = ImageProbe::new(&img, OutputFormat::Jpeg { quality: 80 });
            let curve: Vec<u64> = (MIN_QUALITY..=MAX_QUALITY)
                .map(|q| probe.encode(1.0, q).unwrap().bytes.len() as u64)
                .collect();
            let size_at = |q: u8| curve[(q - MIN_QUALITY) as usize];
            let floor = size_at(MIN_QUALITY) + 64;
            let largest = *curve.iter().max().unwrap();
            assert!(largest > floor, "curve too flat: {curve:?}");

            // Prefer a size just after a dip in the curve
            let target = (MIN_QUALITY + 1..=MAX_QUALITY)
                .find(|&q| size_at(q) < size_at(q - 1) && size_at(q) > floor)
                .map(size_at)
                .unwrap_or(largest);

            let config = CapacityConfig {
                tolerance_ratio: 0.0,
                min_tolerance_bytes: 16,
                ..Default::default()
            };
            let req = request(target, 16);
            let original = vec![0u8; largest as usize * 2];
            let mut probe = ImageProbe::new(&img, OutputFormat::Jpeg { quality: 80 });
            let out = search(&original, &req, &mut probe, &config).unwrap();

            assert!(
                req.range().contains(&(out.bytes.len() as u64)),
                "{} not in {:?}; curve {curve:?}",
                out.bytes.len(),
                req.range()
            );
            assert!(matches!(
                out.status,
                CapacityStatus::Reached | CapacityStatus::Padded
            ));
            assert!(out.attempts.len() <= config.max_attempts as usize);
            for attempt in &out.attempts {
                assert_eq!(attempt.scale, 1.0);
                assert_eq!(attempt.size, size_at(attempt.quality));
            }
            let (decoded, format) = crate::engine::decode_image(&out.bytes).unwrap();
            assert_eq!(format, image::ImageFormat::Jpeg);
            assert_eq!((decoded.width(), decoded.height()), (64, 48));
        }

        #[test]
        fn png_probe_is_lossless_and_pads() {
            let img = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
            let mut probe = ImageProbe::new(&img, OutputFormat::Png);
            assert!(!probe.is_lossy());
            let p = probe.encode(1.0, 100).unwrap();
            let padded = probe.pad(&p.bytes, p.bytes.len() as u64 + 100).unwrap();
            assert_eq!(padded.len(), p.bytes.len() + 100);
        }
    }
}
