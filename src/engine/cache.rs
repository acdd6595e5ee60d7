// src/engine/cache.rs
//
// Decoded source image and the single-entry cache that keeps the current
// file decoded between preview renders.

use crate::config::Limits;
use crate::engine::common::EngineResult;
use crate::engine::decoder::{decode_declared, format_from_extension};
use crate::engine::io::{read_source, FileInfo, SourceFile};
use image::{DynamicImage, ImageFormat};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// A decoded file. Never mutated after load; shared through `Arc`.
#[derive(Debug)]
pub struct SourceImage {
    pub file: SourceFile,
    pub pixels: Arc<DynamicImage>,
    pub format: ImageFormat,
}

impl SourceImage {
    pub fn load(path: &Path, limits: &Limits) -> EngineResult<Self> {
        let file = read_source(path, limits)?;
        let declared = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(format_from_extension);
        let (pixels, format) = decode_declared(file.source.as_bytes(), declared)?;
        Ok(Self {
            file,
            pixels: Arc::new(pixels),
            format,
        })
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn original_bytes(&self) -> &[u8] {
        self.file.source.as_bytes()
    }

    pub fn byte_size(&self) -> u64 {
        self.file.size
    }

    pub fn modified(&self) -> SystemTime {
        self.file.modified
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.pixels.width(), self.pixels.height())
    }

    pub fn file_info(&self) -> FileInfo {
        FileInfo::new(&self.file, self.dimensions())
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    image: Option<Arc<SourceImage>>,
}

/// Holds the most recently opened file, keyed by (path, mtime).
///
/// Every miss takes a generation number before decoding. A finished decode
/// is stored only if no later open has stored already, so a slow decode of
/// an old file never replaces a newer one.
#[derive(Debug, Default)]
pub struct DecodedCache {
    next_generation: AtomicU64,
    slot: RwLock<Slot>,
}

fn matches(img: &SourceImage, path: &Path, modified: Option<SystemTime>) -> bool {
    img.path() == path && Some(img.modified()) == modified
}

impl DecodedCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, path: &Path, modified: Option<SystemTime>) -> Option<Arc<SourceImage>> {
        let slot = self.slot.read();
        slot.image
            .as_ref()
            .filter(|img| matches(img, path, modified))
            .cloned()
    }

    /// Cached image for `path`, decoding it when absent or stale.
    pub fn get_or_load(&self, path: &Path, limits: &Limits) -> EngineResult<Arc<SourceImage>> {
        self.get_or_insert_with(path, || SourceImage::load(path, limits))
    }

    fn get_or_insert_with<F>(&self, path: &Path, load: F) -> EngineResult<Arc<SourceImage>>
    where
        F: FnOnce() -> EngineResult<SourceImage>,
    {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        if let Some(hit) = self.lookup(path, modified) {
            debug!(target: "decolgen::cache", path = %path.display(), "decoded cache hit");
            return Ok(hit);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let loaded = Arc::new(load()?);

        let mut slot = self.slot.write();
        if let Some(current) = slot.image.as_ref() {
            // A racing load of the same file already landed; share it
            if matches(current, loaded.path(), Some(loaded.modified())) {
                return Ok(Arc::clone(current));
            }
        }
        if generation > slot.generation {
            debug!(
                target: "decolgen::cache",
                path = %path.display(),
                generation,
                width = loaded.pixels.width(),
                height = loaded.pixels.height(),
                "decoded cache fill"
            );
            slot.generation = generation;
            slot.image = Some(Arc::clone(&loaded));
        } else {
            debug!(
                target: "decolgen::cache",
                path = %path.display(),
                generation,
                current = slot.generation,
                "newer file already cached; not storing"
            );
        }
        Ok(loaded)
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.slot
            .read()
            .image
            .as_ref()
            .map(|img| img.path().to_path_buf())
    }
}
