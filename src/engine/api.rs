// src/engine/api.rs
//
// ImageEngine: the request surface the desktop frontend calls.
//
// Every operation runs its pixel work on the worker pool and returns a
// structured error; `Notice::from_outcome` turns a terminal outcome into the
// single notification the UI shows.

use crate::config::EngineConfig;
use crate::engine::cache::{DecodedCache, SourceImage};
use crate::engine::capacity::{self, CapacityRequest, CapacityStatus, EncodeAttempt, ImageProbe};
use crate::engine::common::EngineResult;
use crate::engine::encoder::{self, Effort};
use crate::engine::io::{self, DerivedDestination, FileDialogs, FileResult};
use crate::engine::pipeline;
use crate::engine::pool;
use crate::engine::preview::{PreviewSessions, RenderedResult};
use crate::error::EngineError;
use crate::ops::{AdjustmentSettings, OutputFormat};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Quality used when the capacity search encodes a lossy format; the search
/// overrides it per attempt.
const CAPACITY_START_QUALITY: u8 = 100;

/// The image engine. Cheap to clone; clones share the cache and preview
/// sessions.
#[derive(Clone)]
pub struct ImageEngine {
    config: Arc<EngineConfig>,
    dialogs: Arc<dyn FileDialogs>,
    cache: Arc<DecodedCache>,
    previews: Arc<PreviewSessions>,
}

/// Result of a capacity resize, for callers that want more than the path.
#[derive(Debug, Clone)]
pub struct CapacityReport {
    pub path: PathBuf,
    pub status: CapacityStatus,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub attempts: Vec<EncodeAttempt>,
}

impl ImageEngine {
    pub fn new(config: EngineConfig, dialogs: Arc<dyn FileDialogs>) -> EngineResult<Self> {
        config.validate()?;
        let debounce = Duration::from_millis(config.preview.debounce_ms);
        Ok(Self {
            config: Arc::new(config),
            dialogs,
            cache: Arc::new(DecodedCache::new()),
            previews: Arc::new(PreviewSessions::new(debounce)),
        })
    }

    /// Default configuration, destinations derived from the source name.
    pub fn headless() -> Self {
        let config = EngineConfig::default();
        let debounce = Duration::from_millis(config.preview.debounce_ms);
        Self {
            config: Arc::new(config),
            dialogs: Arc::new(DerivedDestination::new()),
            cache: Arc::new(DecodedCache::new()),
            previews: Arc::new(PreviewSessions::new(debounce)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn previews(&self) -> &PreviewSessions {
        &self.previews
    }

    async fn load(&self, path: &Path) -> EngineResult<Arc<SourceImage>> {
        let cache = Arc::clone(&self.cache);
        let limits = self.config.limits.clone();
        let path = path.to_path_buf();
        pool::spawn("load", move || cache.get_or_load(&path, &limits)).await
    }

    /// Pick a file, load it, and return its metadata with the raw bytes in
    /// base64. Never fails: problems are reported through `status`/`message`.
    pub async fn open_file_dialog(&self) -> FileResult {
        let path = match self.dialogs.pick_source() {
            Ok(Some(path)) => path,
            Ok(None) => return FileResult::failure("User cancelled the open file dialog"),
            Err(e) => return FileResult::failure(format!("failed to open file dialog: {e}")),
        };
        match self.load(&path).await {
            Ok(source) => {
                let encoded = general_purpose::STANDARD.encode(source.original_bytes());
                info!(
                    target: "decolgen::api",
                    path = %path.display(),
                    size = source.byte_size(),
                    "file opened"
                );
                FileResult::success(source.file_info(), encoded)
            }
            Err(e) => {
                warn!(target: "decolgen::api", path = %path.display(), error = %e, "open failed");
                FileResult::failure(format!("failed to read file: {e}"))
            }
        }
    }

    /// Render a preview. `None` when a newer preview for the same file
    /// superseded this one.
    pub async fn preview(
        &self,
        path: &Path,
        settings: AdjustmentSettings,
    ) -> EngineResult<Option<RenderedResult>> {
        let cache = Arc::clone(&self.cache);
        let limits = self.config.limits.clone();
        let quality = self.config.preview.quality;
        let source_path = path.to_path_buf();
        self.previews
            .submit(path, settings, move |settings: &AdjustmentSettings| {
                let source = cache.get_or_load(&source_path, &limits)?;
                if settings.is_identity() {
                    let (w, h) = source.dimensions();
                    return Ok(RenderedResult::new(source.original_bytes().to_vec(), w, h));
                }
                let adjusted = pipeline::apply(&source.pixels, settings)?;
                let format = OutputFormat::for_source(source.format, quality);
                let bytes = encoder::encode_with(&adjusted, format, Effort::Preview)?;
                Ok(RenderedResult::new(bytes, adjusted.width(), adjusted.height()))
            })
            .await
    }

    /// Preview as base64, the form the frontend embeds.
    pub async fn preview_image_handler(
        &self,
        path: &Path,
        settings: AdjustmentSettings,
    ) -> EngineResult<Option<String>> {
        let rendered = self.preview(path, settings).await?;
        Ok(rendered.map(|r| general_purpose::STANDARD.encode(&r.bytes)))
    }

    pub fn cancel_preview(&self, path: &Path) {
        self.previews.cancel(path);
    }

    /// Apply `settings` at full resolution and save where the user picks.
    ///
    /// Identity settings in the source format write the original bytes
    /// unchanged.
    pub async fn save_edited_image_handler(
        &self,
        path: &Path,
        settings: AdjustmentSettings,
    ) -> EngineResult<PathBuf> {
        let source = self.load(path).await?;
        let format = OutputFormat::for_source(source.format, self.config.output.save_quality);
        let suggested =
            io::derive_output_path(path, &self.config.output.edited_suffix, format.extension());
        let destination = self.pick_destination(&suggested)?;

        let passthrough = settings.is_identity() && format.image_format() == source.format;
        let bytes = if passthrough {
            source.original_bytes().to_vec()
        } else {
            let source = Arc::clone(&source);
            pool::spawn("save", move || {
                let adjusted = pipeline::apply(&source.pixels, &settings)?;
                encoder::encode(&adjusted, format)
            })
            .await?
        };

        let size = bytes.len();
        let written = destination.clone();
        pool::spawn("write", move || io::write_output(&written, &bytes)).await?;
        info!(
            target: "decolgen::api",
            source = %path.display(),
            destination = %destination.display(),
            size,
            passthrough,
            "edited image saved"
        );
        Ok(destination)
    }

    /// Re-encode so the file lands in `[target, target + tolerance]` and save
    /// it where the user picks.
    pub async fn resize_by_capacity(&self, path: &Path, target_bytes: u64) -> EngineResult<PathBuf> {
        Ok(self.resize_to_capacity(path, target_bytes).await?.path)
    }

    pub async fn resize_to_capacity(
        &self,
        path: &Path,
        target_bytes: u64,
    ) -> EngineResult<CapacityReport> {
        if target_bytes == 0 {
            return Err(EngineError::invalid_argument(
                "target_bytes",
                "0",
                "capacity must be greater than zero",
            ));
        }
        let source = self.load(path).await?;
        let format = OutputFormat::for_source(source.format, CAPACITY_START_QUALITY);
        let request = CapacityRequest::new(path, target_bytes, &self.config.capacity);

        let capacity_config = self.config.capacity.clone();
        let searched = Arc::clone(&source);
        let outcome = pool::spawn("capacity", move || {
            let mut probe = ImageProbe::new(&searched.pixels, format);
            capacity::search(searched.original_bytes(), &request, &mut probe, &capacity_config)
        })
        .await?;

        // Without a re-encode the bytes are still in the source container
        let extension = if outcome.attempts.is_empty() {
            path.extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| format.extension().to_string())
        } else {
            format.extension().to_string()
        };
        let suggested =
            io::derive_output_path(path, &self.config.output.resized_suffix, &extension);
        let destination = self.pick_destination(&suggested)?;

        let size = outcome.bytes.len() as u64;
        let written = destination.clone();
        let bytes = outcome.bytes;
        pool::spawn("write", move || io::write_output(&written, &bytes)).await?;
        info!(
            target: "decolgen::api",
            source = %path.display(),
            destination = %destination.display(),
            target = target_bytes,
            size,
            status = ?outcome.status,
            attempts = outcome.attempts.len(),
            "capacity resize saved"
        );
        Ok(CapacityReport {
            path: destination,
            status: outcome.status,
            size,
            width: outcome.width,
            height: outcome.height,
            attempts: outcome.attempts,
        })
    }

    fn pick_destination(&self, suggested: &Path) -> EngineResult<PathBuf> {
        match self.dialogs.pick_destination(suggested)? {
            Some(path) => Ok(path),
            None => {
                info!(
                    target: "decolgen::api",
                    suggested = %suggested.display(),
                    "save dialog dismissed"
                );
                Err(EngineError::user_cancelled_save())
            }
        }
    }

    /// Best effort; failures are logged, never returned.
    pub fn reveal_in_explorer(&self, path: &Path) {
        io::reveal_in_explorer(path);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// The one notification the UI shows for a finished save or resize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn from_outcome(outcome: &EngineResult<PathBuf>) -> Self {
        match outcome {
            Ok(path) => Self {
                level: NoticeLevel::Success,
                message: format!("Saved to {}", path.display()),
            },
            Err(e) if e.is_cancellation() => Self {
                level: NoticeLevel::Warning,
                message: e.to_string(),
            },
            Err(e) => Self {
                level: NoticeLevel::Error,
                message: e.to_string(),
            },
        }
    }
}
