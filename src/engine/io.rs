// src/engine/io.rs
//
// File gateway: source loading, atomic output writes, output naming,
// file dialogs and the "reveal in file manager" helper.

use crate::config::Limits;
use crate::engine::common::EngineResult;
use crate::error::EngineError;
use chrono::{DateTime, Local};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Source bytes - in memory or memory-mapped
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory image data
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
}

impl Source {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Source::Memory(data) => data.as_slice(),
            Source::Mapped(mmap) => mmap.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A file read from disk together with the metadata the UI shows.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub source: Source,
    pub size: u64,
    pub modified: SystemTime,
    /// Permission bits, octal
    pub mode: u32,
}

fn path_label(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

/// Read a source file, enforcing the size limit before any bytes are loaded.
pub fn read_source(path: &Path, limits: &Limits) -> EngineResult<SourceFile> {
    let label = path_label(path);
    let meta = std::fs::metadata(path).map_err(|e| EngineError::from_read_io(label.clone(), e))?;
    if meta.is_dir() {
        return Err(EngineError::file_read_failed(
            label,
            std::io::Error::other("path is a directory"),
        ));
    }
    let size = meta.len();
    if size > limits.max_file_size {
        return Err(EngineError::file_too_large(size, limits.max_file_size));
    }

    let file = File::open(path).map_err(|e| EngineError::from_read_io(label.clone(), e))?;
    // Mapping a zero-length file fails on some platforms
    let source = if size == 0 {
        Source::Memory(Arc::new(Vec::new()))
    } else {
        // SAFETY: the mapping is read-only. The file must not be truncated
        // while mapped; a desktop user replacing the file mid-read is the
        // accepted risk, as with any mmap-based reader.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| EngineError::file_read_failed(label.clone(), e))?;
        Source::Mapped(Arc::new(mmap))
    };

    debug!(target: "decolgen::io", path = %label, size, "source loaded");
    Ok(SourceFile {
        path: path.to_path_buf(),
        source,
        size,
        modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        mode: permission_bits(&meta),
    })
}

/// Write `bytes` to `path` atomically: temp file in the same directory, then
/// rename over the destination.
pub fn write_output(path: &Path, bytes: &[u8]) -> EngineResult<()> {
    let label = path_label(path);
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp =
        NamedTempFile::new_in(dir).map_err(|e| EngineError::file_write_failed(label.clone(), e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| EngineError::file_write_failed(label.clone(), e))?;
    tmp.persist(path)
        .map_err(|e| EngineError::file_write_failed(label.clone(), e.error))?;
    debug!(target: "decolgen::io", path = %label, size = bytes.len(), "output written");
    Ok(())
}

/// `<dir>/<stem><suffix>.<extension>` next to the source.
pub fn derive_output_path(source: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    source.with_file_name(format!("{stem}{suffix}.{extension}"))
}

/// File metadata in the shape the frontend renders.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    /// RFC 3339
    pub mod_time: String,
    pub is_dir: bool,
    /// Permission bits as an octal string
    pub mode: String,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub file_path: String,
}

impl FileInfo {
    pub fn new(file: &SourceFile, dimensions: (u32, u32)) -> Self {
        let modified: DateTime<Local> = file.modified.into();
        Self {
            name: file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            mod_time: modified.to_rfc3339(),
            is_dir: false,
            mode: format!("{:o}", file.mode),
            width: dimensions.0,
            height: dimensions.1,
            size: file.size,
            file_path: path_label(&file.path),
        }
    }
}

/// Result of the open-file flow. `status` is 1 on success, 0 otherwise.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub file_info: FileInfo,
    pub base64_encoded: String,
    pub status: i32,
    pub message: String,
}

impl FileResult {
    pub const SUCCESS: i32 = 1;
    pub const FAILURE: i32 = 0;

    pub fn success(file_info: FileInfo, base64_encoded: String) -> Self {
        Self {
            file_info,
            base64_encoded,
            status: Self::SUCCESS,
            message: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: Self::FAILURE,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS
    }
}

/// File pickers. `None` means the user dismissed the dialog.
pub trait FileDialogs: Send + Sync {
    fn pick_source(&self) -> EngineResult<Option<PathBuf>>;

    fn pick_destination(&self, suggested: &Path) -> EngineResult<Option<PathBuf>>;
}

/// Non-interactive dialogs: the destination is always the suggested path and
/// the source is fixed at construction.
#[derive(Clone, Debug, Default)]
pub struct DerivedDestination {
    source: Option<PathBuf>,
}

impl DerivedDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(source: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(source.into()),
        }
    }
}

impl FileDialogs for DerivedDestination {
    fn pick_source(&self) -> EngineResult<Option<PathBuf>> {
        Ok(self.source.clone())
    }

    fn pick_destination(&self, suggested: &Path) -> EngineResult<Option<PathBuf>> {
        Ok(Some(suggested.to_path_buf()))
    }
}

fn reveal_command(path: &Path) -> std::process::Command {
    #[cfg(target_os = "windows")]
    {
        let mut cmd = std::process::Command::new("explorer");
        cmd.arg(format!("/select,{}", path.display()));
        cmd
    }
    #[cfg(target_os = "macos")]
    {
        let mut cmd = std::process::Command::new("open");
        cmd.arg("-R").arg(path);
        cmd
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut cmd = std::process::Command::new("xdg-open");
        cmd.arg(dir);
        cmd
    }
}

/// Show `path` in the platform file manager. Best effort: failures are
/// logged and swallowed.
pub fn reveal_in_explorer(path: &Path) {
    match reveal_command(path).spawn() {
        Ok(_) => debug!(target: "decolgen::io", path = %path.display(), "revealed in file manager"),
        Err(e) => warn!(
            target: "decolgen::io",
            path = %path.display(),
            error = %e,
            "failed to reveal file"
        ),
    }
}
