// src/error.rs
//
// Engine errors. Each variant maps to one category, and the desktop shell
// turns the category into a notification level (see `api::Notice`).

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by the boundary layer to pick a notification level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Bad settings or arguments from the caller
    UserError,
    /// Decode, resize, filter or encode failures
    CodecError,
    IoError,
    /// Oversized input, or a capacity target the search could not hit
    ResourceLimit,
    /// A dialog was dismissed
    Cancelled,
    /// A worker panicked
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::IoError => "IoError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::Cancelled => "Cancelled",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }

    /// Stable machine-readable code for this category
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "DECOLGEN_USER_ERROR",
            ErrorCategory::CodecError => "DECOLGEN_CODEC_ERROR",
            ErrorCategory::IoError => "DECOLGEN_IO_ERROR",
            ErrorCategory::ResourceLimit => "DECOLGEN_RESOURCE_LIMIT",
            ErrorCategory::Cancelled => "DECOLGEN_CANCELLED",
            ErrorCategory::InternalBug => "DECOLGEN_INTERNAL_BUG",
        }
    }
}

/// Every variant carries the path or parameters involved, so its `Display`
/// text can go straight into a notification.
#[derive(Debug, Error)]
pub enum EngineError {
    // File I/O Errors
    #[error("{path} does not exist")]
    FileNotFound { path: Cow<'static, str> },

    #[error("Permission denied: {path}")]
    PermissionDenied { path: Cow<'static, str> },

    #[error("Could not read {path}: {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not write {path}: {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Max file size is {}MB, your file size is {}MB", max / (1024 * 1024), size / (1024 * 1024))]
    FileTooLarge { size: u64, max: u64 },

    // Decode Errors
    #[error("Not a supported image: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Corrupted image data: {message}")]
    CorruptData { message: Cow<'static, str> },

    // Size Limit Errors
    #[error("Image side of {dimension}px is over the {max}px limit")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image has {pixels} pixels, over the {max} pixel limit")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Processing Errors
    #[error("Could not resize {source_width}x{source_height} to {target_width}x{target_height}: {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    #[error("Image processing failed during {stage}: {message}")]
    ProcessingFailure {
        stage: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Encode Errors
    #[error("{format} encoder failed: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Capacity search
    #[error(
        "Could not reach target size {target} bytes (+{tolerance}) after {attempts} attempts; closest was {}",
        closest.map(|c| format!("{c} bytes")).unwrap_or_else(|| "unknown".to_string())
    )]
    CapacityUnreachable {
        target: u64,
        tolerance: u64,
        closest: Option<u64>,
        attempts: u32,
    },

    // Cancellation
    #[error("User cancelled the save dialog")]
    UserCancelledSave,

    #[error("{name} = {value} is invalid: {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Worker crashed: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

// Constructor Helpers
impl EngineError {
    pub fn file_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn permission_denied(path: impl Into<Cow<'static, str>>) -> Self {
        Self::PermissionDenied { path: path.into() }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    /// Map an I/O error from a read to the most specific variant.
    pub fn from_read_io(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::file_not_found(path),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::file_read_failed(path, source),
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_too_large(size: u64, max: u64) -> Self {
        Self::FileTooLarge { size, max }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn corrupt_data(message: impl Into<Cow<'static, str>>) -> Self {
        Self::CorruptData {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn processing_failure(
        stage: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ProcessingFailure {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn capacity_unreachable(
        target: u64,
        tolerance: u64,
        closest: Option<u64>,
        attempts: u32,
    ) -> Self {
        Self::CapacityUnreachable {
            target,
            tolerance,
            closest,
            attempts,
        }
    }

    pub fn user_cancelled_save() -> Self {
        Self::UserCancelledSave
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Whether retrying with other input or settings can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError
            | ErrorCategory::IoError
            | ErrorCategory::ResourceLimit
            | ErrorCategory::Cancelled => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// True when the user abandoned the operation. Callers treat this as a
    /// neutral outcome rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        self.category() == ErrorCategory::Cancelled
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument { .. } => ErrorCategory::UserError,

            Self::UnsupportedFormat { .. }
            | Self::CorruptData { .. }
            | Self::EncodeFailed { .. }
            | Self::ResizeFailed { .. }
            | Self::ProcessingFailure { .. } => ErrorCategory::CodecError,

            Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::FileReadFailed { .. }
            | Self::FileWriteFailed { .. } => ErrorCategory::IoError,

            Self::FileTooLarge { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::CapacityUnreachable { .. } => ErrorCategory::ResourceLimit,

            Self::UserCancelledSave => ErrorCategory::Cancelled,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }

    /// Shorthand for `self.category().code()`
    pub fn code(&self) -> &'static str {
        self.category().code()
    }
}
