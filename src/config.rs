// src/config.rs
//
// Engine configuration. Every field has a default, so an empty TOML document
// (or no file at all) yields a working engine.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

type ConfigResult<T> = std::result::Result<T, EngineError>;

/// Default upload ceiling of the desktop app (50MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub capacity: CapacityConfig,
    pub preview: PreviewConfig,
    pub output: OutputConfig,
    pub limits: Limits,
}

/// Capacity search knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapacityConfig {
    /// Upper slack as a fraction of the target
    pub tolerance_ratio: f64,
    /// Lower bound on the slack in bytes
    pub min_tolerance_bytes: u64,
    /// Total encode attempts before giving up
    pub max_attempts: u32,
    /// Scale multiplier per outer iteration when quality alone cannot shrink enough
    pub scale_decay: f64,
    /// Smallest scale factor tried
    pub min_scale: f64,
    /// Fill undershooting results up to the target with container padding
    pub pad_to_target: bool,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            tolerance_ratio: 0.02,
            min_tolerance_bytes: 256,
            max_attempts: 16,
            scale_decay: 0.85,
            min_scale: 0.05,
            pad_to_target: true,
        }
    }
}

impl CapacityConfig {
    /// Slack above `target` accepted as a hit.
    pub fn tolerance_for(&self, target: u64) -> u64 {
        let ratio = (target as f64 * self.tolerance_ratio).ceil() as u64;
        ratio.max(self.min_tolerance_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Quiet interval before a preview renders
    pub debounce_ms: u64,
    /// Encode quality for lossy previews
    pub quality: u8,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            quality: 85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Encode quality for saved lossy edits
    pub save_quality: u8,
    pub edited_suffix: String,
    pub resized_suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_quality: 95,
            edited_suffix: "_edited".to_string(),
            resized_suffix: "_resized".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    pub max_file_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            EngineError::invalid_argument("config", "toml", e.message().to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(EngineError::from_read_io(
                path.to_string_lossy().to_string(),
                e,
            )),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let c = &self.capacity;
        if !(c.tolerance_ratio.is_finite() && (0.0..1.0).contains(&c.tolerance_ratio)) {
            return Err(EngineError::invalid_argument(
                "capacity.tolerance_ratio",
                c.tolerance_ratio.to_string(),
                "must be in [0, 1)",
            ));
        }
        // Padding needs room for at least one container filler segment
        if c.min_tolerance_bytes < 16 {
            return Err(EngineError::invalid_argument(
                "capacity.min_tolerance_bytes",
                c.min_tolerance_bytes.to_string(),
                "must be at least 16",
            ));
        }
        if c.max_attempts == 0 {
            return Err(EngineError::invalid_argument(
                "capacity.max_attempts",
                "0",
                "must be positive",
            ));
        }
        if !(c.scale_decay > 0.0 && c.scale_decay < 1.0) {
            return Err(EngineError::invalid_argument(
                "capacity.scale_decay",
                c.scale_decay.to_string(),
                "must be in (0, 1)",
            ));
        }
        if !(c.min_scale > 0.0 && c.min_scale <= 1.0) {
            return Err(EngineError::invalid_argument(
                "capacity.min_scale",
                c.min_scale.to_string(),
                "must be in (0, 1]",
            ));
        }
        for (name, quality) in [
            ("preview.quality", self.preview.quality),
            ("output.save_quality", self.output.save_quality),
        ] {
            if quality == 0 || quality > 100 {
                return Err(EngineError::invalid_argument(
                    name,
                    quality.to_string(),
                    "must be in [1, 100]",
                ));
            }
        }
        if self.limits.max_file_size == 0 {
            return Err(EngineError::invalid_argument(
                "limits.max_file_size",
                "0",
                "must be positive",
            ));
        }
        Ok(())
    }
}
