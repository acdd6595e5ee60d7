// lib.rs
//
// decolgen-engine: capacity-targeting resize and live image adjustment
//
// Design goals:
// - Hit a requested file size without leaving the source format
// - Interactive previews: debounced, latest request wins
// - Never block the caller's async runtime with pixel work
// - Structured errors the UI can turn into one notification

// Memory allocator optimization - jemalloc for large decode/encode buffers
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod config;
pub mod engine;
pub mod error;
pub mod ops;

pub use config::EngineConfig;
pub use engine::ImageEngine;
pub use error::EngineError;
pub use ops::{AdjustmentSettings, OutputFormat, ResampleFilter};
