//! Device Context Settings
//!
//! [`DeviceSettings`] is read once when a
//! [`DeviceResources`](crate::device::DeviceResources) is created and again
//! on every (re)initialization. It is a plain value: nothing in the context
//! mutates it.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use loupe_render::{DeviceSettings, FeatureLevel};
//!
//! let settings = DeviceSettings {
//!     minimum_feature_level: FeatureLevel::Downlevel,
//!     max_frame_latency: 1,
//!     shader_cache_dir: Some("cache/shaders".into()),
//!     ..Default::default()
//! };
//! ```

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// FeatureLevel
// ---------------------------------------------------------------------------

/// Device capability tier, tried from highest to lowest during initialization.
///
/// | Level           | Limits                                  |
/// |-----------------|-----------------------------------------|
/// | `Full`          | `wgpu::Limits::default()`               |
/// | `Downlevel`     | `wgpu::Limits::downlevel_defaults()`    |
/// | `Compatibility` | `wgpu::Limits::downlevel_webgl2_defaults()` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureLevel {
    Compatibility,
    Downlevel,
    Full,
}

impl FeatureLevel {
    /// All levels, highest first.
    pub const DESCENDING: [FeatureLevel; 3] = [
        FeatureLevel::Full,
        FeatureLevel::Downlevel,
        FeatureLevel::Compatibility,
    ];

    /// Levels to attempt, highest first, stopping at `minimum`.
    pub fn attempts_down_to(minimum: FeatureLevel) -> impl Iterator<Item = FeatureLevel> {
        Self::DESCENDING
            .into_iter()
            .filter(move |level| *level >= minimum)
    }

    #[must_use]
    pub fn limits(self) -> wgpu::Limits {
        match self {
            FeatureLevel::Full => wgpu::Limits::default(),
            FeatureLevel::Downlevel => wgpu::Limits::downlevel_defaults(),
            FeatureLevel::Compatibility => wgpu::Limits::downlevel_webgl2_defaults(),
        }
    }
}

// ---------------------------------------------------------------------------
// PresentPolicy
// ---------------------------------------------------------------------------

/// How [`end_frame`](crate::device::DeviceResources::end_frame) presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentPolicy {
    /// Wait for vertical blank.
    #[default]
    VSync,
    /// Present immediately, allowing tearing. Falls back to [`VSync`](Self::VSync)
    /// when the surface does not support tearing.
    Unthrottled,
}

// ---------------------------------------------------------------------------
// DeviceSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeviceSettings {
    // === Adapter Selection ===
    /// Restrict the backends wgpu may use. `None` lets wgpu choose.
    pub backends: Option<wgpu::Backends>,

    /// GPU adapter selection preference.
    pub power_preference: wgpu::PowerPreference,

    /// Retry with the software fallback adapter when no hardware adapter
    /// can be created at an acceptable feature level.
    pub allow_software_fallback: bool,

    /// Lowest feature level initialization will accept.
    pub minimum_feature_level: FeatureLevel,

    /// Request backend validation. Ignored (with a warning) when
    /// [`is_debug_layer_available`](crate::backend::wgpu_impl::WgpuBackend::is_debug_layer_available)
    /// reports `false`.
    pub request_debug_layer: bool,

    // === Presentation ===
    /// Initial present policy used until the first `end_frame` call picks one.
    pub vsync: bool,

    /// Maximum number of presented frames the GPU may still be working on
    /// before `begin_frame` blocks.
    pub max_frame_latency: u32,

    /// Upper bound on the frame-latency wait. On expiry the frame is skipped.
    pub frame_wait_timeout: Duration,

    // === Shaders ===
    /// Directory for the persisted shader cache. `None` keeps compiled
    /// shaders in memory only.
    pub shader_cache_dir: Option<PathBuf>,

    /// Compression level for persisted shader blobs, `0..=9`.
    pub shader_compression_level: i32,

    /// Worker threads for shader precompilation. `None` uses the available
    /// parallelism.
    pub worker_threads: Option<NonZeroUsize>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            backends: None,
            power_preference: wgpu::PowerPreference::HighPerformance,
            allow_software_fallback: true,
            minimum_feature_level: FeatureLevel::Downlevel,
            request_debug_layer: cfg!(debug_assertions),
            vsync: true,
            max_frame_latency: 1,
            frame_wait_timeout: Duration::from_secs(1),
            shader_cache_dir: None,
            shader_compression_level: loupe_core::compress::DEFAULT_LEVEL,
            worker_threads: None,
        }
    }
}
