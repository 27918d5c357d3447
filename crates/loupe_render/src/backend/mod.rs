//! GPU Backend Abstraction
//!
//! [`GpuBackend`] is the seam between [`DeviceResources`](crate::device::DeviceResources)
//! and a concrete graphics API. The device context owns all caching, handle
//! validation and frame-state bookkeeping; a backend only creates objects and
//! talks to the presentation surface.
//!
//! The production implementation is [`wgpu_impl::WgpuBackend`]. Tests drive the
//! device context with a mock backend.

pub mod wgpu_impl;

use loupe_core::Result;
use thiserror::Error;

use crate::sampler::SamplerKey;
use crate::settings::FeatureLevel;
use crate::texture::{InitialData, TextureDesc, ViewKind};

/// Why the presentation surface could not acquire or present a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceFailure {
    /// The surface did not produce an image in time. The frame is skipped.
    #[error("surface timed out")]
    Timeout,
    /// The surface configuration no longer matches the window and must be
    /// reconfigured before the next acquire.
    #[error("surface is outdated")]
    Outdated,
    /// The device behind the surface was removed or reset.
    #[error("device lost: {0}")]
    DeviceLost(String),
    #[error("{0}")]
    Other(String),
}

/// Callback fired once the GPU has finished the work submitted for a frame.
pub type RetireCallback = Box<dyn FnOnce() + Send + 'static>;

pub trait GpuBackend {
    type Texture;
    type View;
    type Sampler;

    /// Feature level the device was created at.
    fn feature_level(&self) -> FeatureLevel;

    /// Whether the surface can present without waiting for vertical blank.
    /// Queried once at creation.
    fn supports_tearing(&self) -> bool;

    fn debug_layer_enabled(&self) -> bool;

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        initial: Option<&InitialData<'_>>,
    ) -> Result<Self::Texture>;

    fn create_view(
        &mut self,
        texture: &Self::Texture,
        desc: &TextureDesc,
        kind: ViewKind,
    ) -> Result<Self::View>;

    fn create_sampler(&mut self, key: &SamplerKey) -> Result<Self::Sampler>;

    /// Acquires the next back buffer. The backend keeps whatever it needs to
    /// present it in [`present`](Self::present).
    fn acquire_back_buffer(
        &mut self,
    ) -> std::result::Result<(Self::Texture, TextureDesc), SurfaceFailure>;

    /// Presents the acquired back buffer. `allow_tearing` is only ever `true`
    /// when [`supports_tearing`](Self::supports_tearing) is.
    fn present(&mut self, allow_tearing: bool) -> std::result::Result<(), SurfaceFailure>;

    /// Reconfigures the surface. Zero dimensions are ignored.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Current surface size.
    fn surface_size(&self) -> (u32, u32);

    /// Drives completion callbacks without blocking.
    fn poll(&self);

    /// Registers `callback` to run once all work submitted so far has
    /// completed on the GPU.
    fn on_frame_retired(&self, callback: RetireCallback);

    /// The removal reason if the device has been lost.
    fn device_lost(&self) -> Option<String>;
}
