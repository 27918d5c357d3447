//! # Loupe Render
//!
//! The graphics device context of Loupe. [`DeviceResources`] creates
//! textures, hands out cached render-target / shader-resource /
//! unordered-access views and samplers, compiles and caches shaders, and
//! drives the begin/end frame cycle on a window surface.
//!
//! The GPU API sits behind [`GpuBackend`]; [`WgpuBackend`] is the wgpu
//! implementation.

pub mod backend;
pub mod device;
pub mod frame;
pub mod sampler;
pub mod settings;
pub mod shader;
pub mod texture;

pub use backend::wgpu_impl::WgpuBackend;
pub use backend::{GpuBackend, RetireCallback, SurfaceFailure};
pub use device::DeviceResources;
pub use frame::{FrameLatencyWaiter, FrameState, FrameStatus};
pub use sampler::{SamplerFilter, SamplerKey};
pub use settings::{DeviceSettings, FeatureLevel, PresentPolicy};
pub use shader::{
    DirectoryIncludes, IncludeResolver, NagaCompiler, NoIncludes, ShaderBlob, ShaderCache,
    ShaderCompiler, ShaderDefines, ShaderManager,
};
pub use texture::{
    BindFlags, InitialData, ResourceUsage, TextureDesc, TextureId, TextureMiscFlags, ViewKind,
};
