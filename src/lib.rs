//! # Loupe
//!
//! GPU resource and frame-presentation core for a real-time window upscaler.
//!
//! This crate re-exports the workspace members:
//!
//! - [`loupe_core`]: hashing, block compression, parallel dispatch, errors
//! - [`loupe_render`]: the graphics device context and its wgpu backend
//!
//! ```rust,ignore
//! use loupe::prelude::*;
//!
//! let mut device: DeviceResources<WgpuBackend> = DeviceResources::new(DeviceSettings::default());
//! device.initialize_with_window(window.clone(), width, height)?;
//!
//! loop {
//!     if let FrameStatus::Ready(back_buffer) = device.begin_frame()? {
//!         let rtv = device.get_render_target_view(back_buffer)?;
//!         // record and submit work targeting `rtv`
//!         device.end_frame(PresentPolicy::VSync)?;
//!     }
//! }
//! ```

pub use loupe_core;
pub use loupe_render;

pub use loupe_core::{LoupeError, Result};

pub mod prelude {
    pub use loupe_core::compress::{compress, decompress};
    pub use loupe_core::{Dispatcher, LoupeError, Result, hash_data};
    pub use loupe_render::{
        BindFlags, DeviceResources, DeviceSettings, FrameState, FrameStatus, InitialData,
        NoIncludes, PresentPolicy, ResourceUsage, SamplerFilter, ShaderDefines, TextureDesc,
        TextureId, WgpuBackend,
    };
}
