//! wgpu Backend
//!
//! [`WgpuBackend`] owns the instance, adapter, device, queue and the window
//! surface. Initialization walks two fallback ladders: hardware adapter then
//! the software fallback adapter, and within each adapter the feature levels
//! from [`FeatureLevel::Full`] down to the configured minimum.
//!
//! Device-level rejections are caught with error scopes around every creation
//! call, so a bad texture description comes back as an `Err` instead of going
//! to the uncaptured-error handler.

use std::sync::Arc;

use loupe_core::{LoupeError, Result};
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use super::{GpuBackend, RetireCallback, SurfaceFailure};
use crate::sampler::SamplerKey;
use crate::settings::{DeviceSettings, FeatureLevel};
use crate::shader::ShaderBlob;
use crate::texture::{BindFlags, InitialData, TextureDesc, ViewKind};

/// Surface formats preferred for the back buffer, in order.
const PREFERRED_FORMATS: [wgpu::TextureFormat; 2] = [
    wgpu::TextureFormat::Bgra8Unorm,
    wgpu::TextureFormat::Rgba8Unorm,
];

pub struct WgpuBackend {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    back_buffer_bind: BindFlags,

    feature_level: FeatureLevel,
    supports_tearing: bool,
    debug_layer: bool,

    lost: Arc<Mutex<Option<String>>>,
    current_frame: Option<wgpu::SurfaceTexture>,
}

impl WgpuBackend {
    /// Whether backend validation can be requested in this process.
    ///
    /// Side-effect free; usable before any device exists.
    #[must_use]
    pub fn is_debug_layer_available() -> bool {
        wgpu::InstanceFlags::from_build_config()
            .with_env()
            .contains(wgpu::InstanceFlags::VALIDATION)
    }

    /// Creates the device and a surface for `window`.
    ///
    /// Blocks on adapter and device requests.
    pub fn new<W>(window: W, width: u32, height: u32, settings: &DeviceSettings) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let debug_layer = if settings.request_debug_layer {
            let available = Self::is_debug_layer_available();
            if !available {
                log::warn!("Debug layer requested but validation is unavailable");
            }
            available
        } else {
            false
        };

        let mut flags = wgpu::InstanceFlags::from_build_config().with_env();
        if debug_layer {
            flags |= wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::DEBUG;
        } else {
            flags.remove(wgpu::InstanceFlags::VALIDATION);
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: settings.backends.unwrap_or(wgpu::Backends::all()),
            flags,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| LoupeError::Initialization(format!("surface creation failed: {e}")))?;

        let fallback_ladder: &[bool] = if settings.allow_software_fallback {
            &[false, true]
        } else {
            &[false]
        };

        for &force_fallback_adapter in fallback_ladder {
            let adapter = match pollster::block_on(instance.request_adapter(
                &wgpu::RequestAdapterOptions {
                    power_preference: settings.power_preference,
                    compatible_surface: Some(&surface),
                    force_fallback_adapter,
                },
            )) {
                Ok(adapter) => adapter,
                Err(e) => {
                    log::warn!(
                        "No {} adapter: {e}",
                        if force_fallback_adapter { "fallback" } else { "hardware" }
                    );
                    continue;
                }
            };

            let info = adapter.get_info();
            log::info!(
                "Trying adapter \"{}\" ({:?}, {:?})",
                info.name,
                info.backend,
                info.device_type
            );

            for level in FeatureLevel::attempts_down_to(settings.minimum_feature_level) {
                let request = adapter.request_device(&wgpu::DeviceDescriptor {
                    label: Some("Loupe Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: level.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    ..Default::default()
                });
                match pollster::block_on(request) {
                    Ok((device, queue)) => {
                        log::info!("Device created at feature level {level:?}");
                        return Self::finish(
                            instance, adapter, device, queue, surface, width, height, level,
                            debug_layer, settings,
                        );
                    }
                    Err(e) => log::debug!("Feature level {level:?} rejected: {e}"),
                }
            }
        }

        log::error!(
            "No adapter supports feature level {:?} or above",
            settings.minimum_feature_level
        );
        Err(LoupeError::Initialization(format!(
            "no adapter supports feature level {:?} or above",
            settings.minimum_feature_level
        )))
    }

    fn finish(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        feature_level: FeatureLevel,
        debug_layer: bool,
        settings: &DeviceSettings,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(&adapter);
        let Some(&fallback_format) = caps.formats.first() else {
            return Err(LoupeError::Initialization(
                "surface is not supported by the adapter".to_string(),
            ));
        };
        let format = PREFERRED_FORMATS
            .into_iter()
            .find(|f| caps.formats.contains(f))
            .unwrap_or(fallback_format);

        let supports_tearing = caps.present_modes.contains(&wgpu::PresentMode::Immediate);

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        let mut back_buffer_bind = BindFlags::RENDER_TARGET;
        if caps.usages.contains(wgpu::TextureUsages::STORAGE_BINDING) {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
            back_buffer_bind |= BindFlags::UNORDERED_ACCESS;
        }

        device.on_uncaptured_error(Arc::new(|e| {
            log::error!("Uncaptured wgpu error: {e}");
        }));

        let lost = Arc::new(Mutex::new(None));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("Device lost ({reason:?}): {message}");
            *lost_flag.lock() = Some(format!("{reason:?}: {message}"));
        });

        let max_dimension = device.limits().max_texture_dimension_2d;
        let (width, height) = clamp_surface_extent(width, height, max_dimension);
        let config = wgpu::SurfaceConfiguration {
            usage,
            format,
            width,
            height,
            present_mode: present_mode(!settings.vsync && supports_tearing),
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: settings.max_frame_latency.max(1),
        };
        scoped(&device, "surface configuration", || surface.configure(&device, &config))
            .map_err(LoupeError::Initialization)?;

        log::info!(
            "Surface configured: {format:?} {}x{}, tearing {}",
            config.width,
            config.height,
            if supports_tearing { "supported" } else { "unsupported" }
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            surface,
            config,
            back_buffer_bind,
            feature_level,
            supports_tearing,
            debug_layer,
            lost,
            current_frame: None,
        })
    }

    // ─── Accessors ─────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    #[inline]
    #[must_use]
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    #[inline]
    #[must_use]
    pub fn surface(&self) -> &wgpu::Surface<'static> {
        &self.surface
    }

    #[inline]
    #[must_use]
    pub fn surface_config(&self) -> &wgpu::SurfaceConfiguration {
        &self.config
    }

    /// Creates a shader module from a compiled SPIR-V blob.
    pub fn create_shader_module(&self, blob: &ShaderBlob) -> Result<wgpu::ShaderModule> {
        self.scoped("shader module", || {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(blob.entry_point()),
                source: wgpu::util::make_spirv(blob.bytes()),
            })
        })
        .map_err(LoupeError::ResourceCreation)
    }

    fn scoped<T>(&self, what: &str, create: impl FnOnce() -> T) -> std::result::Result<T, String> {
        scoped(&self.device, what, create)
    }
}

/// Runs `create` inside validation and out-of-memory error scopes.
fn scoped<T>(
    device: &wgpu::Device,
    what: &str,
    create: impl FnOnce() -> T,
) -> std::result::Result<T, String> {
    let out_of_memory_scope = device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let validation_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    let validation = pollster::block_on(validation_scope.pop());
    let out_of_memory = pollster::block_on(out_of_memory_scope.pop());

    match validation.or(out_of_memory) {
        Some(e) => {
            log::error!("Failed to create {what}: {e}");
            Err(format!("{what}: {e}"))
        }
        None => Ok(value),
    }
}

/// Fits a requested surface size into `1..=max_dimension` on both axes.
fn clamp_surface_extent(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let max_dimension = max_dimension.max(1);
    let clamped = (width.clamp(1, max_dimension), height.clamp(1, max_dimension));
    if clamped != (width.max(1), height.max(1)) {
        log::warn!(
            "Surface {width}x{height} exceeds the device limit {max_dimension}, using {}x{}",
            clamped.0,
            clamped.1
        );
    }
    clamped
}

fn present_mode(allow_tearing: bool) -> wgpu::PresentMode {
    if allow_tearing {
        wgpu::PresentMode::Immediate
    } else {
        wgpu::PresentMode::Fifo
    }
}

impl GpuBackend for WgpuBackend {
    type Texture = wgpu::Texture;
    type View = wgpu::TextureView;
    type Sampler = wgpu::Sampler;

    fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    fn supports_tearing(&self) -> bool {
        self.supports_tearing
    }

    fn debug_layer_enabled(&self) -> bool {
        self.debug_layer
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        initial: Option<&InitialData<'_>>,
    ) -> Result<wgpu::Texture> {
        let view_formats = desc.view_formats();
        let texture = self
            .scoped("texture", || {
                self.device.create_texture(&wgpu::TextureDescriptor {
                    label: desc.label.as_deref(),
                    size: desc.extent(),
                    mip_level_count: desc.mip_level_count(),
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: desc.format,
                    usage: desc.wgpu_usage(initial.is_some()),
                    view_formats: &view_formats,
                })
            })
            .map_err(LoupeError::ResourceCreation)?;

        if let Some(data) = initial {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data.bytes,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(data.bytes_per_row),
                    rows_per_image: Some(desc.height),
                },
                desc.extent(),
            );
        }
        Ok(texture)
    }

    fn create_view(
        &mut self,
        texture: &wgpu::Texture,
        desc: &TextureDesc,
        kind: ViewKind,
    ) -> Result<wgpu::TextureView> {
        // Attachments and storage bindings address a single mip.
        let mip_level_count = match kind {
            ViewKind::ShaderResource => None,
            ViewKind::RenderTarget | ViewKind::UnorderedAccess => Some(1),
        };
        self.scoped(kind.label(), || {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(kind.label()),
                usage: Some(kind.wgpu_usage()),
                mip_level_count,
                ..Default::default()
            })
        })
        .map_err(|e| LoupeError::ViewCreation(format!("{e} ({:?})", desc.format)))
    }

    fn create_sampler(&mut self, key: &SamplerKey) -> Result<wgpu::Sampler> {
        let descriptor = key.descriptor();
        self.scoped("sampler", || self.device.create_sampler(&descriptor))
            .map_err(LoupeError::ResourceCreation)
    }

    fn acquire_back_buffer(
        &mut self,
    ) -> std::result::Result<(wgpu::Texture, TextureDesc), SurfaceFailure> {
        if let Some(reason) = self.device_lost() {
            return Err(SurfaceFailure::DeviceLost(reason));
        }
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Timeout) => return Err(SurfaceFailure::Timeout),
            Err(wgpu::SurfaceError::Outdated) => return Err(SurfaceFailure::Outdated),
            Err(wgpu::SurfaceError::Lost) => {
                return Err(SurfaceFailure::DeviceLost("surface lost".to_string()));
            }
            Err(e) => return Err(SurfaceFailure::Other(e.to_string())),
        };

        let texture = frame.texture.clone();
        let desc = TextureDesc::new(
            self.config.format,
            self.config.width,
            self.config.height,
            self.back_buffer_bind,
        )
        .with_label("Back Buffer");
        self.current_frame = Some(frame);
        Ok((texture, desc))
    }

    fn present(&mut self, allow_tearing: bool) -> std::result::Result<(), SurfaceFailure> {
        let Some(frame) = self.current_frame.take() else {
            return Err(SurfaceFailure::Other("no back buffer acquired".to_string()));
        };
        frame.present();

        if let Some(reason) = self.device_lost() {
            return Err(SurfaceFailure::DeviceLost(reason));
        }

        // Present mode is part of the surface configuration; a change takes
        // effect from the next frame.
        let wanted = present_mode(allow_tearing && self.supports_tearing);
        if wanted != self.config.present_mode {
            log::debug!("Switching present mode to {wanted:?}");
            self.config.present_mode = wanted;
            self.scoped("surface configuration", || {
                self.surface.configure(&self.device, &self.config);
            })
            .map_err(SurfaceFailure::Other)?;
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            log::warn!("Ignoring resize to {width}x{height}");
            return Ok(());
        }
        if let Some(reason) = self.device_lost() {
            return Err(LoupeError::DeviceLost(reason));
        }
        // The old surface texture must be released before reconfiguring.
        self.current_frame = None;
        let max_dimension = self.device.limits().max_texture_dimension_2d;
        (self.config.width, self.config.height) =
            clamp_surface_extent(width, height, max_dimension);
        self.scoped("surface configuration", || {
            self.surface.configure(&self.device, &self.config);
        })
        .map_err(LoupeError::ResourceCreation)
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn poll(&self) {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("Device poll failed: {e}");
        }
    }

    fn on_frame_retired(&self, callback: RetireCallback) {
        self.queue.on_submitted_work_done(callback);
    }

    fn device_lost(&self) -> Option<String> {
        self.lost.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_within_limit_is_kept() {
        assert_eq!(clamp_surface_extent(1920, 1080, 2048), (1920, 1080));
        assert_eq!(clamp_surface_extent(2048, 2048, 2048), (2048, 2048));
    }

    #[test]
    fn test_oversized_extent_is_clamped_per_axis() {
        let downlevel = wgpu::Limits::downlevel_defaults().max_texture_dimension_2d;
        assert_eq!(clamp_surface_extent(2560, 1440, downlevel), (downlevel, 1440));
        assert_eq!(clamp_surface_extent(3840, 2160, downlevel), (downlevel, downlevel));
    }

    #[test]
    fn test_zero_extent_becomes_one() {
        assert_eq!(clamp_surface_extent(0, 0, 8192), (1, 1));
        assert_eq!(clamp_surface_extent(640, 480, 0), (1, 1));
    }
}
