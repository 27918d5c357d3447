//! Graphics Device Context
//!
//! [`DeviceResources`] owns a [`GpuBackend`] together with everything derived
//! from it:
//!
//! - a generation-checked texture arena addressed by [`TextureId`]
//! - one lazily filled view cache per [`ViewKind`], keyed by texture slot
//! - the sampler cache keyed by [`SamplerKey`]
//! - the shader manager and the dispatcher used to precompile variants
//! - the frame state machine and frame-latency throttling
//!
//! # Threading
//!
//! Meant to be driven from a single render thread. Only shader
//! precompilation fans out, through the [`Dispatcher`].
//!
//! # Device loss
//!
//! Any operation that observes a removed device moves the context to
//! [`FrameState::Lost`], drops every cached GPU object and fails with
//! [`LoupeError::DeviceLost`]. Nothing is retried; the host recovers by calling
//! [`initialize`](DeviceResources::initialize) with a new backend.

use std::sync::Arc;

use loupe_core::{Dispatcher, LoupeError, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;
use slotmap::{SecondaryMap, SlotMap};

use crate::backend::wgpu_impl::WgpuBackend;
use crate::backend::{GpuBackend, SurfaceFailure};
use crate::frame::{FrameLatencyWaiter, FrameState, FrameStatus};
use crate::sampler::{SamplerFilter, SamplerKey};
use crate::settings::{DeviceSettings, FeatureLevel, PresentPolicy};
use crate::shader::{
    IncludeResolver, NagaCompiler, ShaderBlob, ShaderCache, ShaderCompiler, ShaderDefines,
    ShaderManager,
};
use crate::texture::{InitialData, TextureDesc, TextureId, ViewKind};

struct TextureEntry<T> {
    texture: T,
    desc: TextureDesc,
}

/// The three per-kind view caches.
struct ViewCaches<V> {
    render_target: SecondaryMap<TextureId, Arc<V>>,
    shader_resource: SecondaryMap<TextureId, Arc<V>>,
    unordered_access: SecondaryMap<TextureId, Arc<V>>,
}

impl<V> ViewCaches<V> {
    fn new() -> Self {
        Self {
            render_target: SecondaryMap::new(),
            shader_resource: SecondaryMap::new(),
            unordered_access: SecondaryMap::new(),
        }
    }

    fn map(&self, kind: ViewKind) -> &SecondaryMap<TextureId, Arc<V>> {
        match kind {
            ViewKind::RenderTarget => &self.render_target,
            ViewKind::ShaderResource => &self.shader_resource,
            ViewKind::UnorderedAccess => &self.unordered_access,
        }
    }

    fn map_mut(&mut self, kind: ViewKind) -> &mut SecondaryMap<TextureId, Arc<V>> {
        match kind {
            ViewKind::RenderTarget => &mut self.render_target,
            ViewKind::ShaderResource => &mut self.shader_resource,
            ViewKind::UnorderedAccess => &mut self.unordered_access,
        }
    }

    fn remove(&mut self, id: TextureId) {
        self.render_target.remove(id);
        self.shader_resource.remove(id);
        self.unordered_access.remove(id);
    }

    fn clear(&mut self) {
        self.render_target.clear();
        self.shader_resource.clear();
        self.unordered_access.clear();
    }
}

/// Capabilities read from the backend once per initialization.
#[derive(Debug, Clone, Copy)]
struct Capabilities {
    feature_level: FeatureLevel,
    supports_tearing: bool,
    debug_layer: bool,
}

pub struct DeviceResources<B: GpuBackend> {
    settings: DeviceSettings,
    backend: Option<B>,
    state: FrameState,
    capabilities: Option<Capabilities>,
    lost_reason: Option<String>,

    textures: SlotMap<TextureId, TextureEntry<B::Texture>>,
    views: ViewCaches<B::View>,
    samplers: FxHashMap<SamplerKey, Arc<B::Sampler>>,

    shaders: ShaderManager,
    dispatcher: Dispatcher,

    latency: FrameLatencyWaiter,
    back_buffer: Option<TextureId>,
    frame_index: u64,
}

impl<B: GpuBackend> DeviceResources<B> {
    /// Creates an uninitialized context that compiles shaders with naga.
    #[must_use]
    pub fn new(settings: DeviceSettings) -> Self {
        Self::with_compiler(settings, Arc::new(NagaCompiler::new()))
    }

    /// Creates an uninitialized context with a custom shader compiler.
    ///
    /// A shader cache directory that cannot be created is logged and the
    /// context runs with an in-memory cache only.
    #[must_use]
    pub fn with_compiler(settings: DeviceSettings, compiler: Arc<dyn ShaderCompiler>) -> Self {
        let disk = settings.shader_cache_dir.as_ref().and_then(|dir| {
            ShaderCache::open(dir, settings.shader_compression_level)
                .inspect_err(|e| {
                    log::warn!("Shader cache disabled, {}: {e}", dir.display());
                })
                .ok()
        });
        let dispatcher = settings
            .worker_threads
            .map_or_else(Dispatcher::default, Dispatcher::new);

        Self {
            latency: FrameLatencyWaiter::new(settings.max_frame_latency),
            shaders: ShaderManager::new(compiler, disk),
            dispatcher,
            settings,
            backend: None,
            state: FrameState::Uninitialized,
            capabilities: None,
            lost_reason: None,
            textures: SlotMap::with_key(),
            views: ViewCaches::new(),
            samplers: FxHashMap::default(),
            back_buffer: None,
            frame_index: 0,
        }
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────

    /// Installs `backend` and moves to [`FrameState::Ready`].
    ///
    /// Valid from `Uninitialized` (first start) and `Lost` (recovery). Every
    /// texture, view and sampler from a previous device is dropped.
    pub fn initialize(&mut self, backend: B) -> Result<()> {
        match self.state {
            FrameState::Uninitialized | FrameState::Lost => {}
            FrameState::Ready | FrameState::InFrame => {
                return Err(LoupeError::InvalidFrameState(
                    "device context is already initialized".to_string(),
                ));
            }
        }

        self.install(backend);
        Ok(())
    }

    /// Replaces the backend from any state outside a frame, typically after
    /// [`FrameState::Lost`]. The previous backend is dropped after its
    /// textures, views and samplers.
    pub fn reinitialize(&mut self, backend: B) -> Result<()> {
        if self.state == FrameState::InFrame {
            return Err(LoupeError::InvalidFrameState(
                "reinitialize called inside a frame".to_string(),
            ));
        }
        log::info!("Reinitializing device context from {:?}", self.state);
        self.install(backend);
        Ok(())
    }

    fn install(&mut self, backend: B) {
        self.release_device_objects();
        let capabilities = Capabilities {
            feature_level: backend.feature_level(),
            supports_tearing: backend.supports_tearing(),
            debug_layer: backend.debug_layer_enabled(),
        };
        log::info!(
            "Device context ready: feature level {:?}, tearing {}, debug layer {}",
            capabilities.feature_level,
            capabilities.supports_tearing,
            capabilities.debug_layer
        );

        self.capabilities = Some(capabilities);
        self.latency = FrameLatencyWaiter::new(self.settings.max_frame_latency);
        self.backend = Some(backend);
        self.lost_reason = None;
        self.state = FrameState::Ready;
    }

    /// Drops every device-owned object. The backend itself stays.
    fn release_device_objects(&mut self) {
        self.back_buffer = None;
        self.views.clear();
        self.textures.clear();
        self.samplers.clear();
    }

    fn mark_lost(&mut self, reason: String) -> LoupeError {
        if self.state != FrameState::Lost {
            log::error!("Device lost: {reason}");
        }
        self.state = FrameState::Lost;
        self.release_device_objects();
        self.lost_reason = Some(reason.clone());
        LoupeError::DeviceLost(reason)
    }

    /// Fails unless a live device is installed. Notices a device removal
    /// reported by the backend since the last call.
    fn ensure_live(&mut self) -> Result<()> {
        match self.state {
            FrameState::Uninitialized => Err(LoupeError::NotInitialized),
            FrameState::Lost => Err(LoupeError::DeviceLost(
                self.lost_reason.clone().unwrap_or_default(),
            )),
            FrameState::Ready | FrameState::InFrame => {
                match self.backend.as_ref().and_then(B::device_lost) {
                    Some(reason) => Err(self.mark_lost(reason)),
                    None => Ok(()),
                }
            }
        }
    }

    /// A creation call failed; attribute it to device loss if that is the
    /// cause.
    fn creation_failed(&mut self, err: LoupeError) -> LoupeError {
        match self.backend.as_ref().and_then(B::device_lost) {
            Some(reason) => self.mark_lost(reason),
            None => err,
        }
    }

    // ─── Textures ──────────────────────────────────────────────────────────

    pub fn create_texture(
        &mut self,
        desc: &TextureDesc,
        initial: Option<InitialData<'_>>,
    ) -> Result<TextureId> {
        self.ensure_live()?;
        desc.validate(initial.as_ref())
            .inspect_err(|e| log::error!("{e}"))?;

        let Some(backend) = self.backend.as_mut() else {
            return Err(LoupeError::NotInitialized);
        };
        match backend.create_texture(desc, initial.as_ref()) {
            Ok(texture) => Ok(self.textures.insert(TextureEntry {
                texture,
                desc: desc.clone(),
            })),
            Err(e) => Err(self.creation_failed(e)),
        }
    }

    /// Destroys a texture and every view cached for it.
    pub fn destroy_texture(&mut self, id: TextureId) -> Result<()> {
        if self.back_buffer == Some(id) {
            return Err(LoupeError::InvalidFrameState(
                "the back buffer is released by end_frame".to_string(),
            ));
        }
        self.views.remove(id);
        self.textures
            .remove(id)
            .map(|_| ())
            .ok_or(LoupeError::StaleHandle)
    }

    pub fn texture(&self, id: TextureId) -> Result<&B::Texture> {
        self.textures
            .get(id)
            .map(|entry| &entry.texture)
            .ok_or(LoupeError::StaleHandle)
    }

    pub fn texture_desc(&self, id: TextureId) -> Result<&TextureDesc> {
        self.textures
            .get(id)
            .map(|entry| &entry.desc)
            .ok_or(LoupeError::StaleHandle)
    }

    /// Number of live textures, the current back buffer included.
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    // ─── Views ─────────────────────────────────────────────────────────────

    pub fn get_render_target_view(&mut self, id: TextureId) -> Result<Arc<B::View>> {
        self.get_view(id, ViewKind::RenderTarget)
    }

    pub fn get_shader_resource_view(&mut self, id: TextureId) -> Result<Arc<B::View>> {
        self.get_view(id, ViewKind::ShaderResource)
    }

    pub fn get_unordered_access_view(&mut self, id: TextureId) -> Result<Arc<B::View>> {
        self.get_view(id, ViewKind::UnorderedAccess)
    }

    /// Returns the cached view of `kind` for `id`, creating it on first use.
    pub fn get_view(&mut self, id: TextureId, kind: ViewKind) -> Result<Arc<B::View>> {
        self.ensure_live()?;
        let Some(entry) = self.textures.get(id) else {
            return Err(LoupeError::StaleHandle);
        };
        if let Some(view) = self.views.map(kind).get(id) {
            return Ok(Arc::clone(view));
        }

        if !entry.desc.bind.contains(kind.required_bind()) {
            let err = LoupeError::ViewCreation(format!(
                "{} requested for texture {:?} bound as {:?}",
                kind.label(),
                entry.desc.label,
                entry.desc.bind
            ));
            log::error!("{err}");
            return Err(err);
        }

        let Some(backend) = self.backend.as_mut() else {
            return Err(LoupeError::NotInitialized);
        };
        match backend.create_view(&entry.texture, &entry.desc, kind) {
            Ok(view) => {
                let view = Arc::new(view);
                self.views.map_mut(kind).insert(id, Arc::clone(&view));
                Ok(view)
            }
            Err(e) => Err(self.creation_failed(e)),
        }
    }

    // ─── Samplers ──────────────────────────────────────────────────────────

    /// Returns the shared sampler for `(filter, address)`, creating it on
    /// first use.
    pub fn get_sampler(
        &mut self,
        filter: SamplerFilter,
        address: wgpu::AddressMode,
    ) -> Result<Arc<B::Sampler>> {
        self.ensure_live()?;
        let key = SamplerKey::new(filter, address);
        if let Some(sampler) = self.samplers.get(&key) {
            return Ok(Arc::clone(sampler));
        }

        let Some(backend) = self.backend.as_mut() else {
            return Err(LoupeError::NotInitialized);
        };
        match backend.create_sampler(&key) {
            Ok(sampler) => {
                let sampler = Arc::new(sampler);
                self.samplers.insert(key, Arc::clone(&sampler));
                Ok(sampler)
            }
            Err(e) => Err(self.creation_failed(e)),
        }
    }

    // ─── Shaders ───────────────────────────────────────────────────────────

    /// Compiles one shader variant, consulting the memory and disk caches
    /// first. Does not need a device.
    pub fn compile_shader(
        &self,
        source: &str,
        entry_point: &str,
        source_name: &str,
        includes: &dyn IncludeResolver,
        defines: &ShaderDefines,
    ) -> Result<Arc<ShaderBlob>> {
        self.shaders
            .compile(source, entry_point, source_name, includes, defines)
    }

    /// Compiles every variant of one source in parallel.
    pub fn precompile_shaders(
        &self,
        source: &str,
        entry_point: &str,
        source_name: &str,
        includes: &dyn IncludeResolver,
        variants: &[ShaderDefines],
    ) -> Vec<Result<Arc<ShaderBlob>>> {
        self.shaders.precompile(
            &self.dispatcher,
            source,
            entry_point,
            source_name,
            includes,
            variants,
        )
    }

    #[must_use]
    pub fn shader_manager(&self) -> &ShaderManager {
        &self.shaders
    }

    // ─── Frames ────────────────────────────────────────────────────────────

    /// Waits for frame latency, then acquires the next back buffer.
    ///
    /// Returns [`FrameStatus::Skipped`] when the wait times out or the surface
    /// has no image to give; the context stays `Ready` in that case.
    pub fn begin_frame(&mut self) -> Result<FrameStatus> {
        if self.state == FrameState::InFrame {
            return Err(LoupeError::InvalidFrameState(
                "begin_frame called inside a frame".to_string(),
            ));
        }
        self.ensure_live()?;
        let Some(backend) = self.backend.as_mut() else {
            return Err(LoupeError::NotInitialized);
        };

        if !self
            .latency
            .wait(self.settings.frame_wait_timeout, || backend.poll())
        {
            return Ok(FrameStatus::Skipped);
        }

        match backend.acquire_back_buffer() {
            Ok((texture, desc)) => {
                let id = self.textures.insert(TextureEntry { texture, desc });
                self.back_buffer = Some(id);
                self.state = FrameState::InFrame;
                Ok(FrameStatus::Ready(id))
            }
            Err(SurfaceFailure::Timeout) => {
                log::warn!("Back buffer acquire timed out, skipping frame");
                Ok(FrameStatus::Skipped)
            }
            Err(SurfaceFailure::Outdated) => {
                let (width, height) = backend.surface_size();
                log::warn!("Surface outdated, reconfiguring at {width}x{height}");
                match backend.resize(width, height) {
                    Ok(()) => Ok(FrameStatus::Skipped),
                    Err(e) => Err(self.creation_failed(e)),
                }
            }
            Err(SurfaceFailure::DeviceLost(reason)) => Err(self.mark_lost(reason)),
            Err(SurfaceFailure::Other(message)) => {
                log::error!("Failed to acquire back buffer: {message}");
                Err(LoupeError::Presentation(message))
            }
        }
    }

    /// Presents the back buffer acquired by [`begin_frame`](Self::begin_frame).
    ///
    /// [`PresentPolicy::Unthrottled`] presents with tearing when the surface
    /// supports it and falls back to vsync otherwise.
    pub fn end_frame(&mut self, policy: PresentPolicy) -> Result<()> {
        match self.state {
            FrameState::InFrame => {}
            FrameState::Lost => {
                return Err(LoupeError::DeviceLost(
                    self.lost_reason.clone().unwrap_or_default(),
                ));
            }
            FrameState::Uninitialized | FrameState::Ready => {
                return Err(LoupeError::InvalidFrameState(
                    "end_frame called without begin_frame".to_string(),
                ));
            }
        }

        if let Some(id) = self.back_buffer.take() {
            self.views.remove(id);
            self.textures.remove(id);
        }
        self.state = FrameState::Ready;

        let allow_tearing = policy == PresentPolicy::Unthrottled && self.supports_tearing();
        let Some(backend) = self.backend.as_mut() else {
            return Err(LoupeError::NotInitialized);
        };

        match backend.present(allow_tearing) {
            Ok(()) => {
                backend.on_frame_retired(self.latency.frame_submitted());
                self.frame_index += 1;
                Ok(())
            }
            Err(SurfaceFailure::DeviceLost(reason)) => Err(self.mark_lost(reason)),
            Err(SurfaceFailure::Timeout) => {
                log::warn!("Present timed out");
                Ok(())
            }
            Err(SurfaceFailure::Outdated) => {
                let (width, height) = backend.surface_size();
                log::warn!("Surface outdated on present, reconfiguring");
                match backend.resize(width, height) {
                    Ok(()) => Ok(()),
                    Err(e) => Err(self.creation_failed(e)),
                }
            }
            Err(SurfaceFailure::Other(message)) => {
                log::error!("Present failed: {message}");
                Err(LoupeError::Presentation(message))
            }
        }
    }

    /// Resizes the presentation surface. Not allowed inside a frame.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.state == FrameState::InFrame {
            return Err(LoupeError::InvalidFrameState(
                "resize called inside a frame".to_string(),
            ));
        }
        self.ensure_live()?;
        let Some(backend) = self.backend.as_mut() else {
            return Err(LoupeError::NotInitialized);
        };
        match backend.resize(width, height) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.creation_failed(e)),
        }
    }

    /// The back buffer of the current frame, if one is in progress.
    #[must_use]
    pub fn back_buffer(&self) -> Option<TextureId> {
        self.back_buffer
    }

    // ─── Accessors ─────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    #[must_use]
    pub fn feature_level(&self) -> Option<FeatureLevel> {
        self.capabilities.map(|c| c.feature_level)
    }

    #[must_use]
    pub fn supports_tearing(&self) -> bool {
        self.capabilities.is_some_and(|c| c.supports_tearing)
    }

    #[must_use]
    pub fn debug_layer_enabled(&self) -> bool {
        self.capabilities.is_some_and(|c| c.debug_layer)
    }

    /// Frames presented since the context was created.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[must_use]
    pub fn frames_in_flight(&self) -> u32 {
        self.latency.in_flight()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn sampler_count(&self) -> usize {
        self.samplers.len()
    }
}

// ─── wgpu ──────────────────────────────────────────────────────────────────

impl DeviceResources<WgpuBackend> {
    /// Creates a wgpu device and surface for `window` and initializes the
    /// context with it.
    pub fn initialize_with_window<W>(&mut self, window: W, width: u32, height: u32) -> Result<()>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        if matches!(self.state, FrameState::Ready | FrameState::InFrame) {
            return Err(LoupeError::InvalidFrameState(
                "device context is already initialized".to_string(),
            ));
        }
        // The old surface has to go before a new one is created for the same window.
        self.release_device_objects();
        self.backend = None;

        let backend = WgpuBackend::new(window, width, height, &self.settings)
            .inspect_err(|e| log::error!("{e}"))?;
        self.initialize(backend)
    }

    #[must_use]
    pub fn device(&self) -> Option<&wgpu::Device> {
        self.backend.as_ref().map(WgpuBackend::device)
    }

    #[must_use]
    pub fn queue(&self) -> Option<&wgpu::Queue> {
        self.backend.as_ref().map(WgpuBackend::queue)
    }

    #[must_use]
    pub fn adapter(&self) -> Option<&wgpu::Adapter> {
        self.backend.as_ref().map(WgpuBackend::adapter)
    }

    #[must_use]
    pub fn surface(&self) -> Option<&wgpu::Surface<'static>> {
        self.backend.as_ref().map(WgpuBackend::surface)
    }
}
