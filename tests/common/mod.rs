//! Shared test fixtures: a GPU-free backend for driving `DeviceResources`.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use loupe::loupe_core::{LoupeError, Result};
use loupe::loupe_render::{
    BindFlags, FeatureLevel, GpuBackend, InitialData, RetireCallback, SamplerKey, SurfaceFailure,
    TextureDesc, ViewKind,
};

/// Knobs and counters shared between a test and its [`MockBackend`].
#[derive(Default)]
pub struct MockControl {
    pub textures_created: AtomicUsize,
    pub views_created: AtomicUsize,
    pub samplers_created: AtomicUsize,
    pub presents: AtomicUsize,
    pub resizes: AtomicUsize,
    pub last_present_tearing: AtomicBool,

    /// The next present reports device removal.
    pub remove_device_on_present: AtomicBool,
    /// Set once the device has been removed.
    pub device_removed: AtomicBool,
    /// Reject every texture creation.
    pub reject_textures: AtomicBool,
    /// The next resize reports device removal.
    pub remove_device_on_resize: AtomicBool,
    /// Keep frames in flight: `poll` does not run retire callbacks.
    pub hold_retirements: AtomicBool,
    /// One-shot failure for the next acquire.
    pub fail_next_acquire: Mutex<Option<SurfaceFailure>>,
    /// One-shot failure for the next present.
    pub fail_next_present: Mutex<Option<SurfaceFailure>>,
}

#[derive(Debug)]
pub struct MockTexture {
    pub serial: usize,
    pub desc: TextureDesc,
}

#[derive(Debug)]
pub struct MockView {
    pub texture_serial: usize,
    pub kind: ViewKind,
}

#[derive(Debug)]
pub struct MockSampler {
    pub key: SamplerKey,
}

pub struct MockBackend {
    pub control: Arc<MockControl>,
    tearing: bool,
    size: (u32, u32),
    acquired: bool,
    serial: usize,
    pending: Mutex<Vec<RetireCallback>>,
}

impl MockBackend {
    pub fn new(tearing: bool) -> (Self, Arc<MockControl>) {
        let control = Arc::new(MockControl::default());
        let backend = Self {
            control: Arc::clone(&control),
            tearing,
            size: (1280, 720),
            acquired: false,
            serial: 0,
            pending: Mutex::new(Vec::new()),
        };
        (backend, control)
    }

    fn next_serial(&mut self) -> usize {
        self.serial += 1;
        self.serial
    }
}

impl GpuBackend for MockBackend {
    type Texture = MockTexture;
    type View = MockView;
    type Sampler = MockSampler;

    fn feature_level(&self) -> FeatureLevel {
        FeatureLevel::Full
    }

    fn supports_tearing(&self) -> bool {
        self.tearing
    }

    fn debug_layer_enabled(&self) -> bool {
        false
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        _initial: Option<&InitialData<'_>>,
    ) -> Result<MockTexture> {
        if self.control.reject_textures.load(Ordering::SeqCst) {
            return Err(LoupeError::ResourceCreation("out of video memory".to_string()));
        }
        self.control.textures_created.fetch_add(1, Ordering::SeqCst);
        Ok(MockTexture {
            serial: self.next_serial(),
            desc: desc.clone(),
        })
    }

    fn create_view(
        &mut self,
        texture: &MockTexture,
        _desc: &TextureDesc,
        kind: ViewKind,
    ) -> Result<MockView> {
        self.control.views_created.fetch_add(1, Ordering::SeqCst);
        Ok(MockView {
            texture_serial: texture.serial,
            kind,
        })
    }

    fn create_sampler(&mut self, key: &SamplerKey) -> Result<MockSampler> {
        self.control.samplers_created.fetch_add(1, Ordering::SeqCst);
        Ok(MockSampler { key: *key })
    }

    fn acquire_back_buffer(
        &mut self,
    ) -> std::result::Result<(MockTexture, TextureDesc), SurfaceFailure> {
        if let Some(failure) = self.control.fail_next_acquire.lock().take() {
            return Err(failure);
        }
        let desc = TextureDesc::new(
            wgpu::TextureFormat::Bgra8Unorm,
            self.size.0,
            self.size.1,
            BindFlags::RENDER_TARGET | BindFlags::UNORDERED_ACCESS,
        );
        self.acquired = true;
        let texture = MockTexture {
            serial: self.next_serial(),
            desc: desc.clone(),
        };
        Ok((texture, desc))
    }

    fn present(&mut self, allow_tearing: bool) -> std::result::Result<(), SurfaceFailure> {
        assert!(self.acquired, "present without acquire");
        self.acquired = false;
        if let Some(failure) = self.control.fail_next_present.lock().take() {
            return Err(failure);
        }
        if self.control.remove_device_on_present.swap(false, Ordering::SeqCst) {
            self.control.device_removed.store(true, Ordering::SeqCst);
            return Err(SurfaceFailure::DeviceLost("simulated removal".to_string()));
        }
        self.control
            .last_present_tearing
            .store(allow_tearing, Ordering::SeqCst);
        self.control.presents.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.control.remove_device_on_resize.swap(false, Ordering::SeqCst) {
            self.control.device_removed.store(true, Ordering::SeqCst);
            return Err(LoupeError::ResourceCreation(
                "surface configuration failed".to_string(),
            ));
        }
        if width > 0 && height > 0 {
            self.size = (width, height);
        }
        self.control.resizes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn poll(&self) {
        if self.control.hold_retirements.load(Ordering::SeqCst) {
            return;
        }
        let ready: Vec<RetireCallback> = std::mem::take(&mut *self.pending.lock());
        for retire in ready {
            retire();
        }
    }

    fn on_frame_retired(&self, callback: RetireCallback) {
        self.pending.lock().push(callback);
    }

    fn device_lost(&self) -> Option<String> {
        self.control
            .device_removed
            .load(Ordering::SeqCst)
            .then(|| "simulated removal".to_string())
    }
}
