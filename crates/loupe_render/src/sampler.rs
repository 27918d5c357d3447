//! Sampler cache keys.

/// Texture filtering used by a cached sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    Point,
    Linear,
    Anisotropic,
}

/// Key of the sampler cache: one sampler exists per distinct pair.
///
/// The address mode applies to all three axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub filter: SamplerFilter,
    pub address: wgpu::AddressMode,
}

impl SamplerKey {
    pub const MAX_ANISOTROPY: u16 = 16;

    #[must_use]
    pub fn new(filter: SamplerFilter, address: wgpu::AddressMode) -> Self {
        Self { filter, address }
    }

    #[must_use]
    pub fn descriptor(&self) -> wgpu::SamplerDescriptor<'static> {
        let (filter, mipmap_filter, anisotropy_clamp) = match self.filter {
            SamplerFilter::Point => (
                wgpu::FilterMode::Nearest,
                wgpu::MipmapFilterMode::Nearest,
                1,
            ),
            SamplerFilter::Linear => (
                wgpu::FilterMode::Linear,
                wgpu::MipmapFilterMode::Linear,
                1,
            ),
            // Anisotropic filtering requires every filter to be linear.
            SamplerFilter::Anisotropic => (
                wgpu::FilterMode::Linear,
                wgpu::MipmapFilterMode::Linear,
                Self::MAX_ANISOTROPY,
            ),
        };

        wgpu::SamplerDescriptor {
            label: Some("Loupe Cached Sampler"),
            address_mode_u: self.address,
            address_mode_v: self.address,
            address_mode_w: self.address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter,
            anisotropy_clamp,
            ..Default::default()
        }
    }
}
