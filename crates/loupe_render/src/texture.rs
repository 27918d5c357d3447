//! Texture descriptions and handles.
//!
//! Textures live in a generation-checked arena owned by
//! [`DeviceResources`](crate::device::DeviceResources). A [`TextureId`] is an
//! index plus a generation counter, so a handle kept after
//! [`destroy_texture`](crate::device::DeviceResources::destroy_texture) is
//! detected as stale instead of aliasing whatever texture reuses the slot.

use bitflags::bitflags;
use loupe_core::{LoupeError, Result};
use slotmap::new_key_type;

new_key_type! {
    /// Generation-checked handle to a texture in the device arena.
    pub struct TextureId;
}

bitflags! {
    /// Pipeline stages a texture may be bound to. Each flag enables one view
    /// kind (see [`ViewKind::required_bind`]).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct BindFlags: u32 {
        const RENDER_TARGET    = 1 << 0;
        const SHADER_RESOURCE  = 1 << 1;
        const UNORDERED_ACCESS = 1 << 2;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TextureMiscFlags: u32 {
        /// Allocate a full mip chain. Requires render-target and
        /// shader-resource binding.
        const GENERATE_MIPS = 1 << 0;
        /// Allow views in the sRGB variant of the texture's format.
        const SRGB_VIEWS    = 1 << 1;
    }
}

/// CPU access pattern of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceUsage {
    /// GPU read/write, no CPU access after creation.
    #[default]
    Default,
    /// Contents fixed at creation; initial data is mandatory.
    Immutable,
    /// Rewritten from the CPU frequently.
    Dynamic,
    /// Copy source/destination only; cannot be bound to the pipeline.
    Staging,
}

/// Texel data uploaded when a texture is created.
#[derive(Debug, Clone, Copy)]
pub struct InitialData<'a> {
    pub bytes: &'a [u8],
    pub bytes_per_row: u32,
}

/// Description of a 2D texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: Option<String>,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub bind: BindFlags,
    pub usage: ResourceUsage,
    pub misc: TextureMiscFlags,
}

impl TextureDesc {
    #[must_use]
    pub fn new(format: wgpu::TextureFormat, width: u32, height: u32, bind: BindFlags) -> Self {
        Self {
            label: None,
            format,
            width,
            height,
            bind,
            usage: ResourceUsage::Default,
            misc: TextureMiscFlags::empty(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_usage(mut self, usage: ResourceUsage) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn with_misc(mut self, misc: TextureMiscFlags) -> Self {
        self.misc = misc;
        self
    }

    /// Rejects descriptions no backend could honour.
    pub fn validate(&self, initial: Option<&InitialData<'_>>) -> Result<()> {
        let fail = |msg: String| Err(LoupeError::ResourceCreation(msg));

        if self.width == 0 || self.height == 0 {
            return fail(format!(
                "texture size must be positive, got {}x{}",
                self.width, self.height
            ));
        }
        if self.usage == ResourceUsage::Immutable && initial.is_none() {
            return fail("immutable texture created without initial data".to_string());
        }
        if self.usage == ResourceUsage::Staging && !self.bind.is_empty() {
            return fail(format!("staging texture cannot be bound as {:?}", self.bind));
        }
        if self.misc.contains(TextureMiscFlags::GENERATE_MIPS)
            && !self
                .bind
                .contains(BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE)
        {
            return fail("mip generation needs render-target and shader-resource binding".to_string());
        }

        if let Some(data) = initial {
            if let Some(texel_size) = self.format.block_copy_size(None) {
                let min_row = u64::from(self.width) * u64::from(texel_size);
                if u64::from(data.bytes_per_row) < min_row {
                    return fail(format!(
                        "initial data row pitch {} is below {min_row}",
                        data.bytes_per_row
                    ));
                }
            }
            let needed = u64::from(data.bytes_per_row) * u64::from(self.height);
            if (data.bytes.len() as u64) < needed {
                return fail(format!(
                    "initial data holds {} bytes, {needed} needed",
                    data.bytes.len()
                ));
            }
        }
        Ok(())
    }

    /// wgpu usage flags implied by the bind flags and usage mode.
    #[must_use]
    pub fn wgpu_usage(&self, has_initial_data: bool) -> wgpu::TextureUsages {
        let mut usage = wgpu::TextureUsages::empty();
        if self.bind.contains(BindFlags::RENDER_TARGET) {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        if self.bind.contains(BindFlags::SHADER_RESOURCE) {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if self.bind.contains(BindFlags::UNORDERED_ACCESS) {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        match self.usage {
            ResourceUsage::Default if has_initial_data => usage |= wgpu::TextureUsages::COPY_DST,
            ResourceUsage::Default => {}
            ResourceUsage::Immutable | ResourceUsage::Dynamic => {
                usage |= wgpu::TextureUsages::COPY_DST;
            }
            ResourceUsage::Staging => {
                usage |= wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
            }
        }
        usage
    }

    #[must_use]
    pub fn mip_level_count(&self) -> u32 {
        if self.misc.contains(TextureMiscFlags::GENERATE_MIPS) {
            32 - self.width.max(self.height).leading_zeros()
        } else {
            1
        }
    }

    /// Extra formats views of this texture may use.
    #[must_use]
    pub fn view_formats(&self) -> Vec<wgpu::TextureFormat> {
        if self.misc.contains(TextureMiscFlags::SRGB_VIEWS) {
            let srgb = self.format.add_srgb_suffix();
            if srgb != self.format {
                return vec![srgb];
            }
        }
        Vec::new()
    }

    #[must_use]
    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// The three cached view kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    RenderTarget,
    ShaderResource,
    UnorderedAccess,
}

impl ViewKind {
    #[must_use]
    pub fn required_bind(self) -> BindFlags {
        match self {
            ViewKind::RenderTarget => BindFlags::RENDER_TARGET,
            ViewKind::ShaderResource => BindFlags::SHADER_RESOURCE,
            ViewKind::UnorderedAccess => BindFlags::UNORDERED_ACCESS,
        }
    }

    #[must_use]
    pub fn wgpu_usage(self) -> wgpu::TextureUsages {
        match self {
            ViewKind::RenderTarget => wgpu::TextureUsages::RENDER_ATTACHMENT,
            ViewKind::ShaderResource => wgpu::TextureUsages::TEXTURE_BINDING,
            ViewKind::UnorderedAccess => wgpu::TextureUsages::STORAGE_BINDING,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ViewKind::RenderTarget => "RTV",
            ViewKind::ShaderResource => "SRV",
            ViewKind::UnorderedAccess => "UAV",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    #[test]
    fn test_zero_size_is_rejected() {
        let desc = TextureDesc::new(FORMAT, 0, 16, BindFlags::SHADER_RESOURCE);
        assert!(matches!(desc.validate(None), Err(LoupeError::ResourceCreation(_))));
    }

    #[test]
    fn test_immutable_needs_initial_data() {
        let desc = TextureDesc::new(FORMAT, 2, 2, BindFlags::SHADER_RESOURCE)
            .with_usage(ResourceUsage::Immutable);
        assert!(desc.validate(None).is_err());

        let texels = [0u8; 16];
        let data = InitialData {
            bytes: &texels,
            bytes_per_row: 8,
        };
        assert!(desc.validate(Some(&data)).is_ok());
    }

    #[test]
    fn test_short_initial_data_is_rejected() {
        let desc = TextureDesc::new(FORMAT, 4, 4, BindFlags::SHADER_RESOURCE);
        let texels = [0u8; 32];
        let data = InitialData {
            bytes: &texels,
            bytes_per_row: 16,
        };
        assert!(desc.validate(Some(&data)).is_err());
    }

    #[test]
    fn test_staging_cannot_bind() {
        let desc = TextureDesc::new(FORMAT, 4, 4, BindFlags::SHADER_RESOURCE)
            .with_usage(ResourceUsage::Staging);
        assert!(desc.validate(None).is_err());
    }

    #[test]
    fn test_mip_chain_length() {
        let desc = TextureDesc::new(
            FORMAT,
            256,
            100,
            BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
        )
        .with_misc(TextureMiscFlags::GENERATE_MIPS);
        assert!(desc.validate(None).is_ok());
        assert_eq!(desc.mip_level_count(), 9);

        let plain = TextureDesc::new(FORMAT, 256, 100, BindFlags::SHADER_RESOURCE);
        assert_eq!(plain.mip_level_count(), 1);
    }

    #[test]
    fn test_usage_mapping() {
        let desc = TextureDesc::new(
            FORMAT,
            8,
            8,
            BindFlags::RENDER_TARGET | BindFlags::UNORDERED_ACCESS,
        );
        let usage = desc.wgpu_usage(false);
        assert!(usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert!(usage.contains(wgpu::TextureUsages::STORAGE_BINDING));
        assert!(!usage.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(!usage.contains(wgpu::TextureUsages::COPY_DST));
        assert!(desc.wgpu_usage(true).contains(wgpu::TextureUsages::COPY_DST));
    }

    #[test]
    fn test_srgb_view_formats() {
        let desc = TextureDesc::new(FORMAT, 8, 8, BindFlags::SHADER_RESOURCE)
            .with_misc(TextureMiscFlags::SRGB_VIEWS);
        assert_eq!(desc.view_formats(), vec![wgpu::TextureFormat::Rgba8UnormSrgb]);
    }
}
