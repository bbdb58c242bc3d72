//! Textures: decoded images plus the sampler state they are bound with.
//!
//! A [`Texture`] stays on the CPU until a renderer uploads it; [`GpuTexture`]
//! is the uploaded counterpart. Filtering, mip selection and sRGB decoding
//! are left to the GPU sampler and texture format chosen at upload.

use anyhow::Context;
use image::{RgbaImage, imageops};

/// Minification filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    /// Bilinear on the base level only.
    Linear,
    /// Trilinear: bilinear on the two nearest mip levels, blended by LOD.
    LinearMipmapLinear,
}

/// How the stored bytes are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerSettings {
    /// Flip the image vertically on upload. Off for glTF, where V already runs top-down.
    pub flip_y: bool,
    pub generate_mipmaps: bool,
    pub min_filter: FilterMode,
    pub color_space: ColorSpace,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            flip_y: true,
            generate_mipmaps: false,
            min_filter: FilterMode::Linear,
            color_space: ColorSpace::Linear,
        }
    }
}

/// A texture image plus the sampler state it is bound with.
#[derive(Clone, Debug)]
pub struct Texture {
    pub label: String,
    image: RgbaImage,
    settings: SamplerSettings,
}

impl Texture {
    pub fn from_image(label: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            label: label.into(),
            image,
            settings: SamplerSettings::default(),
        }
    }

    /// Decode an encoded image (PNG, JPEG, ...) into an RGBA8 texture.
    pub fn from_bytes(bytes: &[u8], label: &str) -> anyhow::Result<Self> {
        let img = image::load_from_memory(bytes)
            .with_context(|| format!("decoding texture image {label}"))?;
        Ok(Self::from_image(label, img.to_rgba8()))
    }

    /// Single-color texture.
    pub fn solid(label: impl Into<String>, color: [u8; 4], width: u32, height: u32) -> Self {
        Self::from_image(
            label,
            RgbaImage::from_pixel(width.max(1), height.max(1), image::Rgba(color)),
        )
    }

    /// A copy of this texture bound with different sampler state.
    pub fn configured(&self, settings: SamplerSettings) -> Self {
        Self {
            label: self.label.clone(),
            image: self.image.clone(),
            settings,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    /// Levels uploaded for this texture: the full chain down to 1x1 with
    /// mipmaps, the base level alone without.
    pub fn mip_level_count(&self) -> u32 {
        if self.settings.generate_mipmaps {
            32 - self.width().max(self.height()).max(1).leading_zeros()
        } else {
            1
        }
    }

    pub fn is_power_of_two(&self) -> bool {
        self.width().is_power_of_two() && self.height().is_power_of_two()
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        match self.settings.color_space {
            ColorSpace::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            ColorSpace::Linear => wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    /// The images uploaded per mip level, base level first. Each level is
    /// half the previous one, filtered by the image crate.
    pub fn mip_chain(&self) -> Vec<RgbaImage> {
        let base = if self.settings.flip_y {
            imageops::flip_vertical(&self.image)
        } else {
            self.image.clone()
        };
        let count = self.mip_level_count() as usize;
        let mut levels = Vec::with_capacity(count);
        levels.push(base);
        while levels.len() < count {
            let Some(last) = levels.last() else {
                break;
            };
            let (w, h) = ((last.width() / 2).max(1), (last.height() / 2).max(1));
            let next = imageops::resize(last, w, h, imageops::FilterType::Triangle);
            levels.push(next);
        }
        levels
    }

    pub fn sampler_descriptor(&self) -> wgpu::SamplerDescriptor<'_> {
        let trilinear = self.settings.min_filter == FilterMode::LinearMipmapLinear;
        wgpu::SamplerDescriptor {
            label: Some(self.label.as_str()),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: if trilinear {
                wgpu::MipmapFilterMode::Linear
            } else {
                wgpu::MipmapFilterMode::Nearest
            },
            // Plain linear minification never leaves the base level.
            lod_max_clamp: if trilinear { 32.0 } else { 0.0 },
            ..Default::default()
        }
    }

    /// Upload every mip level and create the matching sampler.
    pub fn upload(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> GpuTexture {
        let levels = self.mip_chain();
        let size = wgpu::Extent3d {
            width: self.width().max(1),
            height: self.height().max(1),
            depth_or_array_layers: 1,
        };
        let format = self.format();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(self.label.as_str()),
            size,
            mip_level_count: levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (mip_level, level) in levels.iter().enumerate() {
            if level.is_empty() {
                continue;
            }
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &texture,
                    mip_level: mip_level as u32,
                    origin: wgpu::Origin3d::ZERO,
                },
                level.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * level.width()),
                    rows_per_image: Some(level.height()),
                },
                wgpu::Extent3d {
                    width: level.width(),
                    height: level.height(),
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&self.sampler_descriptor());
        GpuTexture {
            texture,
            view,
            sampler,
        }
    }
}

/// A texture living on the GPU with its view and sampler.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

/// sRGB-encoded byte to linear light.
pub fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
