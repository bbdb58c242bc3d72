//! Aspect normalization for textures.
//!
//! Non-square textures are redrawn, centered and unscaled, onto a square
//! target cleared to a fill color. The redraw is a textured plane of
//! `2·wR × 2·hR` in an orthographic `[-1, 1]` frame, which on an `L×L`
//! target covers exactly the source's own pixel footprint. Texels are
//! written as sampled, alpha included; nothing is blended over the fill.

use std::iter;

use anyhow::Context as _;
use wgpu::util::DeviceExt;

use crate::{
    data_structures::texture::{ColorSpace, FilterMode, SamplerSettings, Texture},
    gpu::Gpu,
    pipelines::basic::mk_render_pipeline,
};

/// Decides from `min(w,h) / max(w,h)` whether a texture is close enough to
/// square to be used as is.
pub type SquarePredicate = dyn Fn(f32) -> bool + Send + Sync;

pub const DEFAULT_SQUARE_THRESHOLD: f32 = 0.9;

/// Both the source and the target hold raw bytes; no sRGB conversion happens.
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub fn default_square_predicate(ratio: f32) -> bool {
    ratio > DEFAULT_SQUARE_THRESHOLD
}

/// Position of `value` within `[min, max]` as a fraction.
pub fn scale_to_range(value: f32, min: f32, max: f32) -> f32 {
    if max == min {
        return 1.0;
    }
    (value - min) / (max - min)
}

pub fn is_square_enough(width: u32, height: u32, predicate: &SquarePredicate) -> bool {
    if width == height {
        return true;
    }
    let (lo, hi) = (width.min(height) as f32, width.max(height) as f32);
    predicate(scale_to_range(lo, 0.0, hi))
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PlaneUniform {
    pub half_extent: [f32; 2],
    pub scale: f32,
    _padding: f32,
}

impl PlaneUniform {
    /// Target side `L` and plane for a `width × height` source:
    /// `wR = min(L,w)/max(L,w)`, `hR` likewise, and UVs scaled by
    /// `1 / max(wR, hR)`.
    pub fn for_source(width: u32, height: u32) -> (u32, Self) {
        let side = width.max(height).max(1);
        let w_ratio = side.min(width) as f32 / side.max(width) as f32;
        let h_ratio = side.min(height) as f32 / side.max(height) as f32;
        let plane = Self {
            half_extent: [w_ratio, h_ratio],
            scale: 1.0 / w_ratio.max(h_ratio),
            _padding: 0.0,
        };
        (side, plane)
    }
}

/// The composite pass: pipeline, layout and a clamping sampler.
pub struct Compositor {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl Compositor {
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
            label: Some("Composite bind group layout"),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite pipeline layout"),
            bind_group_layouts: &[Some(&layout)],
            ..Default::default()
        });
        let shader = wgpu::ShaderModuleDescriptor {
            label: Some("Composite shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("composite.wgsl").into()),
        };
        // No blend state: sampled texels replace the fill.
        let pipeline = mk_render_pipeline(device, &pipeline_layout, TARGET_FORMAT, None, None, &[], None, shader);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Composite sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            pipeline,
            layout,
            sampler,
        }
    }

    /// Normalize `texture` if the predicate rejects its aspect, else hand it back.
    pub async fn normalize(
        &self,
        gpu: &Gpu,
        texture: &Texture,
        fill: [u8; 3],
        predicate: &SquarePredicate,
    ) -> anyhow::Result<Option<Texture>> {
        let (w, h) = texture.dimensions();
        if is_square_enough(w, h, predicate) {
            return Ok(None);
        }
        log::debug!("normalizing {} from {w}x{h}", texture.label);
        self.composite_square(gpu, texture, fill).await.map(Some)
    }

    /// Draw `texture` centered on an `L×L` target, `L = max(w, h)`.
    pub async fn composite_square(&self, gpu: &Gpu, texture: &Texture, fill: [u8; 3]) -> anyhow::Result<Texture> {
        let (w, h) = texture.dimensions();
        let (side, plane) = PlaneUniform::for_source(w, h);
        let max = gpu.max_texture_side();
        if side > max {
            anyhow::bail!("{} is {w}x{h}, the square target would exceed {max} texels", texture.label);
        }

        let source = texture
            .configured(SamplerSettings {
                flip_y: false,
                generate_mipmaps: false,
                min_filter: FilterMode::Linear,
                color_space: ColorSpace::Linear,
            })
            .upload(&gpu.device, &gpu.queue);
        let plane_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Composite plane"),
            contents: bytemuck::cast_slice(&[plane]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: plane_buffer.as_entire_binding(),
                },
            ],
            label: Some("Composite bind group"),
        });

        let target = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Composite target"),
            size: wgpu::Extent3d {
                width: side,
                height: side,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Composite encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Composite pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: fill[0] as f64 / 255.0,
                            g: fill[1] as f64 / 255.0,
                            b: fill[2] as f64 / 255.0,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..6, 0..1);
        }
        gpu.queue.submit(iter::once(encoder.finish()));

        let image = gpu
            .read_rgba(&target)
            .await
            .with_context(|| format!("reading back normalized {}", texture.label))?;
        Ok(Texture::from_image(texture.label.clone(), image))
    }
}
