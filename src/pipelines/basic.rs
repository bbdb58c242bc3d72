//! Opaque mesh pipeline.
//!
//! One textured, Lambert-lit draw per mesh. Bind groups:
//! 0. the material's texture and sampler
//! 1. the per-frame uniform (view-projection and lights)
//! 2. the per-mesh uniform (model and normal matrices, base color)
//!
//! Double-sided materials use a second pipeline without back-face culling.

use cgmath::Matrix4;

use crate::{
    data_structures::{instance::Instance, model::ModelVertex},
    pipelines::light::LightUniform,
};

/// Color target of the basic pass. Shaders write linear light, the format
/// encodes to sRGB on store.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniform {
    pub view_proj: [[f32; 4]; 4],
    pub lights: LightUniform,
}

impl FrameUniform {
    pub fn new(view_proj: Matrix4<f32>, lights: LightUniform) -> Self {
        Self {
            view_proj: view_proj.into(),
            lights,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    /// Normal matrix widened to 4x4; WGSL pads `mat3x3` columns anyway.
    pub normal: [[f32; 4]; 4],
    pub base_color: [f32; 4],
}

impl ObjectUniform {
    pub fn new(world: &Instance, base_color: [f32; 4]) -> Self {
        let n = world.to_normal_matrix();
        Self {
            model: world.to_matrix().into(),
            normal: [
                [n.x.x, n.x.y, n.x.z, 0.0],
                [n.y.x, n.y.y, n.y.z, 0.0],
                [n.z.x, n.z.y, n.z.z, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
            base_color,
        }
    }
}

pub fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some(label),
    })
}

pub fn texture_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
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
        ],
        label: Some("Diffuse texture bind group layout"),
    })
}

/// The bind group layouts shared by both basic pipelines.
pub struct BasicLayouts {
    pub texture: wgpu::BindGroupLayout,
    pub frame: wgpu::BindGroupLayout,
    pub object: wgpu::BindGroupLayout,
}

impl BasicLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            texture: texture_layout(device),
            frame: uniform_layout(device, "Frame bind group layout"),
            object: uniform_layout(device, "Object bind group layout"),
        }
    }
}

pub fn mk_basic_pipeline(device: &wgpu::Device, layouts: &BasicLayouts, cull_mode: Option<wgpu::Face>) -> wgpu::RenderPipeline {
    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Basic pipeline layout"),
        bind_group_layouts: &[Some(&layouts.texture), Some(&layouts.frame), Some(&layouts.object)],
        ..Default::default()
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Basic shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("basic.wgsl").into()),
    };

    mk_render_pipeline(
        device,
        &render_pipeline_layout,
        COLOR_FORMAT,
        Some(wgpu::BlendState::REPLACE),
        Some(DEPTH_FORMAT),
        &[ModelVertex::desc()],
        cull_mode,
        shader,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    depth_format: Option<wgpu::TextureFormat>,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    cull_mode: Option<wgpu::Face>,
    shader: wgpu::ShaderModuleDescriptor,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(shader);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Render Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        },
        depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: Some(true),
            depth_compare: Some(wgpu::CompareFunction::Less),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}
