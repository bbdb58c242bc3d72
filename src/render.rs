//! Frame rendering.
//!
//! The [`Renderer`] owns the offscreen color and depth targets, the basic
//! pipelines, and the GPU copies of every texture it has drawn with.
//! [`Renderer::render`] clears the target with the scene background, draws
//! each mesh of the attached model and reads the frame back as sRGB RGBA.

use std::{collections::HashMap, iter, sync::Arc};

use image::{RgbaImage, imageops::FilterType};
use wgpu::util::DeviceExt;

use crate::{
    context::{Background, Context},
    data_structures::texture::{GpuTexture, Texture, srgb_to_linear},
    gpu::Gpu,
    pipelines::{
        basic::{self, BasicLayouts, FrameUniform, ObjectUniform},
        light::LightUniform,
    },
};

/// A texture upload kept alive together with the `Arc` it was made from, so
/// the pointer key cannot be reused by another allocation.
struct CachedTexture {
    _source: Arc<Texture>,
    bind_group: wgpu::BindGroup,
}

pub struct Renderer {
    gpu: Arc<Gpu>,
    width: u32,
    height: u32,
    layouts: BasicLayouts,
    culled: wgpu::RenderPipeline,
    double_sided: wgpu::RenderPipeline,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    /// Bound for materials without a map.
    white: wgpu::BindGroup,
    textures: HashMap<*const Texture, CachedTexture>,
}

impl Renderer {
    pub fn new(gpu: Arc<Gpu>, width: u32, height: u32) -> anyhow::Result<Self> {
        let max = gpu.max_texture_side();
        if width > max || height > max {
            anyhow::bail!("{width}x{height} exceeds the adapter's {max} texel limit");
        }
        let device = &gpu.device;
        let layouts = BasicLayouts::new(device);
        let culled = basic::mk_basic_pipeline(device, &layouts, Some(wgpu::Face::Back));
        let double_sided = basic::mk_basic_pipeline(device, &layouts, None);

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: basic::COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: basic::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        let white = Texture::solid("white", [255; 4], 1, 1).upload(device, &gpu.queue);
        let white = texture_bind_group(device, &layouts.texture, &white);

        Ok(Self {
            gpu,
            width,
            height,
            layouts,
            culled,
            double_sided,
            color,
            color_view,
            depth_view,
            white,
            textures: HashMap::new(),
        })
    }

    /// Render the scene as the context currently describes it.
    pub async fn render(&mut self, ctx: &Context) -> anyhow::Result<RgbaImage> {
        let load = match &ctx.background {
            Background::Color(rgb) => wgpu::LoadOp::Clear(wgpu::Color {
                r: srgb_to_linear(rgb[0]) as f64,
                g: srgb_to_linear(rgb[1]) as f64,
                b: srgb_to_linear(rgb[2]) as f64,
                a: 1.0,
            }),
            Background::Image(image) => {
                self.write_background(image);
                wgpu::LoadOp::Load
            }
        };

        let device = &self.gpu.device;
        let frame = FrameUniform::new(
            ctx.projection.calc_matrix() * ctx.camera.calc_matrix(),
            LightUniform::from_lights(&ctx.lights),
        );
        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame uniform"),
            contents: bytemuck::cast_slice(&[frame]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let frame_bind_group = uniform_bind_group(device, &self.layouts.frame, &frame_buffer);

        let mut draws = Vec::new();
        if let Some(model) = ctx.model() {
            model.for_each_mesh(&mut |world, mesh| {
                if mesh.indices.is_empty() || mesh.vertices.is_empty() {
                    return;
                }
                let material = mesh.material.as_ref();
                let base_color = material.map_or([1.0; 4], |m| m.base_color);
                let double_sided = material.is_some_and(|m| m.double_sided);
                let map = material.and_then(|m| m.map.clone());
                draws.push(Draw {
                    vertices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(mesh.name.as_str()),
                        contents: bytemuck::cast_slice(&mesh.vertices),
                        usage: wgpu::BufferUsages::VERTEX,
                    }),
                    indices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(mesh.name.as_str()),
                        contents: bytemuck::cast_slice(&mesh.indices),
                        usage: wgpu::BufferUsages::INDEX,
                    }),
                    index_count: mesh.indices.len() as u32,
                    object: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Object uniform"),
                        contents: bytemuck::cast_slice(&[ObjectUniform::new(world, base_color)]),
                        usage: wgpu::BufferUsages::UNIFORM,
                    }),
                    map,
                    double_sided,
                });
            });
        }
        for draw in &draws {
            if let Some(map) = &draw.map {
                self.ensure_uploaded(map);
            }
        }
        let object_bind_groups: Vec<wgpu::BindGroup> = draws
            .iter()
            .map(|draw| uniform_bind_group(&self.gpu.device, &self.layouts.object, &draw.object))
            .collect();

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Basic pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            pass.set_bind_group(1, &frame_bind_group, &[]);
            for (draw, object) in draws.iter().zip(&object_bind_groups) {
                let pipeline = if draw.double_sided {
                    &self.double_sided
                } else {
                    &self.culled
                };
                let texture = draw
                    .map
                    .as_ref()
                    .and_then(|map| self.textures.get(&Arc::as_ptr(map)))
                    .map_or(&self.white, |cached| &cached.bind_group);
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, texture, &[]);
                pass.set_bind_group(2, object, &[]);
                pass.set_vertex_buffer(0, draw.vertices.slice(..));
                pass.set_index_buffer(draw.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }
        self.gpu.queue.submit(iter::once(encoder.finish()));

        self.gpu.read_rgba(&self.color).await
    }

    /// Upload `texture` once per distinct `Arc`; aliased materials share it.
    fn ensure_uploaded(&mut self, texture: &Arc<Texture>) {
        let device = &self.gpu.device;
        let layout = &self.layouts.texture;
        let queue = &self.gpu.queue;
        self.textures.entry(Arc::as_ptr(texture)).or_insert_with(|| {
            log::debug!("uploading {} ({:?})", texture.label, texture.settings());
            let gpu_texture = texture.upload(device, queue);
            CachedTexture {
                _source: texture.clone(),
                bind_group: texture_bind_group(device, layout, &gpu_texture),
            }
        });
    }

    pub fn uploaded_textures(&self) -> usize {
        self.textures.len()
    }

    /// Stretch `image` over the whole color target.
    fn write_background(&self, image: &RgbaImage) {
        let stretched;
        let pixels = if image.dimensions() == (self.width, self.height) {
            image
        } else {
            stretched = image::imageops::resize(image, self.width, self.height, FilterType::Triangle);
            &stretched
        };
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            pixels.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.width),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

struct Draw {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
    object: wgpu::Buffer,
    map: Option<Arc<Texture>>,
    double_sided: bool,
}

fn uniform_bind_group(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, buffer: &wgpu::Buffer) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
        label: None,
    })
}

fn texture_bind_group(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, texture: &GpuTexture) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            },
        ],
        label: Some("Diffuse bind group"),
    })
}

#[cfg(all(test, feature = "integration-tests"))]
mod tests {
    use std::f32::consts::PI;

    use super::*;
    use crate::{
        data_structures::{
            model::{Material, Mesh, ModelVertex},
            scene_graph::{Model, Node},
        },
        pipelines::light::Light,
    };

    fn quad(z: f32, ccw: bool, material: Material) -> Mesh {
        let indices = if ccw {
            vec![0, 1, 2, 0, 2, 3]
        } else {
            vec![0, 2, 1, 0, 3, 2]
        };
        let corner = |x: f32, y: f32| ModelVertex {
            position: [x, y, z],
            tex_coords: [0.5, 0.5],
            normal: [0.0, 0.0, 1.0],
        };
        Mesh {
            name: "quad".into(),
            vertices: vec![corner(-1.0, -1.0), corner(1.0, -1.0), corner(1.0, 1.0), corner(-1.0, 1.0)],
            indices,
            material: Some(material),
        }
    }

    fn context_with(meshes: Vec<Mesh>) -> Context {
        let mut ctx = Context::new(8, 8, 0x000000);
        ctx.camera.set_position(0.0, 0.0, 3.0);
        ctx.add_light(Light::ambient(0xFFFFFF, PI));
        let mut node = Node::new("quads");
        node.meshes = meshes;
        ctx.attach(Model::new("quads", vec![node]));
        ctx
    }

    async fn renderer() -> Renderer {
        let gpu = Arc::new(Gpu::new().await.unwrap());
        Renderer::new(gpu, 8, 8).unwrap()
    }

    #[tokio::test]
    async fn front_face_is_drawn_and_back_face_culled() {
        let mut renderer = renderer().await;
        let frame = renderer
            .render(&context_with(vec![quad(0.0, true, Material::new("front"))]))
            .await
            .unwrap();
        assert_eq!(frame.get_pixel(4, 4).0, [255, 255, 255, 255]);

        let frame = renderer
            .render(&context_with(vec![quad(0.0, false, Material::new("back"))]))
            .await
            .unwrap();
        assert_eq!(frame.get_pixel(4, 4).0, [0, 0, 0, 255]);
    }

    #[tokio::test]
    async fn double_sided_material_shows_its_back() {
        let mut renderer = renderer().await;
        let mut material = Material::new("both");
        material.double_sided = true;
        let frame = renderer
            .render(&context_with(vec![quad(0.0, false, material)]))
            .await
            .unwrap();
        assert_eq!(frame.get_pixel(4, 4).0, [255, 255, 255, 255]);
    }

    #[tokio::test]
    async fn nearer_surface_wins_depth_test() {
        let mut renderer = renderer().await;
        let mut dark = Material::new("dark");
        dark.base_color = [0.0, 1.0, 0.0, 1.0];
        let frame = renderer
            .render(&context_with(vec![quad(0.5, true, dark), quad(0.0, true, Material::new("far"))]))
            .await
            .unwrap();
        assert_eq!(frame.get_pixel(4, 4).0, [0, 255, 0, 255]);
    }

    #[tokio::test]
    async fn texture_is_sampled_and_uploaded_once() {
        let mut renderer = renderer().await;
        let map = Arc::new(Texture::solid("red", [255, 0, 0, 255], 4, 4));
        let mut material = Material::new("red");
        material.map = Some(map.clone());
        let ctx = context_with(vec![quad(0.0, true, material.clone()), quad(0.5, true, material)]);
        let frame = renderer.render(&ctx).await.unwrap();
        assert_eq!(frame.get_pixel(4, 4).0, [255, 0, 0, 255]);
        renderer.render(&ctx).await.unwrap();
        assert_eq!(renderer.uploaded_textures(), 1);
    }

    #[tokio::test]
    async fn background_color_survives_readback() {
        let mut renderer = renderer().await;
        let mut ctx = Context::new(8, 8, 0x112233);
        ctx.purge_lights();
        let frame = renderer.render(&ctx).await.unwrap();
        let [r, g, b, a] = frame.get_pixel(1, 1).0;
        // sRGB round trip through a linear clear value may be off by one.
        for (got, want) in [(r, 0x11), (g, 0x22), (b, 0x33)] {
            assert!((got as i32 - want).abs() <= 1, "{got} vs {want}");
        }
        assert_eq!(a, 255);
    }

    #[tokio::test]
    async fn background_image_is_stretched_over_viewport() {
        let mut renderer = renderer().await;
        let mut ctx = Context::new(8, 8, 0);
        ctx.set_background_image(RgbaImage::from_pixel(1, 1, image::Rgba([200, 10, 10, 255])));
        let frame = renderer.render(&ctx).await.unwrap();
        assert_eq!(frame.get_pixel(7, 7).0, [200, 10, 10, 255]);
        assert_eq!(frame.get_pixel(0, 0).0, [200, 10, 10, 255]);
    }
}
